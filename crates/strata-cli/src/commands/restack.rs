//! `strata restack` - rebase the current stack onto updated parent tips.

use anyhow::{bail, Result};
use strata_core::restack::{RestackEngine, RestackOpts, RestackOutcome};
use strata_core::OpKind;

use crate::commands::Context;
use crate::output;

/// Run the restack command.
pub fn run(continue_: bool, skip: bool, abort: bool, rebase_to_trunk: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let engine = RestackEngine::new(
        &ctx.repo,
        &ctx.db,
        &ctx.checkpoints,
        RestackOpts {
            remote: ctx.remote.clone(),
            rebase_to_trunk,
        },
    );

    if abort {
        engine.abort()?;
        output::success("restack aborted - HEAD restored");
        return Ok(());
    }
    if continue_ {
        return report("restack", &engine.continue_()?);
    }
    if skip {
        return report("restack", &engine.skip()?);
    }

    let current = ctx.repo.current_branch()?;
    let snapshot = ctx.db.read_tx();
    if !snapshot.contains(&current) {
        bail!("'{current}' is not managed by strata - run `strata adopt` first");
    }
    let targets: Vec<String> = snapshot
        .stack_branches(&current)
        .iter()
        .map(|b| b.name.to_string())
        .collect();

    report("restack", &engine.start(&targets, OpKind::Restack)?)
}

/// Print a restack outcome; a conflict exits non-zero with the exact
/// resume invocation.
pub fn report(op: &str, outcome: &RestackOutcome) -> Result<()> {
    match outcome {
        RestackOutcome::Complete(result) => {
            if result.moved() == 0 {
                output::success("stack is already up to date");
            } else {
                output::success(&format!("restacked {} branch(es)", result.moved()));
            }
            for step in &result.steps {
                use strata_core::restack::BranchStep;
                match step {
                    BranchStep::Restacked { branch, .. } => {
                        output::item(&format!("{branch} restacked"));
                    }
                    BranchStep::Reparented { branch, trunk } => {
                        output::item(&format!("{branch} moved onto {trunk} (parent merged)"));
                    }
                    BranchStep::MissingRef { branch } => {
                        output::warn(&format!("'{branch}' has no git ref - run `strata tidy`"));
                    }
                    BranchStep::UpToDate { .. } | BranchStep::LeftAtTrunk { .. } => {}
                }
            }
            Ok(())
        }
        RestackOutcome::Conflicted { branch, stderr, .. } => {
            output::error(&format!("conflict while restacking '{branch}'"));
            for line in stderr.lines().take(6) {
                output::item(line);
            }
            output::resume_instructions(op, true);
            bail!("rebase stopped on conflicts in '{branch}'")
        }
    }
}
