//! `strata reorder` - rewrite the current stack from an editable plan.

use std::io::Write;
use std::process::Command;

use anyhow::{bail, Context as _, Result};
use strata_core::reorder::{self, Plan, ReorderEngine, ReorderOutcome};

use crate::commands::Context;
use crate::output;

const PLAN_HELP: &str = "\
# Rewrite this stack by editing the plan below.
#
#   stack-branch <name> [--parent <p> | --trunk <t>[@<commit>]]
#       create or reposition a branch; later picks apply to it
#   pick <commit>
#       cherry-pick a commit onto the current branch
#   delete-branch <name> [--delete-ref]
#       forget a branch (optionally deleting its git ref)
#
# Deleting a pick drops that commit. Reordering picks reorders history.
";

/// Run the reorder command.
pub fn run(continue_: bool, abort: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let engine = ReorderEngine::new(&ctx.repo, &ctx.db, &ctx.checkpoints, ctx.remote.clone());

    if abort {
        engine.abort()?;
        output::success("reorder aborted - HEAD restored");
        return Ok(());
    }
    if continue_ {
        return report(&engine.continue_()?);
    }

    let current = ctx.repo.current_branch()?;
    let snapshot = ctx.db.read_tx();
    if !snapshot.contains(&current) {
        bail!("'{current}' is not managed by strata - run `strata adopt` first");
    }

    // Reorder rewrites history from the recorded snapshots; a branch whose
    // parent moved since its last restack would lose or duplicate commits.
    for branch in snapshot.stack_branches(&current) {
        if branch.parent.trunk {
            continue;
        }
        let parent_tip = ctx.repo.branch_oid(branch.parent.name.as_str())?;
        if branch.parent.head.as_deref() != Some(parent_tip.to_string().as_str()) {
            return Err(strata_core::Error::NotInSyncWithParent {
                branch: branch.name.to_string(),
                parent: branch.parent.name.to_string(),
            }
            .into());
        }
    }

    let original = reorder::generate(&ctx.repo, &snapshot, &current)?;
    if original.commands.is_empty() {
        output::info("nothing to reorder - the stack has no commits");
        return Ok(());
    }

    let text = format!("{PLAN_HELP}\n{}", annotate(&ctx, &original)?);
    let edited_text = edit_text(&text)?;
    let edited = Plan::parse(&edited_text)?;

    if edited == original {
        output::info("plan unchanged - nothing to do");
        return Ok(());
    }

    let diff = reorder::diff(&original, &edited);
    for dropped in &diff.removed {
        output::warn(&format!(
            "'{dropped}' was dropped from the plan; its git branch is kept but unmanaged"
        ));
    }

    report(&engine.start(edited, Some(&original))?)
}

fn report(outcome: &ReorderOutcome) -> Result<()> {
    match outcome {
        ReorderOutcome::Complete(result) => {
            output::success(&format!(
                "reorder complete: {} branch(es), {} commit(s) applied{}",
                result.branches.len(),
                result.picks,
                if result.deleted.is_empty() {
                    String::new()
                } else {
                    format!(", {} record(s) deleted", result.deleted.len())
                }
            ));
            Ok(())
        }
        ReorderOutcome::Conflicted { commit, stderr } => {
            output::error(&format!("conflict applying {commit}"));
            for line in stderr.lines().take(6) {
                output::item(line);
            }
            output::resume_instructions("reorder", false);
            bail!("cherry-pick stopped on conflicts at {commit}")
        }
    }
}

/// Serialize a plan with each pick annotated by its commit subject, the
/// way a rebase todo list reads. Comments are stripped on parse, so the
/// annotations don't affect the round-trip.
fn annotate(ctx: &Context, plan: &Plan) -> Result<String> {
    use strata_core::reorder::Command as PlanCommand;

    let mut out = String::new();
    for command in &plan.commands {
        out.push_str(&command.to_line());
        if let PlanCommand::Pick { commit } = command {
            if let Ok(oid) = ctx.repo.rev_parse(commit) {
                if let Ok(summary) = ctx.repo.commit_summary(oid) {
                    out.push_str(&format!("    # {summary}"));
                }
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Open `initial` in the user's editor and return the edited text.
fn edit_text(initial: &str) -> Result<String> {
    let editor = std::env::var("GIT_EDITOR")
        .or_else(|_| std::env::var("EDITOR"))
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let mut file = tempfile::Builder::new()
        .prefix("strata-reorder-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(initial.as_bytes())?;
    file.flush()?;

    let mut parts = editor.split_whitespace();
    let program = parts.next().context("empty editor command")?;
    let status = Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .with_context(|| format!("failed to launch editor '{editor}'"))?;
    if !status.success() {
        bail!("editor exited with an error; reorder aborted");
    }

    Ok(std::fs::read_to_string(file.path())?)
}
