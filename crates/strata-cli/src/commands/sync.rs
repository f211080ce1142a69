//! `strata sync` - fetch, fold in merged PRs, restack, push, prune.

use anyhow::{bail, Context as _, Result};
use strata_core::sync::{SyncEngine, SyncOpts};
use strata_core::{prune, push};
use strata_github::{Auth, GitHubClient};

use crate::commands::{restack, Choice, Context};
use crate::output;
use crate::services::sync::PrReconciler;

/// Run the sync command.
#[allow(clippy::fn_params_excessive_bools)]
pub fn run(
    all: bool,
    continue_: bool,
    skip: bool,
    abort: bool,
    push_choice: Choice,
    prune_choice: Choice,
    rebase_to_trunk: bool,
    no_fetch: bool,
) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let engine = SyncEngine::new(
        &ctx.repo,
        &ctx.db,
        &ctx.checkpoints,
        SyncOpts {
            remote: ctx.remote.clone(),
            all,
            rebase_to_trunk,
        },
    );

    if abort {
        engine.abort()?;
        output::success("sync aborted - HEAD restored");
        return Ok(());
    }
    if continue_ {
        return restack::report("sync", &engine.continue_()?);
    }
    if skip {
        return restack::report("sync", &engine.skip()?);
    }

    if let Some(op) = ctx.checkpoints.in_progress() {
        bail!("a {op} is already in progress - run `strata {op} --continue` or `--abort` first");
    }
    ctx.repo.require_clean()?;

    if no_fetch {
        output::info("skipping fetch (--no-fetch)");
    } else if let Err(e) = engine.fetch() {
        output::warn(&format!("fetch failed, continuing with local refs: {e}"));
    }

    let current = ctx.repo.current_branch()?;
    let targets = engine.targets(&current)?;
    if targets.is_empty() {
        output::info("no branches to sync");
        return Ok(());
    }

    // Provider phases are best-effort: without a token, sync still
    // restacks from local state.
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let client = build_client(&ctx);
    let reconciler = client.as_ref().and_then(|client| {
        let repo = ctx.db.read_tx().repository().clone();
        // Without an owner/name (non-GitHub remote) there is no provider.
        (!repo.owner.is_empty() && !repo.name.is_empty())
            .then(|| PrReconciler::new(client, repo.owner, repo.name))
    });

    if let Some(reconciler) = &reconciler {
        if let Err(e) = runtime.block_on(reconciler.refresh_repository(&ctx.db)) {
            output::warn(&format!("could not refresh repository record: {e}"));
        }
        match runtime.block_on(reconciler.reconcile(&ctx.db, &targets)) {
            Ok(updates) => {
                let newly_merged = engine.record_pr_updates(&updates)?;
                for branch in &newly_merged {
                    output::info(&format!("'{branch}' was merged - folding into the trunk"));
                }
            }
            Err(e) => output::warn(&format!("PR reconciliation failed: {e}")),
        }
    } else {
        output::warn("no GitHub token or repository - skipping merged-PR detection and PR updates");
    }

    restack::report("sync", &engine.restack(&targets)?)?;

    if push_choice != Choice::No {
        push_phase(&ctx, &runtime, reconciler.as_ref(), &targets, push_choice)?;
    }
    if prune_choice != Choice::No {
        prune_phase(&ctx, prune_choice)?;
    }

    Ok(())
}

fn build_client(ctx: &Context) -> Option<GitHubClient> {
    let result = match &ctx.config.github.api_url {
        Some(url) => GitHubClient::with_base_url(&Auth::auto(), url.clone()),
        None => GitHubClient::new(&Auth::auto()),
    };
    result.ok()
}

/// Classify, confirm, and execute the atomic push, cycling drafts when a
/// CODEOWNERS file would trigger review spam.
fn push_phase<P: strata_github::PullRequestApi>(
    ctx: &Context,
    runtime: &tokio::runtime::Runtime,
    reconciler: Option<&PrReconciler<'_, P>>,
    targets: &[String],
    choice: Choice,
) -> Result<()> {
    let facts = match reconciler {
        Some(reconciler) => {
            match runtime.block_on(reconciler.push_facts(&ctx.db, &ctx.trunk, targets)) {
                Ok(facts) => facts,
                Err(e) => {
                    output::warn(&format!("could not fetch PR state, not pushing: {e}"));
                    return Ok(());
                }
            }
        }
        None => std::collections::HashMap::new(),
    };

    let snapshot = ctx.db.read_tx();
    let plan = push::plan(&ctx.repo, &snapshot, &ctx.remote, targets, &facts)?;

    for (branch, reason) in &plan.skipped {
        output::item(&format!("not pushing '{branch}': {reason}"));
    }
    if plan.is_empty() {
        output::info("nothing to push");
        return Ok(());
    }

    let names: Vec<&str> = plan.items.iter().map(|i| i.branch.as_str()).collect();
    if !choice.decide(&format!("Push {} branch(es) ({})?", names.len(), names.join(", "))) {
        output::info("not pushing");
        return Ok(());
    }

    let has_codeowners = ctx
        .repo
        .workdir()
        .is_some_and(|dir| dir.join(".github/CODEOWNERS").exists());

    let pushed: Vec<String> = plan.items.iter().map(|i| i.branch.clone()).collect();
    let drafted = match (has_codeowners, reconciler) {
        (true, Some(reconciler)) => runtime
            .block_on(reconciler.convert_to_draft(&ctx.db, &pushed))
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let result = push::execute(&ctx.repo, &ctx.remote, &plan);

    if let Some(reconciler) = reconciler {
        if !drafted.is_empty() {
            if let Err(e) = runtime.block_on(reconciler.mark_ready(&drafted)) {
                output::warn(&format!("failed to un-draft PRs: {e}"));
            }
        }
        if result.is_ok() {
            match runtime.block_on(reconciler.update_pr_metadata(&ctx.db, &ctx.trunk, targets)) {
                Ok(updated) if updated > 0 => {
                    output::info(&format!("updated {updated} PR(s)"));
                }
                Ok(_) => {}
                Err(e) => output::warn(&format!("failed to update PR metadata: {e}")),
            }
        }
    }

    result?;
    output::success(&format!("pushed {} branch(es) atomically", pushed.len()));
    Ok(())
}

/// Classify, confirm, and execute merged-branch deletion.
fn prune_phase(ctx: &Context, choice: Choice) -> Result<()> {
    let remote_refs = match ctx.repo.ls_remote(&ctx.remote) {
        Ok(refs) => refs,
        Err(e) => {
            output::warn(&format!("cannot reach remote, skipping prune: {e}"));
            return Ok(());
        }
    };

    let snapshot = ctx.db.read_tx();
    let plan = prune::plan(&ctx.repo, &snapshot, &remote_refs)?;

    for (branch, reason) in &plan.skipped {
        output::item(&format!("keeping '{branch}': {reason}"));
    }
    if plan.delete.is_empty() {
        return Ok(());
    }

    if !choice.decide(&format!(
        "Delete {} merged branch(es) ({})?",
        plan.delete.len(),
        plan.delete.join(", ")
    )) {
        output::info("not pruning");
        return Ok(());
    }

    let report = prune::execute(&ctx.repo, &ctx.db, &plan, &ctx.trunk, &ctx.remote)?;
    output::success(&format!("deleted {} branch(es)", report.deleted.len()));
    if let Some(to) = report.restored_to {
        output::info(&format!("checked out '{to}'"));
    }
    Ok(())
}
