//! `strata adopt` - bring branches created with plain git under management.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use strata_core::detect::{self, Detection};
use strata_git::{Oid, RefKind};

use crate::commands::Context;
use crate::output;

/// Run the adopt command.
pub fn run(branches: &[String], dry_run: bool, yes: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let snapshot = ctx.db.read_tx();

    // Candidate parents: every local branch except the trunk.
    let mut candidates: BTreeMap<String, Oid> = BTreeMap::new();
    for info in ctx.repo.list_refs(&["refs/heads/*"])? {
        if info.kind == RefKind::LocalBranch && info.name != ctx.trunk {
            candidates.insert(info.name, info.oid);
        }
    }

    let targets: Vec<String> = if branches.is_empty() {
        candidates
            .keys()
            .filter(|name| !snapshot.contains(name))
            .cloned()
            .collect()
    } else {
        for branch in branches {
            if !ctx.repo.branch_exists(branch) {
                bail!("branch '{branch}' does not exist");
            }
            if snapshot.contains(branch) {
                output::info(&format!("'{branch}' is already managed"));
            }
        }
        branches
            .iter()
            .filter(|b| !snapshot.contains(b))
            .cloned()
            .collect()
    };

    if targets.is_empty() {
        output::success("nothing to adopt - every branch is already managed");
        return Ok(());
    }

    let trunk_tip = trunk_tip(&ctx)?;
    let detections = detect::detect(&ctx.repo, &ctx.trunk, trunk_tip, &targets, &candidates)?;

    let mut adoptable = Vec::new();
    for detection in &detections {
        match detection {
            Detection::Stacked {
                branch,
                parent,
                commits,
                ..
            } => {
                output::info(&format!(
                    "'{branch}' stacks on '{parent}' ({} commit(s))",
                    commits.len()
                ));
                adoptable.push(detection.clone());
            }
            Detection::ContainsMerge { branch, at } => {
                output::warn(&format!(
                    "'{branch}' contains a merge commit ({at}) - adopt it manually or linearize first"
                ));
            }
            Detection::AmbiguousParent {
                branch, candidates, ..
            } => {
                output::warn(&format!(
                    "'{branch}' has an ambiguous parent (candidates: {}) - \
                     adopt it explicitly once you know which",
                    candidates.join(", ")
                ));
            }
            Detection::NoParentFound { branch } => {
                output::warn(&format!(
                    "'{branch}' shares no history with '{}' - not adopting",
                    ctx.trunk
                ));
            }
        }
    }

    if adoptable.is_empty() {
        output::info("no branches could be adopted automatically");
        return Ok(());
    }

    if dry_run {
        output::info(&format!(
            "dry run - would adopt {} branch(es)",
            adoptable.len()
        ));
        return Ok(());
    }

    if !yes {
        let confirmed = inquire::Confirm::new(&format!("Adopt {} branch(es)?", adoptable.len()))
            .with_default(true)
            .prompt()
            .unwrap_or(false);
        if !confirmed {
            output::info("aborted");
            return Ok(());
        }
    }

    let adopted = detect::adopt(&ctx.db, &adoptable)?;
    output::success(&format!("adopted {} branch(es)", adopted.len()));
    Ok(())
}

fn trunk_tip(ctx: &Context) -> Result<Oid> {
    if let Ok(oid) = ctx.repo.remote_tracking_oid(&ctx.remote, &ctx.trunk) {
        return Ok(oid);
    }
    Ok(ctx.repo.branch_oid(&ctx.trunk)?)
}
