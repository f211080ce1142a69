//! `strata status` - render the managed stacks as a tree.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use strata_core::{Branch, Snapshot};

use crate::commands::Context;
use crate::output;

/// One branch's status, as reported to humans and tooling.
#[derive(Debug, Serialize)]
struct BranchStatus {
    name: String,
    parent: String,
    depth: usize,
    needs_restack: bool,
    current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pr: Option<u64>,
    merged: bool,
}

/// Run the status command.
pub fn run(json: bool) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let snapshot = ctx.db.read_tx();
    let current = ctx.repo.current_branch().ok();

    if snapshot.is_empty() {
        output::info("no branches are managed yet - create one with `strata branch`");
        return Ok(());
    }

    let mut rows = Vec::new();
    let roots: Vec<String> = snapshot
        .all_branches()
        .filter(|b| b.parent.trunk || !snapshot.contains(b.parent.name.as_str()))
        .map(|b| b.name.to_string())
        .collect();
    for root in roots {
        collect(&ctx, &snapshot, &root, 0, current.as_deref(), &mut rows);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{} (trunk)", ctx.trunk.bold());
    for row in &rows {
        let indent = "  ".repeat(row.depth + 1);
        let marker = if row.current { "▶" } else { " " };
        let state = if row.merged {
            "merged".magenta().to_string()
        } else if row.needs_restack {
            "needs restack".yellow().to_string()
        } else {
            "in sync".green().to_string()
        };
        let pr = output::pr_ref(row.pr);
        println!(
            "{indent}{marker} {} [{state}] {pr}",
            if row.current {
                row.name.cyan().bold().to_string()
            } else {
                row.name.clone()
            }
        );
    }
    Ok(())
}

fn collect(
    ctx: &Context,
    snapshot: &Snapshot,
    name: &str,
    depth: usize,
    current: Option<&str>,
    rows: &mut Vec<BranchStatus>,
) {
    let (record, exists) = snapshot.branch(name);
    if !exists {
        return;
    }

    rows.push(BranchStatus {
        name: name.to_string(),
        parent: record.parent.name.to_string(),
        depth,
        needs_restack: needs_restack(ctx, &record),
        current: current == Some(name),
        pr: record.pull_request.as_ref().map(|pr| pr.number),
        merged: record.is_merged(),
    });

    for child in snapshot.children(name) {
        collect(ctx, snapshot, child.name.as_str(), depth + 1, current, rows);
    }
}

/// A branch needs a restack when its recorded parent snapshot no longer
/// matches the parent's tip, or it isn't a descendant of that tip.
fn needs_restack(ctx: &Context, record: &Branch) -> bool {
    let Ok(tip) = ctx.repo.branch_oid(record.name.as_str()) else {
        return false;
    };

    if record.parent.trunk {
        return false;
    }
    let Ok(parent_tip) = ctx.repo.branch_oid(record.parent.name.as_str()) else {
        return false;
    };
    if record.parent.head.as_deref() != Some(parent_tip.to_string().as_str()) {
        return true;
    }
    !ctx.repo.is_ancestor(parent_tip, tip).unwrap_or(true)
}
