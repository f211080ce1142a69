//! `strata branch` - create a managed branch stacked on the current one.

use anyhow::{bail, Result};
use strata_core::{Branch, BranchName, Parent};

use crate::commands::Context;
use crate::output;

/// Run the branch command.
pub fn run(name: &str, parent: Option<&str>) -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let name = BranchName::new(name)?;
    if ctx.repo.branch_exists(&name) {
        bail!("branch '{name}' already exists - use `strata adopt {name}` to manage it");
    }

    let parent_name = match parent {
        Some(parent) => parent.to_string(),
        None => ctx.repo.current_branch()?,
    };

    let snapshot = ctx.db.read_tx();
    let parent_record = if parent_name == ctx.trunk || snapshot.is_trunk(&parent_name) {
        Parent::trunk(BranchName::new(parent_name.as_str())?)
    } else {
        if !snapshot.contains(&parent_name) {
            bail!(
                "parent '{parent_name}' is not managed - adopt it first with \
                 `strata adopt {parent_name}`"
            );
        }
        let tip = ctx.repo.branch_oid(&parent_name)?;
        Parent::branch(BranchName::new(parent_name.as_str())?, tip.to_string())
    };

    // Branch from the parent's tip, not wherever HEAD happens to be.
    if ctx.repo.current_branch().ok().as_deref() != Some(parent_name.as_str()) {
        ctx.repo.checkout_branch(&parent_name, false)?;
    }
    ctx.repo.checkout_branch(&name, true)?;

    let mut tx = ctx.db.write_tx();
    tx.set_branch(Branch::new(name.clone(), parent_record));
    tx.commit()?;

    output::success(&format!("created '{name}' on '{parent_name}'"));
    Ok(())
}
