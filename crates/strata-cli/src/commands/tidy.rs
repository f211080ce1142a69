//! `strata tidy` - drop records for branches deleted out from under us.

use anyhow::Result;
use strata_core::sync;

use crate::commands::Context;
use crate::output;

/// Run the tidy command.
pub fn run() -> Result<()> {
    let ctx = Context::open()?;
    ctx.require_initialized()?;

    let report = sync::tidy(&ctx.repo, &ctx.db)?;

    if report.removed.is_empty() {
        output::success("nothing to tidy - every managed branch still exists");
        return Ok(());
    }

    output::success(&format!(
        "removed {} stale record(s) from the stack database",
        report.removed.len()
    ));
    for name in &report.removed {
        output::item(name);
    }
    for (child, parent) in &report.reparented {
        output::info(&format!("'{child}' now stacks on '{parent}'"));
    }
    Ok(())
}
