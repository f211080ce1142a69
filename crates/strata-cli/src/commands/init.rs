//! `strata init` - create the stack database and config skeleton.

use anyhow::Result;
use strata_core::{MetaDb, Repository as RepoRecord};

use crate::commands::Context;
use crate::output;

/// Run the init command.
pub fn run() -> Result<()> {
    let ctx = Context::open()?;

    if ctx.db.path().exists() {
        output::info("strata is already initialized here");
        return Ok(());
    }

    // Seed the repository record from the origin URL when there is one;
    // the provider-issued id is filled in on the first sync.
    let record = ctx
        .repo
        .inner()
        .find_remote(&ctx.remote)
        .ok()
        .and_then(|remote| remote.url().map(String::from))
        .and_then(|url| parse_owner_repo(&url))
        .map_or_else(RepoRecord::default, |(owner, name)| RepoRecord {
            id: String::new(),
            owner,
            name,
        });

    let mut tx = ctx.db.write_tx();
    tx.set_repository(record);
    tx.commit()?;

    let config_path = MetaDb::state_dir(ctx.repo.git_dir()).join("config.toml");
    if !config_path.exists() {
        ctx.config.save(&config_path)?;
    }

    output::success(&format!(
        "initialized strata (trunk: {}, database: {})",
        ctx.trunk,
        ctx.db.path().display()
    ));
    Ok(())
}

/// Parse `owner/repo` out of an HTTPS or SSH GitHub-style remote URL.
fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let path = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
