//! Shared command plumbing: opening the repository, config, database, and
//! checkpoint store together.

use anyhow::{bail, Context as _, Result};
use strata_core::{BranchName, CheckpointStore, Config, MetaDb};
use strata_git::Repository;

use crate::output;

/// Everything a command needs to talk to one repository.
pub struct Context {
    /// Git adapter.
    pub repo: Repository,
    /// User configuration.
    pub config: Config,
    /// Remote name (config, default `origin`).
    pub remote: String,
    /// The trunk branch this repository stacks on.
    pub trunk: String,
    /// The stack database.
    pub db: MetaDb,
    /// Checkpoint store for resumable operations.
    pub checkpoints: CheckpointStore,
}

impl Context {
    /// Open the repository containing the current directory.
    ///
    /// # Errors
    /// Fails outside a git repository, or when no trunk can be derived.
    pub fn open() -> Result<Self> {
        let repo = Repository::open_current().context("not inside a git repository")?;
        let git_dir = repo.git_dir().to_path_buf();

        let config = Config::load(MetaDb::state_dir(&git_dir).join("config.toml"))?;
        let remote = config.general.remote.clone();
        let trunk = resolve_trunk(&repo, &config, &remote)?;

        let db = MetaDb::open(&git_dir, BranchName::new(trunk.as_str())?)?;
        for warning in db.warnings() {
            output::warn(warning);
        }

        let checkpoints = CheckpointStore::new(&git_dir);

        Ok(Self {
            repo,
            config,
            remote,
            trunk,
            db,
            checkpoints,
        })
    }

    /// Fail unless `strata init` has been run here.
    ///
    /// # Errors
    /// Returns a guidance error when the database file doesn't exist.
    pub fn require_initialized(&self) -> Result<()> {
        if self.db.path().exists() {
            Ok(())
        } else {
            bail!("strata is not initialized in this repository - run `strata init` first")
        }
    }
}

/// Trunk resolution order: config override, the remote's symbolic HEAD,
/// then a local `main`/`master` probe.
fn resolve_trunk(repo: &Repository, config: &Config, remote: &str) -> Result<String> {
    if let Some(trunk) = &config.general.trunk {
        return Ok(trunk.clone());
    }
    if let Some(trunk) = repo.default_trunk(remote) {
        return Ok(trunk);
    }
    for candidate in ["main", "master"] {
        if repo.branch_exists(candidate) {
            return Ok(candidate.to_string());
        }
    }
    bail!(
        "cannot determine the trunk branch - fetch the remote or set `general.trunk` \
         in .git/strata/config.toml"
    )
}
