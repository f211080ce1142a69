//! The sync controller.
//!
//! Sync is fetch → classify merged PRs → tidy/prune candidates → restack →
//! push. The provider round-trips happen in the service layer; this module
//! owns the metadata mutations and the delegation into the restack engine,
//! so the ordering guarantees live in one place.

use strata_git::GitOps;

use crate::checkpoint::{CheckpointStore, OpKind};
use crate::error::{Error, Result};
use crate::meta::{CommitId, MetaDb, Parent, PrState};
use crate::restack::{RestackEngine, RestackOpts, RestackOutcome};

/// Options controlling a sync run.
#[derive(Debug, Clone)]
pub struct SyncOpts {
    /// Remote to fetch from and push to.
    pub remote: String,
    /// Sync every managed stack, not just the current one.
    pub all: bool,
    /// Move stack roots onto the trunk tip.
    pub rebase_to_trunk: bool,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            all: false,
            rebase_to_trunk: false,
        }
    }
}

/// Provider-observed state for one branch's PR, applied before restacking.
#[derive(Debug, Clone)]
pub struct PrUpdate {
    /// The managed branch.
    pub branch: String,
    /// Observed PR state.
    pub state: PrState,
    /// The merge commit, once the provider reports one.
    pub merge_commit: Option<CommitId>,
}

/// Result of a tidy pass.
#[derive(Debug, Default)]
pub struct TidyReport {
    /// Records removed because their git ref is gone.
    pub removed: Vec<String>,
    /// Children re-pointed across a removed record: `(child, new_parent)`.
    pub reparented: Vec<(String, String)>,
}

/// The sync controller.
pub struct SyncEngine<'a, G: GitOps> {
    git: &'a G,
    db: &'a MetaDb,
    checkpoints: &'a CheckpointStore,
    opts: SyncOpts,
}

impl<'a, G: GitOps> SyncEngine<'a, G> {
    /// Create a controller.
    pub const fn new(
        git: &'a G,
        db: &'a MetaDb,
        checkpoints: &'a CheckpointStore,
        opts: SyncOpts,
    ) -> Self {
        Self {
            git,
            db,
            checkpoints,
            opts,
        }
    }

    /// Fetch the remote (trunk included) before anything else looks at
    /// remote-tracking refs.
    ///
    /// # Errors
    /// Returns fetch failures.
    pub fn fetch(&self) -> Result<()> {
        Ok(self.git.fetch(&self.opts.remote, &[])?)
    }

    /// Record provider-observed PR states and merge commits.
    ///
    /// Returns the branches newly recorded as merged; their stacks must
    /// move forward during the restack phase.
    ///
    /// # Errors
    /// Returns database errors.
    pub fn record_pr_updates(&self, updates: &[PrUpdate]) -> Result<Vec<String>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let mut newly_merged = Vec::new();
        let mut tx = self.db.write_tx();

        for update in updates {
            let (mut record, exists) = tx.branch(&update.branch);
            if !exists {
                continue;
            }

            let was_merged = record.is_merged();
            if let Some(pr) = record.pull_request.as_mut() {
                pr.state = update.state;
            }
            if let Some(merge_commit) = &update.merge_commit {
                record.merge_commit = Some(merge_commit.clone());
            }
            if record.is_merged() && !was_merged {
                newly_merged.push(update.branch.clone());
            }
            tx.set_branch(record);
        }

        tx.commit()?;
        Ok(newly_merged)
    }

    /// The branches this sync should restack: every managed branch with
    /// `--all` (minus the excluded ones), otherwise the current stack.
    ///
    /// # Errors
    /// Returns [`Error::NotManaged`] when the current branch isn't in the
    /// database and `--all` wasn't given.
    pub fn targets(&self, current_branch: &str) -> Result<Vec<String>> {
        let snapshot = self.db.read_tx();

        if self.opts.all {
            return Ok(snapshot
                .all_branches()
                .filter(|b| !b.excluded_from_sync_all)
                .map(|b| b.name.to_string())
                .collect());
        }

        if !snapshot.contains(current_branch) {
            return Err(Error::NotManaged(current_branch.to_string()));
        }
        Ok(snapshot
            .stack_branches(current_branch)
            .iter()
            .map(|b| b.name.to_string())
            .collect())
    }

    /// Restack the given branches under the sync operation kind.
    ///
    /// # Errors
    /// Propagates restack engine errors.
    pub fn restack(&self, targets: &[String]) -> Result<RestackOutcome> {
        self.engine().start(targets, OpKind::Sync)
    }

    /// Resume a conflicted sync.
    ///
    /// # Errors
    /// Propagates restack engine errors.
    pub fn continue_(&self) -> Result<RestackOutcome> {
        self.engine().continue_()
    }

    /// Skip the conflicting commit of a conflicted sync.
    ///
    /// # Errors
    /// Propagates restack engine errors.
    pub fn skip(&self) -> Result<RestackOutcome> {
        self.engine().skip()
    }

    /// Abort a conflicted sync.
    ///
    /// # Errors
    /// Propagates restack engine errors.
    pub fn abort(&self) -> Result<()> {
        self.engine().abort()
    }

    fn engine(&self) -> RestackEngine<'a, G> {
        RestackEngine::new(
            self.git,
            self.db,
            self.checkpoints,
            RestackOpts {
                remote: self.opts.remote.clone(),
                rebase_to_trunk: self.opts.rebase_to_trunk,
            },
        )
    }
}

/// Drop records whose git ref has vanished, re-pointing their children at
/// the next surviving ancestor.
///
/// A child keeps its own head snapshot when the new parent is a branch -
/// the snapshot still bounds exactly the child's commits, because the
/// deleted branch's history lives on in the surviving parent (the
/// fast-forward / manual-delete case). When the new parent is a trunk the
/// snapshot drops, per the trunk-parent invariant.
///
/// # Errors
/// Returns database errors.
pub fn tidy<G: GitOps>(git: &G, db: &MetaDb) -> Result<TidyReport> {
    let snapshot = db.read_tx();
    let gone: Vec<String> = snapshot
        .all_branches()
        .filter(|b| !git.branch_exists(b.name.as_str()))
        .map(|b| b.name.to_string())
        .collect();

    if gone.is_empty() {
        return Ok(TidyReport::default());
    }

    let mut report = TidyReport::default();
    let mut tx = db.write_tx();

    for name in &gone {
        let (record, _) = tx.branch(name);

        // Chase through consecutive gone branches to the first survivor.
        let mut new_parent = record.parent.clone();
        while !new_parent.trunk && gone.contains(&new_parent.name.to_string()) {
            let (next, exists) = tx.branch(new_parent.name.as_str());
            if !exists {
                break;
            }
            new_parent = next.parent.clone();
        }

        for child in snapshot.children(name) {
            let (mut child_record, exists) = tx.branch(child.name.as_str());
            if !exists {
                continue;
            }
            child_record.parent = if new_parent.trunk {
                Parent::trunk(new_parent.name.clone())
            } else {
                Parent {
                    name: new_parent.name.clone(),
                    trunk: false,
                    head: child_record.parent.head.clone(),
                }
            };
            tx.set_branch(child_record);
            report
                .reparented
                .push((child.name.to_string(), new_parent.name.to_string()));
        }

        tx.delete_branch(name);
        report.removed.push(name.clone());
    }

    tx.commit()?;
    Ok(report)
}
