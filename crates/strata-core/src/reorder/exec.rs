//! The reorder plan executor.
//!
//! Interprets a plan command by command, rebuilding the stack from scratch:
//! `stack-branch` resets a branch ref and the database record, `pick`
//! cherry-picks onto it, `delete-branch` removes a record. After every
//! successful command the remaining plan is persisted, so a cherry-pick
//! conflict suspends the whole operation into a checkpoint the user resumes
//! from their shell.

use strata_git::{CherryPickOutcome, GitOps, Head, Oid};

use crate::branch_name::BranchName;
use crate::checkpoint::{Checkpoint, CheckpointStore, OpKind};
use crate::error::{Error, Result};
use crate::meta::{Branch, MetaDb, Parent};
use crate::reorder::plan::{Command, ParentSpec, Plan};

/// Result of driving a reorder plan.
#[derive(Debug)]
pub enum ReorderOutcome {
    /// The whole plan executed; the checkpoint is gone.
    Complete(ReorderReport),
    /// A pick stopped on conflicts; the checkpoint holds it plus the
    /// remaining commands.
    Conflicted {
        /// The commit that failed to apply.
        commit: String,
        /// Git's description of the conflict.
        stderr: String,
    },
}

/// Counters for a completed reorder.
#[derive(Debug, Default)]
pub struct ReorderReport {
    /// Branches created or repositioned.
    pub branches: Vec<String>,
    /// Commits applied.
    pub picks: usize,
    /// Records removed.
    pub deleted: Vec<String>,
}

/// The reorder engine.
pub struct ReorderEngine<'a, G: GitOps> {
    git: &'a G,
    db: &'a MetaDb,
    checkpoints: &'a CheckpointStore,
    remote: String,
}

impl<'a, G: GitOps> ReorderEngine<'a, G> {
    /// Create an engine.
    pub const fn new(
        git: &'a G,
        db: &'a MetaDb,
        checkpoints: &'a CheckpointStore,
        remote: String,
    ) -> Self {
        Self {
            git,
            db,
            checkpoints,
            remote,
        }
    }

    /// Execute a plan from the top.
    ///
    /// `original` is the generated plan the user edited, when there was
    /// one; branches it stacked that the edited plan neither stacks nor
    /// deletes must still exist in git, otherwise the plan is rejected
    /// before anything runs.
    ///
    /// # Errors
    /// Returns [`Error::OperationInProgress`] if any checkpoint exists,
    /// plan validation errors, or git/database errors.
    pub fn start(&self, mut plan: Plan, original: Option<&Plan>) -> Result<ReorderOutcome> {
        if let Some(existing) = self.checkpoints.in_progress() {
            return Err(Error::OperationInProgress(existing));
        }
        self.git.require_clean()?;

        plan.resolve_implicit_parents()?;
        self.validate(&plan, original)?;

        let original_head = match self.git.head()? {
            Head::Branch(name) => name,
            Head::Detached(oid) => oid.to_string(),
        };

        let queue: Vec<String> = plan.commands.iter().map(Command::to_line).collect();
        let checkpoint = Checkpoint::new(OpKind::Reorder, original_head, queue);
        self.checkpoints.create(&checkpoint)?;

        self.run(checkpoint, ReorderReport::default())
    }

    /// Resume after the user resolved a pick conflict and staged the result.
    ///
    /// # Errors
    /// Returns [`Error::NothingToContinue`] when the checkpoint names a
    /// conflicted pick but git has no cherry-pick in progress.
    pub fn continue_(&self) -> Result<ReorderOutcome> {
        let mut checkpoint = self.checkpoints.load(OpKind::Reorder)?;

        match checkpoint.current.clone() {
            Some(line) => {
                if !self.git.is_cherry_picking() {
                    return Err(Error::NothingToContinue);
                }
                match self.git.cherry_pick_continue()? {
                    CherryPickOutcome::Conflict { stderr, .. } => Ok(ReorderOutcome::Conflicted {
                        commit: pick_commit(&line).unwrap_or_default(),
                        stderr,
                    }),
                    CherryPickOutcome::Success | CherryPickOutcome::FastForward => {
                        checkpoint.current = None;
                        self.checkpoints.update(&checkpoint)?;
                        self.run(checkpoint, ReorderReport::default())
                    }
                }
            }
            // Interrupted between commands: just drain the queue.
            None => self.run(checkpoint, ReorderReport::default()),
        }
    }

    /// Abort: cancel any in-progress cherry-pick, restore HEAD, drop the
    /// checkpoint. Records already rewritten by executed commands stay -
    /// each command committed its own transaction.
    ///
    /// # Errors
    /// Returns git or checkpoint errors.
    pub fn abort(&self) -> Result<()> {
        let checkpoint = self.checkpoints.load(OpKind::Reorder)?;

        self.git.cherry_pick_abort()?;
        self.checkpoints.clear(OpKind::Reorder)?;

        if self.git.branch_exists(&checkpoint.original_head) {
            self.git.checkout_branch(&checkpoint.original_head, false)?;
        }
        Ok(())
    }

    /// Reject plans that would lose branches or create parent cycles.
    fn validate(&self, plan: &Plan, original: Option<&Plan>) -> Result<()> {
        if let Some(original) = original {
            let diff = super::plan::diff(original, plan);
            let lost: Vec<String> = diff
                .removed
                .into_iter()
                .filter(|name| !self.git.branch_exists(name))
                .collect();
            if !lost.is_empty() {
                return Err(Error::PlanDropsBranches(lost.join(", ")));
            }
        }

        let snapshot = self.db.read_tx();
        for command in &plan.commands {
            if let Command::StackBranch {
                name,
                parent: Some(ParentSpec::Branch(parent)),
            } = command
            {
                // A parent stacked earlier in this same plan is being
                // rebuilt anyway; only pre-existing descendants can cycle.
                if snapshot.would_create_cycle(name, parent)
                    && !plan.stacked_branches().contains(&parent.as_str())
                {
                    return Err(Error::CycleDetected {
                        branch: name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn run(&self, mut checkpoint: Checkpoint, mut report: ReorderReport) -> Result<ReorderOutcome> {
        while let Some(line) = checkpoint.take_next() {
            self.checkpoints.update(&checkpoint)?;

            let command = parse_line(&line)?;
            match self.execute(&command, &mut report)? {
                None => {
                    checkpoint.current = None;
                    self.checkpoints.update(&checkpoint)?;
                }
                Some((commit, stderr)) => {
                    return Ok(ReorderOutcome::Conflicted {
                        commit: commit.to_string(),
                        stderr,
                    });
                }
            }
        }

        self.checkpoints.clear(OpKind::Reorder)?;
        if self.git.branch_exists(&checkpoint.original_head) {
            self.git.checkout_branch(&checkpoint.original_head, false)?;
        }
        Ok(ReorderOutcome::Complete(report))
    }

    /// Execute one command. Returns `Some((commit, stderr))` when a pick
    /// conflicts.
    fn execute(
        &self,
        command: &Command,
        report: &mut ReorderReport,
    ) -> Result<Option<(Oid, String)>> {
        match command {
            Command::StackBranch { name, parent } => {
                self.stack_branch(name, parent.as_ref())?;
                report.branches.push(name.clone());
                Ok(None)
            }
            Command::Pick { commit } => {
                let oid = self.git.rev_parse(commit)?;
                match self.git.cherry_pick(oid, true)? {
                    CherryPickOutcome::Success | CherryPickOutcome::FastForward => {
                        report.picks += 1;
                        Ok(None)
                    }
                    CherryPickOutcome::Conflict { commit, stderr } => Ok(Some((commit, stderr))),
                }
            }
            Command::DeleteBranch { name, delete_ref } => {
                let mut tx = self.db.write_tx();
                tx.delete_branch(name);
                tx.commit()?;

                if *delete_ref && self.git.branch_exists(name) {
                    if self.git.current_branch().ok().as_deref() == Some(name.as_str()) {
                        self.git.detach_head()?;
                    }
                    self.git.branch_delete(name, true)?;
                }
                report.deleted.push(name.clone());
                Ok(None)
            }
        }
    }

    /// Point `name` at its parent's tip and make it the current branch.
    fn stack_branch(&self, name: &str, parent: Option<&ParentSpec>) -> Result<()> {
        let spec = parent.ok_or_else(|| Error::PlanParse {
            line: 0,
            message: format!("stack-branch {name} has no resolved parent"),
        })?;

        let (base, record_parent) = match spec {
            ParentSpec::Trunk { name: trunk, commit } => {
                let base = match commit.as_deref() {
                    Some(commit) => self.git.rev_parse(commit)?,
                    None => self.trunk_tip(trunk)?,
                };
                let trunk_name = BranchName::new(trunk.as_str())?;
                (base, Parent::trunk(trunk_name))
            }
            ParentSpec::Branch(parent) => {
                let base = self.git.branch_oid(parent)?;
                let parent_name = BranchName::new(parent.as_str())?;
                (base, Parent::branch(parent_name, base.to_string()))
            }
        };

        // Detach first: resetting the ref under a checked-out branch would
        // leave the index fighting the working tree.
        if self.git.current_branch().ok().as_deref() == Some(name) {
            self.git.detach_head()?;
        }
        self.git
            .update_ref(&format!("refs/heads/{name}"), base, None)?;
        self.git.checkout_branch(name, false)?;

        let mut tx = self.db.write_tx();
        let branch_name = BranchName::new(name)?;
        let (mut record, exists) = tx.branch(name);
        if exists {
            record.parent = record_parent;
        } else {
            record = Branch::new(branch_name, record_parent);
        }
        tx.set_branch(record);
        tx.commit()
    }

    fn trunk_tip(&self, trunk: &str) -> Result<Oid> {
        if let Ok(oid) = self.git.remote_tracking_oid(&self.remote, trunk) {
            return Ok(oid);
        }
        self.git
            .branch_oid(trunk)
            .map_err(|_| Error::BranchNotFound(trunk.to_string()))
    }
}

fn parse_line(line: &str) -> Result<Command> {
    let mut plan = Plan::parse(line)?;
    plan.commands.pop().ok_or(Error::PlanParse {
        line: 1,
        message: "empty command line in checkpoint".to_string(),
    })
}

fn pick_commit(line: &str) -> Option<String> {
    match parse_line(line).ok()? {
        Command::Pick { commit } => Some(commit),
        _ => None,
    }
}
