//! The restack engine.
//!
//! For each branch, in dependency order, replay exactly the commits the
//! branch introduced onto its parent's new tip. Plain `git rebase <parent>
//! <branch>` is wrong once the parent has itself been rebased - it would
//! replay the old parent's commits too - so every rebase runs as
//! `git rebase --onto <new-tip> <old-tip> <branch>`, where `<old-tip>` is
//! the parent head snapshot recorded at the previous restack.

use std::collections::BTreeSet;

use strata_git::{GitOps, Head, Oid, RebaseOutcome};

use crate::branch_name::BranchName;
use crate::checkpoint::{Checkpoint, CheckpointStore, OpKind};
use crate::error::{Error, Result};
use crate::meta::{Branch, MetaDb, Parent, Snapshot};

/// Options controlling a restack run.
#[derive(Debug, Clone)]
pub struct RestackOpts {
    /// Remote whose tracking refs define trunk tips.
    pub remote: String,
    /// Move stack roots onto the current trunk tip. Without this, roots
    /// stay where they are and only inter-stack rebases happen - unless a
    /// merged branch forces the stack forward.
    pub rebase_to_trunk: bool,
}

impl Default for RestackOpts {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            rebase_to_trunk: false,
        }
    }
}

/// What happened to one branch during a restack run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStep {
    /// Rebased onto the parent's new tip.
    Restacked {
        /// The branch.
        branch: String,
        /// The tip it was rebased onto.
        onto: String,
    },
    /// Already based on the parent's tip; nothing moved.
    UpToDate {
        /// The branch.
        branch: String,
    },
    /// Re-parented onto the trunk because its parent merged.
    Reparented {
        /// The branch.
        branch: String,
        /// The trunk it now sits on.
        trunk: String,
    },
    /// A stack root left at its current position (no `--rebase-to-trunk`).
    LeftAtTrunk {
        /// The branch.
        branch: String,
    },
    /// The branch's git ref no longer exists; `tidy` cleans these up.
    MissingRef {
        /// The branch.
        branch: String,
    },
}

/// Result of driving a restack queue.
#[derive(Debug)]
pub enum RestackOutcome {
    /// Every queued branch was processed; the checkpoint is gone.
    Complete(RestackReport),
    /// A rebase stopped on conflicts; a checkpoint names the branch and
    /// the remaining queue.
    Conflicted {
        /// The operation to name in resume instructions.
        op: OpKind,
        /// The branch whose rebase conflicted.
        branch: String,
        /// Git's description of the conflict.
        stderr: String,
    },
}

/// Per-branch results of a completed run.
#[derive(Debug, Default)]
pub struct RestackReport {
    /// Steps in processing order.
    pub steps: Vec<BranchStep>,
}

impl RestackReport {
    /// Number of branches whose refs actually moved.
    #[must_use]
    pub fn moved(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, BranchStep::Restacked { .. } | BranchStep::Reparented { .. }))
            .count()
    }
}

/// Where one branch's rebase should go.
enum Target {
    /// Root staying put.
    Skip,
    Rebase {
        upstream: Oid,
        onto: Oid,
        new_parent: Parent,
        reparented: bool,
    },
}

/// The restack engine. Drives git, the metadata database, and the
/// checkpoint store; generic over [`GitOps`] for testability.
pub struct RestackEngine<'a, G: GitOps> {
    git: &'a G,
    db: &'a MetaDb,
    checkpoints: &'a CheckpointStore,
    opts: RestackOpts,
}

impl<'a, G: GitOps> RestackEngine<'a, G> {
    /// Create an engine.
    pub const fn new(
        git: &'a G,
        db: &'a MetaDb,
        checkpoints: &'a CheckpointStore,
        opts: RestackOpts,
    ) -> Self {
        Self {
            git,
            db,
            checkpoints,
            opts,
        }
    }

    /// Start a restack of `targets` under the given operation kind.
    ///
    /// The queue is fixed up front in dependency order (roots first);
    /// each branch re-reads its parent's tip when its turn comes, so
    /// children always observe the new tip.
    ///
    /// # Errors
    /// Returns [`Error::OperationInProgress`] if any checkpoint exists,
    /// or a git/database error.
    pub fn start(&self, targets: &[String], op: OpKind) -> Result<RestackOutcome> {
        if let Some(existing) = self.checkpoints.in_progress() {
            return Err(Error::OperationInProgress(existing));
        }
        self.git.require_clean()?;

        let snapshot = self.db.read_tx();
        for target in targets {
            if !snapshot.contains(target) {
                return Err(Error::NotManaged(target.clone()));
            }
        }

        let queue = dependency_order(&snapshot, targets);
        let original_head = match self.git.head()? {
            Head::Branch(name) => name,
            Head::Detached(oid) => oid.to_string(),
        };

        let checkpoint = Checkpoint::new(op, original_head, queue);
        self.checkpoints.create(&checkpoint)?;
        self.run(checkpoint, RestackReport::default())
    }

    /// Resume after the user resolved a conflict and staged the result.
    ///
    /// # Errors
    /// Returns [`Error::NothingToContinue`] when a checkpoint names a
    /// conflicted branch but git has no rebase in progress; the checkpoint
    /// is left untouched.
    pub fn continue_(&self) -> Result<RestackOutcome> {
        let (op, mut checkpoint) = self.load_active()?;

        match self.git.rebase_continue()? {
            RebaseOutcome::Conflict { stderr } => Ok(RestackOutcome::Conflicted {
                op,
                branch: checkpoint.current.clone().unwrap_or_default(),
                stderr,
            }),
            RebaseOutcome::NotInProgress => {
                if checkpoint.current.is_some() {
                    return Err(Error::NothingToContinue);
                }
                // Interrupted between branches: nothing pending in git,
                // just drain the rest of the queue.
                self.run(checkpoint, RestackReport::default())
            }
            RebaseOutcome::Success | RebaseOutcome::AlreadyUpToDate => {
                let mut report = RestackReport::default();
                if let Some(branch) = checkpoint.current.take() {
                    self.finalize_branch(&branch, &mut report)?;
                    self.checkpoints.update(&checkpoint)?;
                }
                self.run(checkpoint, report)
            }
        }
    }

    /// Skip the conflicting branch's stopped commit and move on.
    ///
    /// The branch's metadata is deliberately not updated - the user is
    /// expected to fix it up and restack again.
    ///
    /// # Errors
    /// Returns git or checkpoint errors.
    pub fn skip(&self) -> Result<RestackOutcome> {
        let (op, mut checkpoint) = self.load_active()?;

        match self.git.rebase_skip()? {
            RebaseOutcome::Conflict { stderr } => Ok(RestackOutcome::Conflicted {
                op,
                branch: checkpoint.current.clone().unwrap_or_default(),
                stderr,
            }),
            RebaseOutcome::NotInProgress => {
                if checkpoint.current.is_some() {
                    return Err(Error::NothingToContinue);
                }
                self.run(checkpoint, RestackReport::default())
            }
            RebaseOutcome::Success | RebaseOutcome::AlreadyUpToDate => {
                checkpoint.current = None;
                self.checkpoints.update(&checkpoint)?;
                self.run(checkpoint, RestackReport::default())
            }
        }
    }

    /// Abort: cancel any in-progress rebase, drop the checkpoint, restore
    /// the original HEAD.
    ///
    /// Branches already restacked stay restacked - their metadata commits
    /// are per-branch - while the aborted branch is reverted by git itself.
    ///
    /// # Errors
    /// Returns git or checkpoint errors.
    pub fn abort(&self) -> Result<()> {
        let (op, checkpoint) = self.load_active()?;

        self.git.rebase_abort()?;
        self.checkpoints.clear(op)?;

        if self.git.branch_exists(&checkpoint.original_head) {
            self.git.checkout_branch(&checkpoint.original_head, false)?;
        }
        Ok(())
    }

    fn load_active(&self) -> Result<(OpKind, Checkpoint)> {
        let op = match self.checkpoints.in_progress() {
            Some(op @ (OpKind::Restack | OpKind::Sync)) => op,
            _ => return Err(Error::NoOperationInProgress),
        };
        Ok((op, self.checkpoints.load(op)?))
    }

    /// Drain the queue, checkpointing around every branch.
    fn run(&self, mut checkpoint: Checkpoint, mut report: RestackReport) -> Result<RestackOutcome> {
        while let Some(branch) = checkpoint.take_next() {
            self.checkpoints.update(&checkpoint)?;

            match self.restack_one(&branch, &mut report)? {
                None => {
                    checkpoint.current = None;
                    self.checkpoints.update(&checkpoint)?;
                }
                Some(stderr) => {
                    return Ok(RestackOutcome::Conflicted {
                        op: checkpoint.op,
                        branch,
                        stderr,
                    });
                }
            }
        }

        self.checkpoints.clear(checkpoint.op)?;
        if self.git.branch_exists(&checkpoint.original_head) {
            self.git.checkout_branch(&checkpoint.original_head, false)?;
        }
        Ok(RestackOutcome::Complete(report))
    }

    /// Restack a single branch. Returns `Some(stderr)` on conflict.
    fn restack_one(&self, branch: &str, report: &mut RestackReport) -> Result<Option<String>> {
        let snapshot = self.db.read_tx();
        let (record, exists) = snapshot.branch(branch);
        if !exists {
            return Err(Error::NotManaged(branch.to_string()));
        }
        if !self.git.branch_exists(branch) {
            report.steps.push(BranchStep::MissingRef {
                branch: branch.to_string(),
            });
            return Ok(None);
        }

        let target = self.rebase_target(&snapshot, &record)?;
        let (upstream, onto, new_parent, reparented) = match target {
            Target::Skip => {
                report.steps.push(BranchStep::LeftAtTrunk {
                    branch: branch.to_string(),
                });
                return Ok(None);
            }
            Target::Rebase {
                upstream,
                onto,
                new_parent,
                reparented,
            } => (upstream, onto, new_parent, reparented),
        };

        // Up-to-date short-circuit: same tip, already a descendant.
        let tip = self.git.branch_oid(branch)?;
        if upstream == onto && self.git.is_ancestor(onto, tip)? {
            self.commit_parent(branch, new_parent)?;
            report.steps.push(BranchStep::UpToDate {
                branch: branch.to_string(),
            });
            return Ok(None);
        }

        match self.git.rebase_onto(upstream, onto, branch)? {
            RebaseOutcome::Success => {
                self.commit_parent(branch, new_parent)?;
                report.steps.push(if reparented {
                    BranchStep::Reparented {
                        branch: branch.to_string(),
                        trunk: record_trunk_name(&snapshot, &record),
                    }
                } else {
                    BranchStep::Restacked {
                        branch: branch.to_string(),
                        onto: onto.to_string(),
                    }
                });
                Ok(None)
            }
            RebaseOutcome::AlreadyUpToDate => {
                self.commit_parent(branch, new_parent)?;
                report.steps.push(BranchStep::UpToDate {
                    branch: branch.to_string(),
                });
                Ok(None)
            }
            RebaseOutcome::Conflict { stderr } => Ok(Some(stderr)),
            RebaseOutcome::NotInProgress => Ok(None),
        }
    }

    /// After a `--continue` resolved a branch, write its metadata the same
    /// way a clean rebase would have.
    fn finalize_branch(&self, branch: &str, report: &mut RestackReport) -> Result<()> {
        let snapshot = self.db.read_tx();
        let (record, exists) = snapshot.branch(branch);
        if !exists {
            return Ok(());
        }
        if let Target::Rebase {
            onto,
            new_parent,
            reparented,
            ..
        } = self.rebase_target(&snapshot, &record)?
        {
            self.commit_parent(branch, new_parent)?;
            report.steps.push(if reparented {
                BranchStep::Reparented {
                    branch: branch.to_string(),
                    trunk: record_trunk_name(&snapshot, &record),
                }
            } else {
                BranchStep::Restacked {
                    branch: branch.to_string(),
                    onto: onto.to_string(),
                }
            });
        }
        Ok(())
    }

    /// Compute the upstream/onto pair and resulting parent for one branch.
    fn rebase_target(&self, snapshot: &Snapshot, record: &Branch) -> Result<Target> {
        let tip = self.git.branch_oid(record.name.as_str())?;

        if record.parent.trunk {
            let move_root = self.opts.rebase_to_trunk
                || snapshot
                    .stack_branches(record.name.as_str())
                    .iter()
                    .any(|b| b.is_merged());
            if !move_root {
                return Ok(Target::Skip);
            }

            let onto = self.trunk_tip(record.parent.name.as_str())?;
            let upstream = self.git.merge_base(onto, tip)?;
            return Ok(Target::Rebase {
                upstream,
                onto,
                new_parent: Parent::trunk(record.parent.name.clone()),
                reparented: false,
            });
        }

        let (parent_record, parent_known) = snapshot.branch(record.parent.name.as_str());

        if parent_known && parent_record.is_merged() {
            // The parent landed on its trunk; this branch moves up a level.
            // The recorded snapshot still bounds exactly our own commits -
            // the squash commit on the trunk does not.
            let trunk_name = snapshot
                .trunk_of(record.parent.name.as_str())
                .cloned()
                .unwrap_or_else(|| snapshot.default_trunk().clone());
            let onto = self.trunk_tip(trunk_name.as_str())?;
            let upstream = match record.parent.head.as_deref() {
                Some(head) => parse_oid(head)?,
                None => match parent_record.merge_commit.as_deref() {
                    Some(mc) => parse_oid(mc)?,
                    None => self.git.merge_base(onto, tip)?,
                },
            };
            return Ok(Target::Rebase {
                upstream,
                onto,
                new_parent: Parent::trunk(trunk_name),
                reparented: true,
            });
        }

        // Ordinary case: replay our commits onto the parent's current tip,
        // bounded below by the snapshot from the last restack. The tip is
        // re-read here, never cached, so it reflects this run's rebases.
        let onto = self.git.branch_oid(record.parent.name.as_str())?;
        let upstream = match record.parent.head.as_deref() {
            Some(head) => parse_oid(head)?,
            None => self.git.merge_base(onto, tip)?,
        };
        Ok(Target::Rebase {
            upstream,
            onto,
            new_parent: Parent::branch(record.parent.name.clone(), onto.to_string()),
            reparented: false,
        })
    }

    /// The trunk's tip: the remote-tracking ref when it exists, else the
    /// local branch.
    fn trunk_tip(&self, trunk: &str) -> Result<Oid> {
        if let Ok(oid) = self.git.remote_tracking_oid(&self.opts.remote, trunk) {
            return Ok(oid);
        }
        self.git
            .branch_oid(trunk)
            .map_err(|_| Error::BranchNotFound(trunk.to_string()))
    }

    /// Commit a branch's new parent pointer in its own transaction.
    fn commit_parent(&self, branch: &str, parent: Parent) -> Result<()> {
        let mut tx = self.db.write_tx();
        let (mut record, exists) = tx.branch(branch);
        if !exists {
            return Ok(());
        }
        record.parent = parent;
        tx.set_branch(record);
        tx.commit()
    }
}

fn record_trunk_name(snapshot: &Snapshot, record: &Branch) -> String {
    snapshot
        .trunk_of(record.parent.name.as_str())
        .map_or_else(|| snapshot.default_trunk().to_string(), BranchName::to_string)
}

fn parse_oid(hex: &str) -> Result<Oid> {
    Oid::from_str(hex).map_err(|_| Error::Git(strata_git::Error::RevParseFailed(hex.to_string())))
}

/// Order `targets` parents-before-children, roots first, walking the whole
/// managed forest for a stable order.
fn dependency_order(snapshot: &Snapshot, targets: &[String]) -> Vec<String> {
    let wanted: BTreeSet<&str> = targets.iter().map(String::as_str).collect();

    let mut order = Vec::new();
    let mut frontier: Vec<String> = snapshot
        .all_branches()
        .filter(|b| b.parent.trunk || !snapshot.contains(b.parent.name.as_str()))
        .map(|b| b.name.to_string())
        .collect();

    // Depth-first keeps each stack contiguous; children() is name-ordered
    // so the order is deterministic.
    frontier.reverse();
    while let Some(name) = frontier.pop() {
        let children = snapshot.children(&name);
        for child in children.iter().rev() {
            frontier.push(child.name.to_string());
        }
        if wanted.contains(name.as_str()) {
            order.push(name);
        }
    }
    order
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::GitFixture;

    fn setup(fixture: &GitFixture) -> (MetaDb, CheckpointStore) {
        let git_dir = fixture.repo.git_dir().to_path_buf();
        let db = MetaDb::open(&git_dir, BranchName::new("main").unwrap()).unwrap();
        let checkpoints = CheckpointStore::new(&git_dir);
        (db, checkpoints)
    }

    fn manage(db: &MetaDb, name: &str, parent: Parent) {
        let mut tx = db.write_tx();
        tx.set_branch(Branch::new(BranchName::new(name).unwrap(), parent));
        tx.commit().unwrap();
    }

    fn engine<'a>(
        fixture: &'a GitFixture,
        db: &'a MetaDb,
        checkpoints: &'a CheckpointStore,
    ) -> RestackEngine<'a, strata_git::Repository> {
        RestackEngine::new(&fixture.repo, db, checkpoints, RestackOpts::default())
    }

    /// Amend the parent, restack the child: the child must carry exactly
    /// its own commit, replayed onto the new parent tip.
    #[test]
    fn restack_after_parent_moves() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        let one_tip = fixture.commit("one.txt", "1\n", "one: first");
        fixture.branch("two");
        fixture.commit("two.txt", "2\n", "two: first");

        manage(
            &db,
            "one",
            Parent::trunk(BranchName::new("main").unwrap()),
        );
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), one_tip.to_string()),
        );

        // "Amend" one by adding a commit.
        fixture.checkout("one");
        let new_one_tip = fixture.commit("one.txt", "1 amended\n", "one: amended");

        let eng = engine(&fixture, &db, &checkpoints);
        let outcome = eng
            .start(&["one".into(), "two".into()], OpKind::Restack)
            .unwrap();

        let RestackOutcome::Complete(report) = outcome else {
            panic!("unexpected conflict");
        };
        assert_eq!(report.moved(), 1);

        // two now sits on one's new tip with exactly one commit of its own.
        let two_tip = fixture.repo.branch_oid("two").unwrap();
        assert!(fixture.repo.is_ancestor(new_one_tip, two_tip).unwrap());
        let own = fixture
            .repo
            .rev_list(two_tip, Some(new_one_tip), false)
            .unwrap();
        assert_eq!(own.len(), 1);

        // Snapshot updated to the new parent tip.
        let (two, _) = db.read_tx().branch("two");
        assert_eq!(two.parent.head.as_deref(), Some(&*new_one_tip.to_string()));

        // Checkpoint is gone.
        assert!(checkpoints.in_progress().is_none());
    }

    /// Restack twice; the second run must not move any refs.
    #[test]
    fn restack_is_idempotent() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        let one_tip = fixture.commit("one.txt", "1\n", "one: first");
        fixture.branch("two");
        fixture.commit("two.txt", "2\n", "two: first");
        fixture.checkout("one");
        fixture.commit("one.txt", "1b\n", "one: more");

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), one_tip.to_string()),
        );

        let eng = engine(&fixture, &db, &checkpoints);
        let targets = vec!["one".to_string(), "two".to_string()];
        eng.start(&targets, OpKind::Restack).unwrap();

        let tips_after_first = (
            fixture.repo.branch_oid("one").unwrap(),
            fixture.repo.branch_oid("two").unwrap(),
        );
        let db_bytes_first = std::fs::read(db.path()).unwrap();

        let outcome = eng.start(&targets, OpKind::Restack).unwrap();
        let RestackOutcome::Complete(report) = outcome else {
            panic!("unexpected conflict");
        };
        assert_eq!(report.moved(), 0);

        let tips_after_second = (
            fixture.repo.branch_oid("one").unwrap(),
            fixture.repo.branch_oid("two").unwrap(),
        );
        assert_eq!(tips_after_first, tips_after_second);
        assert_eq!(db_bytes_first, std::fs::read(db.path()).unwrap());
    }

    /// Conflict suspends with a checkpoint; --continue finishes the queue
    /// and rebases the grandchild onto the resolved tip.
    #[test]
    fn conflict_then_continue() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        let one_tip = fixture.commit("shared.txt", "from one\n", "one: shared");
        fixture.branch("two");
        let two_tip = fixture.commit("shared.txt", "from two\n", "two: shared");
        fixture.branch("three");
        fixture.commit("three.txt", "3\n", "three: own");

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), one_tip.to_string()),
        );
        manage(
            &db,
            "three",
            Parent::branch(BranchName::new("two").unwrap(), two_tip.to_string()),
        );

        // Amend one with a conflicting edit to shared.txt.
        fixture.checkout("one");
        fixture.commit("shared.txt", "one again\n", "one: conflicting");

        let eng = engine(&fixture, &db, &checkpoints);
        let outcome = eng
            .start(
                &["one".into(), "two".into(), "three".into()],
                OpKind::Restack,
            )
            .unwrap();

        let RestackOutcome::Conflicted { branch, .. } = outcome else {
            panic!("expected a conflict on two");
        };
        assert_eq!(branch, "two");
        assert_eq!(checkpoints.in_progress(), Some(OpKind::Restack));

        // Resolve in favor of two and continue.
        fixture.resolve_all("resolved\n");
        let outcome = eng.continue_().unwrap();
        let RestackOutcome::Complete(report) = outcome else {
            panic!("second conflict not expected");
        };

        // two and three both moved.
        assert!(report.moved() >= 2);
        let one = fixture.repo.branch_oid("one").unwrap();
        let two = fixture.repo.branch_oid("two").unwrap();
        let three = fixture.repo.branch_oid("three").unwrap();
        assert!(fixture.repo.is_ancestor(one, two).unwrap());
        assert!(fixture.repo.is_ancestor(two, three).unwrap());
        assert!(checkpoints.in_progress().is_none());
    }

    /// A merged parent re-parents the child onto the trunk.
    #[test]
    fn merged_parent_reparents_child() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        let one_tip = fixture.commit("one.txt", "1\n", "one: first");
        fixture.branch("two");
        fixture.commit("two.txt", "2\n", "two: own");

        // Simulate a squash-merge of one onto main.
        fixture.checkout("main");
        let squash = fixture.commit("one.txt", "1\n", "one (squashed) (#11)");

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), one_tip.to_string()),
        );
        {
            let mut tx = db.write_tx();
            let (mut one, _) = tx.branch("one");
            one.merge_commit = Some(squash.to_string());
            tx.set_branch(one);
            tx.commit().unwrap();
        }

        let eng = engine(&fixture, &db, &checkpoints);
        let outcome = eng.start(&["two".into()], OpKind::Restack).unwrap();
        let RestackOutcome::Complete(report) = outcome else {
            panic!("unexpected conflict");
        };
        assert!(matches!(
            report.steps.as_slice(),
            [BranchStep::Reparented { trunk, .. }] if trunk == "main"
        ));

        let (two, _) = db.read_tx().branch("two");
        assert!(two.parent.trunk);
        assert_eq!(two.parent.name, "main");
        assert!(two.parent.head.is_none());

        // The squash commit is in two's history; one's original commit is
        // carried exactly once.
        let two_tip = fixture.repo.branch_oid("two").unwrap();
        assert!(fixture.repo.is_ancestor(squash, two_tip).unwrap());
        let own = fixture.repo.rev_list(two_tip, Some(squash), false).unwrap();
        assert_eq!(own.len(), 1);
    }

    /// Without --rebase-to-trunk a root on an advanced trunk stays put.
    #[test]
    fn root_stays_without_rebase_to_trunk() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        fixture.commit("one.txt", "1\n", "one: first");
        fixture.checkout("main");
        fixture.commit("main.txt", "m\n", "trunk moves");

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));

        let one_before = fixture.repo.branch_oid("one").unwrap();
        let eng = engine(&fixture, &db, &checkpoints);
        let outcome = eng.start(&["one".into()], OpKind::Restack).unwrap();
        let RestackOutcome::Complete(report) = outcome else {
            panic!("unexpected conflict");
        };
        assert!(matches!(
            report.steps.as_slice(),
            [BranchStep::LeftAtTrunk { .. }]
        ));
        assert_eq!(fixture.repo.branch_oid("one").unwrap(), one_before);

        // With the flag the root moves.
        let eng = RestackEngine::new(
            &fixture.repo,
            &db,
            &checkpoints,
            RestackOpts {
                rebase_to_trunk: true,
                ..RestackOpts::default()
            },
        );
        let outcome = eng.start(&["one".into()], OpKind::Restack).unwrap();
        let RestackOutcome::Complete(report) = outcome else {
            panic!("unexpected conflict");
        };
        assert_eq!(report.moved(), 1);
        let main = fixture.repo.branch_oid("main").unwrap();
        let one = fixture.repo.branch_oid("one").unwrap();
        assert!(fixture.repo.is_ancestor(main, one).unwrap());
    }

    /// Abort drops the checkpoint and restores HEAD.
    #[test]
    fn abort_restores_head() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        fixture.branch("one");
        let one_tip = fixture.commit("shared.txt", "one\n", "one: shared");
        fixture.branch("two");
        fixture.commit("shared.txt", "two\n", "two: shared");
        fixture.checkout("one");
        fixture.commit("shared.txt", "one again\n", "one: conflicting");

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), one_tip.to_string()),
        );

        fixture.checkout("main");
        let eng = engine(&fixture, &db, &checkpoints);
        let outcome = eng
            .start(&["one".into(), "two".into()], OpKind::Restack)
            .unwrap();
        assert!(matches!(outcome, RestackOutcome::Conflicted { .. }));

        eng.abort().unwrap();
        assert!(checkpoints.in_progress().is_none());
        assert!(!fixture.repo.is_rebasing());
        assert_eq!(fixture.repo.current_branch().unwrap(), "main");
    }

    #[test]
    fn start_refused_while_checkpoint_exists() {
        let fixture = GitFixture::new();
        let (db, checkpoints) = setup(&fixture);

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        checkpoints
            .create(&Checkpoint::new(OpKind::Reorder, "main".into(), vec![]))
            .unwrap();

        let eng = engine(&fixture, &db, &checkpoints);
        assert!(matches!(
            eng.start(&["one".into()], OpKind::Restack),
            Err(Error::OperationInProgress(OpKind::Reorder))
        ));
    }

    #[test]
    fn dependency_order_is_roots_first() {
        let fixture = GitFixture::new();
        let (db, _) = setup(&fixture);

        manage(&db, "one", Parent::trunk(BranchName::new("main").unwrap()));
        manage(
            &db,
            "two",
            Parent::branch(BranchName::new("one").unwrap(), "a".repeat(40)),
        );
        manage(
            &db,
            "three",
            Parent::branch(BranchName::new("two").unwrap(), "b".repeat(40)),
        );

        let snapshot = db.read_tx();
        let order = dependency_order(
            &snapshot,
            &["three".to_string(), "one".to_string(), "two".to_string()],
        );
        assert_eq!(order, ["one", "two", "three"]);
    }
}
