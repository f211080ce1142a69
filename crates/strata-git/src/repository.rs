//! Repository wrapper providing the narrow git contract the engines depend on.
//!
//! Object reads (rev-parse, merge-base, revwalk, refs, status) go through
//! git2. History-mutating operations (rebase, cherry-pick, fetch, push) spawn
//! the external `git` binary so that Git itself owns conflict state, exactly
//! as a user-driven invocation would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use git2::{BranchType, Oid, Sort};

use crate::error::{Error, Result};

/// Where HEAD currently points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// HEAD is on a branch.
    Branch(String),
    /// HEAD is detached at a commit.
    Detached(Oid),
}

impl Head {
    /// The branch name, if HEAD is on one.
    #[must_use]
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            Self::Branch(name) => Some(name),
            Self::Detached(_) => None,
        }
    }
}

/// Outcome of a rebase invocation.
///
/// Conflicts are values rather than errors: the engines persist a checkpoint
/// and hand control back to the user instead of unwinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// The rebase applied cleanly.
    Success,
    /// Git stopped on a conflict; the rebase is left in progress.
    Conflict {
        /// Captured stderr describing the conflicting commit.
        stderr: String,
    },
    /// The branch was already based on the target; nothing moved.
    AlreadyUpToDate,
    /// `--continue`/`--abort`/`--skip` was invoked with no rebase pending.
    NotInProgress,
}

/// Outcome of a cherry-pick invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryPickOutcome {
    /// The commit was applied as a new commit.
    Success,
    /// HEAD was fast-forwarded to the picked commit.
    FastForward,
    /// Git stopped on a conflict; the cherry-pick is left in progress.
    Conflict {
        /// The commit that failed to apply.
        commit: Oid,
        /// Captured stderr.
        stderr: String,
    },
}

/// Kind of a ref returned by [`Repository::list_refs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// `refs/heads/*`
    LocalBranch,
    /// `refs/remotes/*`
    RemoteBranch,
    /// Anything else (tags, notes, ...).
    Other,
}

/// A ref with its target and upstream linkage.
#[derive(Debug, Clone)]
pub struct RefInfo {
    /// Short name (e.g. `feature/auth` or `origin/main`).
    pub name: String,
    /// Ref kind.
    pub kind: RefKind,
    /// Target commit.
    pub oid: Oid,
    /// Configured upstream short name, if any.
    pub upstream: Option<String>,
    /// Upstream tip, when the tracking ref exists locally.
    pub upstream_oid: Option<Oid>,
}

/// One refspec in an atomic force-with-lease push.
#[derive(Debug, Clone)]
pub struct ForcePushSpec {
    /// Local commit to push.
    pub local_oid: Oid,
    /// Destination branch name on the remote (without `refs/heads/`).
    pub remote_branch: String,
    /// Expected current value of the remote ref; `None` means the ref is
    /// expected to not exist yet.
    pub expected_remote_oid: Option<Oid>,
}

/// High-level wrapper around a git repository.
pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Open a repository at the given path.
    ///
    /// # Errors
    /// Returns error if no repository found at path or any parent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = git2::Repository::discover(path).map_err(|_| Error::NotARepository)?;
        Ok(Self { inner })
    }

    /// Open the repository containing the current directory.
    ///
    /// # Errors
    /// Returns error if not inside a git repository.
    pub fn open_current() -> Result<Self> {
        Self::open(".")
    }

    /// Get the path to the repository root (workdir).
    #[must_use]
    pub fn workdir(&self) -> Option<&Path> {
        self.inner.workdir()
    }

    /// Get the path to the .git directory.
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    fn require_workdir(&self) -> Result<&Path> {
        self.workdir().ok_or(Error::BareRepository)
    }

    /// Run a git subcommand in the working directory, capturing output.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        let workdir = self.require_workdir()?;
        Ok(Command::new("git")
            .args(args)
            .current_dir(workdir)
            .output()?)
    }

    // === Revision resolution ===

    /// Resolve a revision expression to a commit id.
    ///
    /// # Errors
    /// Returns [`Error::RevParseFailed`] if the revision doesn't resolve.
    pub fn rev_parse(&self, rev: &str) -> Result<Oid> {
        let object = self
            .inner
            .revparse_single(rev)
            .map_err(|_| Error::RevParseFailed(rev.to_string()))?;
        object
            .peel_to_commit()
            .map(|c| c.id())
            .map_err(|_| Error::RevParseFailed(rev.to_string()))
    }

    /// Get the nearest common ancestor of two commits.
    ///
    /// # Errors
    /// Returns error if the commits share no history.
    pub fn merge_base(&self, a: Oid, b: Oid) -> Result<Oid> {
        Ok(self.inner.merge_base(a, b)?)
    }

    /// Check whether `ancestor` is an ancestor of (or equal to) `descendant`.
    ///
    /// # Errors
    /// Returns error if either commit cannot be walked.
    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.inner.graph_descendant_of(descendant, ancestor)?)
    }

    /// List commits reachable from `include` but not from `exclude`.
    ///
    /// Topological order, newest first; `reverse` yields oldest first
    /// (the order a replay wants).
    ///
    /// # Errors
    /// Returns error if the revwalk fails.
    pub fn rev_list(&self, include: Oid, exclude: Option<Oid>, reverse: bool) -> Result<Vec<Oid>> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.push(include)?;
        if let Some(ex) = exclude {
            revwalk.hide(ex)?;
        }
        let sorting = if reverse {
            Sort::TOPOLOGICAL | Sort::REVERSE
        } else {
            Sort::TOPOLOGICAL
        };
        revwalk.set_sorting(sorting)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(oid?);
        }
        Ok(commits)
    }

    /// Number of parents of a commit.
    ///
    /// # Errors
    /// Returns error if the commit doesn't exist.
    pub fn parent_count(&self, commit: Oid) -> Result<usize> {
        Ok(self.inner.find_commit(commit)?.parent_count())
    }

    /// First parent of a commit, if it has one.
    ///
    /// # Errors
    /// Returns error if the commit doesn't exist.
    pub fn first_parent(&self, commit: Oid) -> Result<Option<Oid>> {
        let commit = self.inner.find_commit(commit)?;
        Ok(commit.parent_ids().next())
    }

    /// First line of a commit's message.
    ///
    /// # Errors
    /// Returns error if the commit doesn't exist.
    pub fn commit_summary(&self, commit: Oid) -> Result<String> {
        let commit = self.inner.find_commit(commit)?;
        Ok(commit.summary().unwrap_or("<no message>").to_string())
    }

    // === HEAD and checkout ===

    /// Where HEAD currently points.
    ///
    /// # Errors
    /// Returns error if HEAD cannot be read (e.g. unborn repo).
    pub fn head(&self) -> Result<Head> {
        let head = self.inner.head()?;
        if head.is_branch() {
            head.shorthand()
                .map(|name| Head::Branch(name.to_string()))
                .ok_or(Error::DetachedHead)
        } else {
            head.target()
                .map(Head::Detached)
                .ok_or(Error::DetachedHead)
        }
    }

    /// Get the name of the current branch.
    ///
    /// # Errors
    /// Returns error if HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        match self.head()? {
            Head::Branch(name) => Ok(name),
            Head::Detached(_) => Err(Error::DetachedHead),
        }
    }

    /// Check out a branch, optionally creating it at the current HEAD first.
    ///
    /// Returns where HEAD pointed before the checkout, so callers can
    /// restore it afterwards.
    ///
    /// # Errors
    /// Returns error if the branch doesn't exist (and `create` is false) or
    /// the checkout fails.
    pub fn checkout_branch(&self, name: &str, create: bool) -> Result<Head> {
        let previous = self.head()?;

        if create {
            let head_commit = self.inner.head()?.peel_to_commit()?;
            self.inner.branch(name, &head_commit, false)?;
        }

        let branch = self
            .inner
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(name.to_string()))?;
        let object = branch.get().peel(git2::ObjectType::Commit)?;

        self.inner.checkout_tree(&object, None)?;
        self.inner.set_head(&format!("refs/heads/{name}"))?;

        Ok(previous)
    }

    /// Detach HEAD at its current commit.
    ///
    /// Needed before deleting the branch HEAD is on.
    ///
    /// # Errors
    /// Returns error if HEAD cannot be resolved.
    pub fn detach_head(&self) -> Result<()> {
        let oid = self.inner.head()?.peel_to_commit()?.id();
        self.inner.set_head_detached(oid)?;
        Ok(())
    }

    /// Detach HEAD at a specific commit, updating the working tree.
    ///
    /// # Errors
    /// Returns error if the commit doesn't exist or the checkout fails.
    pub fn detach_head_at(&self, oid: Oid) -> Result<()> {
        let commit = self.inner.find_commit(oid)?;
        self.inner.checkout_tree(commit.as_object(), None)?;
        self.inner.set_head_detached(oid)?;
        Ok(())
    }

    // === Branch operations ===

    /// Check if a local branch exists.
    #[must_use]
    pub fn branch_exists(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    /// Get the tip commit of a local branch.
    ///
    /// # Errors
    /// Returns error if the branch doesn't exist.
    pub fn branch_oid(&self, name: &str) -> Result<Oid> {
        let branch = self
            .inner
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(name.to_string()))?;
        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(name.to_string()))
    }

    /// Delete a local branch.
    ///
    /// Without `force`, deletion is refused unless the branch is merged
    /// into HEAD (matching `git branch -d`).
    ///
    /// # Errors
    /// Returns error if the branch doesn't exist or is not merged.
    pub fn branch_delete(&self, name: &str, force: bool) -> Result<()> {
        let mut branch = self
            .inner
            .find_branch(name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(name.to_string()))?;

        if !force {
            let tip = branch
                .get()
                .target()
                .ok_or_else(|| Error::BranchNotFound(name.to_string()))?;
            let head = self.inner.head()?.peel_to_commit()?.id();
            if !self.is_ancestor(tip, head)? {
                return Err(Error::CommandFailed {
                    command: "branch -d".to_string(),
                    stderr: format!("branch '{name}' is not fully merged"),
                });
            }
        }

        branch.delete()?;
        Ok(())
    }

    /// Set a per-branch git config key (`branch.<name>.<key>`).
    ///
    /// # Errors
    /// Returns error if the config cannot be written.
    pub fn branch_set_config(&self, branch: &str, key: &str, value: &str) -> Result<()> {
        let mut config = self.inner.config()?;
        config.set_str(&format!("branch.{branch}.{key}"), value)?;
        Ok(())
    }

    /// Read a per-branch git config key, if set.
    #[must_use]
    pub fn branch_get_config(&self, branch: &str, key: &str) -> Option<String> {
        let config = self.inner.config().ok()?;
        config
            .get_string(&format!("branch.{branch}.{key}"))
            .ok()
    }

    // === Refs ===

    /// List refs matching the given glob patterns.
    ///
    /// # Errors
    /// Returns error if ref enumeration fails.
    pub fn list_refs(&self, patterns: &[&str]) -> Result<Vec<RefInfo>> {
        let mut refs = Vec::new();
        for pattern in patterns {
            for reference in self.inner.references_glob(pattern)? {
                let reference = reference?;
                let Some(full_name) = reference.name() else {
                    continue;
                };
                let Some(oid) = reference.target() else {
                    continue;
                };

                let (kind, short) = if let Some(rest) = full_name.strip_prefix("refs/heads/") {
                    (RefKind::LocalBranch, rest)
                } else if let Some(rest) = full_name.strip_prefix("refs/remotes/") {
                    (RefKind::RemoteBranch, rest)
                } else {
                    (RefKind::Other, full_name)
                };

                let (upstream, upstream_oid) = if kind == RefKind::LocalBranch {
                    self.upstream_of(short)
                } else {
                    (None, None)
                };

                refs.push(RefInfo {
                    name: short.to_string(),
                    kind,
                    oid,
                    upstream,
                    upstream_oid,
                });
            }
        }
        Ok(refs)
    }

    /// Configured upstream short name and its tip, if the tracking ref exists.
    fn upstream_of(&self, branch: &str) -> (Option<String>, Option<Oid>) {
        let refname = format!("refs/heads/{branch}");
        let Ok(buf) = self.inner.branch_upstream_name(&refname) else {
            return (None, None);
        };
        let Some(full) = buf.as_str() else {
            return (None, None);
        };
        let short = full
            .strip_prefix("refs/remotes/")
            .unwrap_or(full)
            .to_string();
        let oid = self
            .inner
            .find_reference(full)
            .ok()
            .and_then(|r| r.target());
        (Some(short), oid)
    }

    /// Tip of a remote-tracking ref (`refs/remotes/<remote>/<branch>`).
    ///
    /// # Errors
    /// Returns [`Error::RefNotFound`] if the tracking ref doesn't exist.
    pub fn remote_tracking_oid(&self, remote: &str, branch: &str) -> Result<Oid> {
        let refname = format!("refs/remotes/{remote}/{branch}");
        let reference = self
            .inner
            .find_reference(&refname)
            .map_err(|_| Error::RefNotFound(refname.clone()))?;
        reference.target().ok_or(Error::RefNotFound(refname))
    }

    /// Update a ref to a new target, optionally conditioned on its old value.
    ///
    /// # Errors
    /// Returns [`Error::StaleRef`] if `expected_old` doesn't match the
    /// ref's current value.
    pub fn update_ref(&self, name: &str, new_oid: Oid, expected_old: Option<Oid>) -> Result<()> {
        let log_message = format!("strata: update to {new_oid}");
        match expected_old {
            Some(old) => {
                self.inner
                    .reference_matching(name, new_oid, true, old, &log_message)
                    .map_err(|e| {
                        if e.code() == git2::ErrorCode::Modified {
                            Error::StaleRef {
                                refname: name.to_string(),
                                expected: old.to_string(),
                            }
                        } else {
                            Error::Git2(e)
                        }
                    })?;
            }
            None => {
                self.inner.reference(name, new_oid, true, &log_message)?;
            }
        }
        Ok(())
    }

    /// Detect the default trunk from the remote's symbolic HEAD.
    ///
    /// Resolves `refs/remotes/<remote>/HEAD`; returns `None` when the
    /// symbolic ref is not set (e.g. a fresh clone without one).
    #[must_use]
    pub fn default_trunk(&self, remote: &str) -> Option<String> {
        let refname = format!("refs/remotes/{remote}/HEAD");
        let reference = self.inner.find_reference(&refname).ok()?;
        let resolved = reference.resolve().ok()?;
        let name = resolved.name()?;
        name.strip_prefix(&format!("refs/remotes/{remote}/"))
            .map(String::from)
    }

    // === In-progress operation markers ===

    /// Path inside the git dir.
    fn git_dir_file(&self, name: &str) -> PathBuf {
        self.git_dir().join(name)
    }

    /// Check if a rebase is in progress.
    #[must_use]
    pub fn is_rebasing(&self) -> bool {
        self.git_dir_file("REBASE_HEAD").exists()
            || self.git_dir_file("rebase-merge").exists()
            || self.git_dir_file("rebase-apply").exists()
    }

    /// Check if a cherry-pick is in progress.
    #[must_use]
    pub fn is_cherry_picking(&self) -> bool {
        self.git_dir_file("CHERRY_PICK_HEAD").exists()
    }

    /// Get list of files with unresolved conflicts.
    ///
    /// # Errors
    /// Returns error if status check fails.
    pub fn conflicting_files(&self) -> Result<Vec<String>> {
        let statuses = self.inner.statuses(None)?;
        Ok(statuses
            .iter()
            .filter(|s| s.status().is_conflicted())
            .filter_map(|s| s.path().map(String::from))
            .collect())
    }

    // === Working directory state ===

    /// Check if the working directory is clean.
    ///
    /// Untracked files are ignored - only tracked files that have been
    /// modified or staged count as "dirty".
    ///
    /// # Errors
    /// Returns error if status check fails.
    pub fn is_clean(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .include_unmodified(false)
            .exclude_submodules(true);
        let statuses = self.inner.statuses(Some(&mut opts))?;

        for entry in statuses.iter() {
            let status = entry.status();
            if status.intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_TYPECHANGE
                    | git2::Status::WT_RENAMED,
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Ensure working directory is clean, returning error if not.
    ///
    /// # Errors
    /// Returns `DirtyWorkingDirectory` if there are uncommitted changes.
    pub fn require_clean(&self) -> Result<()> {
        if self.is_clean()? {
            Ok(())
        } else {
            Err(Error::DirtyWorkingDirectory)
        }
    }

    // === Rebase ===

    /// Whether stderr/stdout from a failed rebase or cherry-pick describes
    /// a content conflict rather than some other failure.
    fn output_mentions_conflict(output: &Output) -> bool {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        stderr.contains("could not apply")
            || stdout.contains("could not apply")
            || stderr.contains("CONFLICT")
            || stdout.contains("CONFLICT")
    }

    /// Rebase `branch`, replaying the commits after `upstream` onto `onto`.
    ///
    /// Equivalent to `git rebase --onto <onto> <upstream> <branch>`:
    /// `upstream` is the exclusive lower bound, so exactly the commits in
    /// `rev_list(branch, ^upstream)` are replayed. Plain `git rebase
    /// <parent> <branch>` is wrong once the parent itself has been rebased;
    /// the caller supplies the parent's previous tip as `upstream`.
    ///
    /// # Errors
    /// Returns error for non-conflict failures; conflicts are an outcome.
    pub fn rebase_onto(&self, upstream: Oid, onto: Oid, branch: &str) -> Result<RebaseOutcome> {
        let before = self.branch_oid(branch)?;

        let output = self.run_git(&[
            "rebase",
            "--onto",
            &onto.to_string(),
            &upstream.to_string(),
            branch,
        ])?;

        if output.status.success() {
            let after = self.branch_oid(branch)?;
            if after == before {
                return Ok(RebaseOutcome::AlreadyUpToDate);
            }
            return Ok(RebaseOutcome::Success);
        }

        if self.is_rebasing() || Self::output_mentions_conflict(&output) {
            return Ok(RebaseOutcome::Conflict {
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Err(Error::CommandFailed {
            command: "rebase".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Continue an in-progress rebase after conflict resolution.
    ///
    /// # Errors
    /// Returns error for non-conflict failures.
    pub fn rebase_continue(&self) -> Result<RebaseOutcome> {
        if !self.is_rebasing() {
            return Ok(RebaseOutcome::NotInProgress);
        }

        let output = Command::new("git")
            .args(["rebase", "--continue"])
            .current_dir(self.require_workdir()?)
            .env("GIT_EDITOR", "true")
            .output()?;

        self.classify_rebase_step(&output, "rebase --continue")
    }

    /// Skip the commit the rebase stopped on and continue.
    ///
    /// # Errors
    /// Returns error for non-conflict failures.
    pub fn rebase_skip(&self) -> Result<RebaseOutcome> {
        if !self.is_rebasing() {
            return Ok(RebaseOutcome::NotInProgress);
        }
        let output = self.run_git(&["rebase", "--skip"])?;
        self.classify_rebase_step(&output, "rebase --skip")
    }

    /// Abort an in-progress rebase.
    ///
    /// # Errors
    /// Returns error for non-conflict failures.
    pub fn rebase_abort(&self) -> Result<RebaseOutcome> {
        if !self.is_rebasing() {
            return Ok(RebaseOutcome::NotInProgress);
        }
        let output = self.run_git(&["rebase", "--abort"])?;
        if output.status.success() {
            Ok(RebaseOutcome::Success)
        } else {
            Err(Error::CommandFailed {
                command: "rebase --abort".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    fn classify_rebase_step(&self, output: &Output, command: &str) -> Result<RebaseOutcome> {
        if output.status.success() {
            return Ok(RebaseOutcome::Success);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no rebase in progress") {
            return Ok(RebaseOutcome::NotInProgress);
        }
        if self.is_rebasing() || Self::output_mentions_conflict(output) {
            return Ok(RebaseOutcome::Conflict {
                stderr: stderr.to_string(),
            });
        }

        Err(Error::CommandFailed {
            command: command.to_string(),
            stderr: stderr.to_string(),
        })
    }

    // === Cherry-pick ===

    /// Apply a commit onto HEAD.
    ///
    /// With `ff`, Git fast-forwards instead of re-committing when HEAD is
    /// the picked commit's parent.
    ///
    /// # Errors
    /// Returns error for non-conflict failures; conflicts are an outcome.
    pub fn cherry_pick(&self, commit: Oid, ff: bool) -> Result<CherryPickOutcome> {
        let commit_str = commit.to_string();
        let mut args = vec!["cherry-pick"];
        if ff {
            args.push("--ff");
        }
        args.push(&commit_str);

        let output = self.run_git(&args)?;

        if output.status.success() {
            let head = self.inner.head()?.peel_to_commit()?.id();
            if head == commit {
                return Ok(CherryPickOutcome::FastForward);
            }
            return Ok(CherryPickOutcome::Success);
        }

        if self.is_cherry_picking() || Self::output_mentions_conflict(&output) {
            return Ok(CherryPickOutcome::Conflict {
                commit,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Err(Error::CommandFailed {
            command: "cherry-pick".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Continue an in-progress cherry-pick after conflict resolution.
    ///
    /// The resolved changes must already be staged.
    ///
    /// # Errors
    /// Returns error for non-conflict failures.
    pub fn cherry_pick_continue(&self) -> Result<CherryPickOutcome> {
        let output = Command::new("git")
            .args(["cherry-pick", "--continue"])
            .current_dir(self.require_workdir()?)
            .env("GIT_EDITOR", "true")
            .output()?;

        if output.status.success() {
            return Ok(CherryPickOutcome::Success);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if self.is_cherry_picking() {
            let head = self.inner.head()?.peel_to_commit()?.id();
            return Ok(CherryPickOutcome::Conflict {
                commit: head,
                stderr,
            });
        }

        Err(Error::CommandFailed {
            command: "cherry-pick --continue".to_string(),
            stderr,
        })
    }

    /// Abort an in-progress cherry-pick.
    ///
    /// # Errors
    /// Returns error if the abort fails.
    pub fn cherry_pick_abort(&self) -> Result<()> {
        if !self.is_cherry_picking() {
            return Ok(());
        }
        let output = self.run_git(&["cherry-pick", "--abort"])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: "cherry-pick --abort".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    // === Remote operations ===

    /// Fetch refs from the remote.
    ///
    /// With no refspecs, fetches everything the remote advertises for its
    /// configured refspec (updating `refs/remotes/<remote>/*`).
    ///
    /// # Errors
    /// Returns [`Error::FetchFailed`] on any fetch failure.
    pub fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()> {
        let mut args = vec!["fetch", "--prune", remote];
        args.extend_from_slice(refspecs);

        let output = self.run_git(&args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::FetchFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    /// List the remote's refs without fetching objects.
    ///
    /// Returns a map of full refname (`refs/heads/...`) to commit id.
    ///
    /// # Errors
    /// Returns error if the remote cannot be contacted.
    pub fn ls_remote(&self, remote: &str) -> Result<HashMap<String, Oid>> {
        let output = self.run_git(&["ls-remote", "--quiet", remote])?;
        if !output.status.success() {
            return Err(Error::RemoteNotFound(remote.to_string()));
        }

        let mut refs = HashMap::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let mut parts = line.split_whitespace();
            let (Some(oid), Some(name)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Ok(oid) = Oid::from_str(oid) {
                refs.insert(name.to_string(), oid);
            }
        }
        Ok(refs)
    }

    /// Push several branches in one atomic force-with-lease operation.
    ///
    /// Either every ref on the remote advances or none does; a lease
    /// failure on any branch rejects the whole push.
    ///
    /// # Errors
    /// Returns [`Error::PushRejected`] when the remote refuses the update.
    pub fn push_atomic_force_with_lease(
        &self,
        remote: &str,
        specs: &[ForcePushSpec],
    ) -> Result<()> {
        if specs.is_empty() {
            return Ok(());
        }

        let mut args: Vec<String> = vec!["push".into(), "--atomic".into(), remote.into()];
        for spec in specs {
            // An empty expectation means "the ref must not exist yet".
            let expected = spec
                .expected_remote_oid
                .map(|oid| oid.to_string())
                .unwrap_or_default();
            args.push(format!(
                "--force-with-lease=refs/heads/{}:{expected}",
                spec.remote_branch
            ));
        }
        for spec in specs {
            args.push(format!(
                "{}:refs/heads/{}",
                spec.local_oid, spec.remote_branch
            ));
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_git(&arg_refs)?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::PushRejected(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }

    // === Low-level access ===

    /// Get a reference to the underlying git2 repository.
    ///
    /// Use sparingly - prefer high-level methods.
    #[must_use]
    pub const fn inner(&self) -> &git2::Repository {
        &self.inner
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.git_dir())
            .finish()
    }
}
