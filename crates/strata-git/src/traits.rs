//! Trait abstractions for git operations.
//!
//! This module defines the `GitOps` trait which abstracts git operations,
//! enabling dependency injection and testability.

use std::collections::HashMap;
use std::path::Path;

use git2::Oid;

use crate::repository::{CherryPickOutcome, ForcePushSpec, Head, RebaseOutcome, RefInfo};
use crate::Result;

/// Trait for git repository operations.
///
/// This trait abstracts git operations, allowing for:
/// - Dependency injection in the engines
/// - Mock implementations for testing
///
/// All operations are synchronous; the adapter never runs concurrent git
/// processes.
#[allow(clippy::missing_errors_doc)]
pub trait GitOps {
    // === Repository info ===

    /// Get the working directory path.
    fn workdir(&self) -> Option<&Path>;

    /// Get the .git directory path.
    fn git_dir(&self) -> &Path;

    // === Revision resolution ===

    /// Resolve a revision expression to a commit id.
    fn rev_parse(&self, rev: &str) -> Result<Oid>;

    /// Nearest common ancestor of two commits.
    fn merge_base(&self, a: Oid, b: Oid) -> Result<Oid>;

    /// Whether `ancestor` is an ancestor of (or equal to) `descendant`.
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Commits reachable from `include` but not `exclude`.
    fn rev_list(&self, include: Oid, exclude: Option<Oid>, reverse: bool) -> Result<Vec<Oid>>;

    /// Number of parents of a commit.
    fn parent_count(&self, commit: Oid) -> Result<usize>;

    /// First parent of a commit.
    fn first_parent(&self, commit: Oid) -> Result<Option<Oid>>;

    /// First line of a commit message.
    fn commit_summary(&self, commit: Oid) -> Result<String>;

    // === HEAD and checkout ===

    /// Where HEAD points.
    fn head(&self) -> Result<Head>;

    /// Current branch name; error when detached.
    fn current_branch(&self) -> Result<String>;

    /// Check out a branch (optionally creating it), returning the previous HEAD.
    fn checkout_branch(&self, name: &str, create: bool) -> Result<Head>;

    /// Detach HEAD at its current commit.
    fn detach_head(&self) -> Result<()>;

    /// Detach HEAD at a specific commit.
    fn detach_head_at(&self, oid: Oid) -> Result<()>;

    // === Branches ===

    /// Check if a local branch exists.
    fn branch_exists(&self, name: &str) -> bool;

    /// Tip commit of a local branch.
    fn branch_oid(&self, name: &str) -> Result<Oid>;

    /// Delete a local branch.
    fn branch_delete(&self, name: &str, force: bool) -> Result<()>;

    /// Set `branch.<name>.<key>` in git config.
    fn branch_set_config(&self, branch: &str, key: &str, value: &str) -> Result<()>;

    /// Read `branch.<name>.<key>` from git config.
    fn branch_get_config(&self, branch: &str, key: &str) -> Option<String>;

    // === Refs ===

    /// List refs matching glob patterns.
    fn list_refs(&self, patterns: &[&str]) -> Result<Vec<RefInfo>>;

    /// Tip of `refs/remotes/<remote>/<branch>`.
    fn remote_tracking_oid(&self, remote: &str, branch: &str) -> Result<Oid>;

    /// Update a ref, optionally conditioned on its old value.
    fn update_ref(&self, name: &str, new_oid: Oid, expected_old: Option<Oid>) -> Result<()>;

    /// Default trunk derived from the remote's symbolic HEAD.
    fn default_trunk(&self, remote: &str) -> Option<String>;

    // === In-progress markers ===

    /// Whether a rebase is in progress.
    fn is_rebasing(&self) -> bool;

    /// Whether a cherry-pick is in progress.
    fn is_cherry_picking(&self) -> bool;

    /// Files with unresolved conflicts.
    fn conflicting_files(&self) -> Result<Vec<String>>;

    // === Working directory ===

    /// Whether the working directory is clean.
    fn is_clean(&self) -> Result<bool>;

    /// Require a clean working directory.
    fn require_clean(&self) -> Result<()>;

    // === Rebase / cherry-pick ===

    /// `git rebase --onto <onto> <upstream> <branch>`.
    fn rebase_onto(&self, upstream: Oid, onto: Oid, branch: &str) -> Result<RebaseOutcome>;

    /// Continue an in-progress rebase.
    fn rebase_continue(&self) -> Result<RebaseOutcome>;

    /// Skip the current commit of an in-progress rebase.
    fn rebase_skip(&self) -> Result<RebaseOutcome>;

    /// Abort an in-progress rebase.
    fn rebase_abort(&self) -> Result<RebaseOutcome>;

    /// Apply a commit onto HEAD.
    fn cherry_pick(&self, commit: Oid, ff: bool) -> Result<CherryPickOutcome>;

    /// Continue an in-progress cherry-pick.
    fn cherry_pick_continue(&self) -> Result<CherryPickOutcome>;

    /// Abort an in-progress cherry-pick.
    fn cherry_pick_abort(&self) -> Result<()>;

    // === Remote ===

    /// Fetch refs from the remote.
    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()>;

    /// List the remote's refs without fetching.
    fn ls_remote(&self, remote: &str) -> Result<HashMap<String, Oid>>;

    /// Atomic force-with-lease push of several branches.
    fn push_atomic_force_with_lease(&self, remote: &str, specs: &[ForcePushSpec]) -> Result<()>;
}

impl GitOps for crate::Repository {
    fn workdir(&self) -> Option<&Path> {
        Self::workdir(self)
    }

    fn git_dir(&self) -> &Path {
        Self::git_dir(self)
    }

    fn rev_parse(&self, rev: &str) -> Result<Oid> {
        Self::rev_parse(self, rev)
    }

    fn merge_base(&self, a: Oid, b: Oid) -> Result<Oid> {
        Self::merge_base(self, a, b)
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Self::is_ancestor(self, ancestor, descendant)
    }

    fn rev_list(&self, include: Oid, exclude: Option<Oid>, reverse: bool) -> Result<Vec<Oid>> {
        Self::rev_list(self, include, exclude, reverse)
    }

    fn parent_count(&self, commit: Oid) -> Result<usize> {
        Self::parent_count(self, commit)
    }

    fn first_parent(&self, commit: Oid) -> Result<Option<Oid>> {
        Self::first_parent(self, commit)
    }

    fn commit_summary(&self, commit: Oid) -> Result<String> {
        Self::commit_summary(self, commit)
    }

    fn head(&self) -> Result<Head> {
        Self::head(self)
    }

    fn current_branch(&self) -> Result<String> {
        Self::current_branch(self)
    }

    fn checkout_branch(&self, name: &str, create: bool) -> Result<Head> {
        Self::checkout_branch(self, name, create)
    }

    fn detach_head(&self) -> Result<()> {
        Self::detach_head(self)
    }

    fn detach_head_at(&self, oid: Oid) -> Result<()> {
        Self::detach_head_at(self, oid)
    }

    fn branch_exists(&self, name: &str) -> bool {
        Self::branch_exists(self, name)
    }

    fn branch_oid(&self, name: &str) -> Result<Oid> {
        Self::branch_oid(self, name)
    }

    fn branch_delete(&self, name: &str, force: bool) -> Result<()> {
        Self::branch_delete(self, name, force)
    }

    fn branch_set_config(&self, branch: &str, key: &str, value: &str) -> Result<()> {
        Self::branch_set_config(self, branch, key, value)
    }

    fn branch_get_config(&self, branch: &str, key: &str) -> Option<String> {
        Self::branch_get_config(self, branch, key)
    }

    fn list_refs(&self, patterns: &[&str]) -> Result<Vec<RefInfo>> {
        Self::list_refs(self, patterns)
    }

    fn remote_tracking_oid(&self, remote: &str, branch: &str) -> Result<Oid> {
        Self::remote_tracking_oid(self, remote, branch)
    }

    fn update_ref(&self, name: &str, new_oid: Oid, expected_old: Option<Oid>) -> Result<()> {
        Self::update_ref(self, name, new_oid, expected_old)
    }

    fn default_trunk(&self, remote: &str) -> Option<String> {
        Self::default_trunk(self, remote)
    }

    fn is_rebasing(&self) -> bool {
        Self::is_rebasing(self)
    }

    fn is_cherry_picking(&self) -> bool {
        Self::is_cherry_picking(self)
    }

    fn conflicting_files(&self) -> Result<Vec<String>> {
        Self::conflicting_files(self)
    }

    fn is_clean(&self) -> Result<bool> {
        Self::is_clean(self)
    }

    fn require_clean(&self) -> Result<()> {
        Self::require_clean(self)
    }

    fn rebase_onto(&self, upstream: Oid, onto: Oid, branch: &str) -> Result<RebaseOutcome> {
        Self::rebase_onto(self, upstream, onto, branch)
    }

    fn rebase_continue(&self) -> Result<RebaseOutcome> {
        Self::rebase_continue(self)
    }

    fn rebase_skip(&self) -> Result<RebaseOutcome> {
        Self::rebase_skip(self)
    }

    fn rebase_abort(&self) -> Result<RebaseOutcome> {
        Self::rebase_abort(self)
    }

    fn cherry_pick(&self, commit: Oid, ff: bool) -> Result<CherryPickOutcome> {
        Self::cherry_pick(self, commit, ff)
    }

    fn cherry_pick_continue(&self) -> Result<CherryPickOutcome> {
        Self::cherry_pick_continue(self)
    }

    fn cherry_pick_abort(&self) -> Result<()> {
        Self::cherry_pick_abort(self)
    }

    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()> {
        Self::fetch(self, remote, refspecs)
    }

    fn ls_remote(&self, remote: &str) -> Result<HashMap<String, Oid>> {
        Self::ls_remote(self, remote)
    }

    fn push_atomic_force_with_lease(&self, remote: &str, specs: &[ForcePushSpec]) -> Result<()> {
        Self::push_atomic_force_with_lease(self, remote, specs)
    }
}
