//! The prune controller.
//!
//! After a sync lands branches on the trunk, their local refs become dead
//! weight. A branch is deletable only when its merge was observed, nothing
//! unmerged still stacks on it, and the remote's PR head matches the local
//! tip (a mismatch means local work the merge never saw). Deletion detaches
//! HEAD first and walks child-to-parent.

use std::collections::HashMap;
use std::fmt;

use strata_git::{GitOps, Head, Oid};

use crate::error::Result;
use crate::meta::{MetaDb, Snapshot};

/// Why a merged branch is not being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneSkipReason {
    /// An unmerged branch still stacks on it.
    HasChild,
    /// No PR recorded; nothing confirms the merge remotely.
    NoPullRequest,
    /// The remote no longer advertises the PR head ref.
    PrHeadNotFound,
    /// The remote PR head differs from the local tip.
    PrHeadIsDifferent,
}

impl fmt::Display for PruneSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HasChild => "an unmerged branch still depends on it",
            Self::NoPullRequest => "no pull request recorded",
            Self::PrHeadNotFound => "PR head not found on remote",
            Self::PrHeadIsDifferent => "remote PR head differs from local tip",
        };
        write!(f, "{s}")
    }
}

/// The classified deletion set.
#[derive(Debug, Default)]
pub struct PrunePlan {
    /// Branches to delete, children before parents.
    pub delete: Vec<String>,
    /// Merged branches kept, with reasons.
    pub skipped: Vec<(String, PruneSkipReason)>,
}

/// Result of executing a prune plan.
#[derive(Debug, Default)]
pub struct PruneReport {
    /// Branches whose ref and record were deleted.
    pub deleted: Vec<String>,
    /// Where HEAD ended up, when it had to move.
    pub restored_to: Option<String>,
}

/// Classify merged branches into a prune plan.
///
/// `remote_refs` is the `ls-remote` result; PR head refs are compared under
/// `refs/heads/<branch>` after stripping any prefix the provider already
/// included.
///
/// # Errors
/// Returns git errors reading local tips.
pub fn plan<G: GitOps>(
    git: &G,
    snapshot: &Snapshot,
    remote_refs: &HashMap<String, Oid>,
) -> Result<PrunePlan> {
    let mut plan = PrunePlan::default();

    let mut candidates: Vec<(&str, usize)> = Vec::new();
    for branch in snapshot.all_branches() {
        if branch.merge_commit.is_none() {
            continue;
        }
        let name = branch.name.as_str();

        if snapshot
            .descendants(name)
            .iter()
            .any(|child| !child.is_merged())
        {
            plan.skipped
                .push((name.to_string(), PruneSkipReason::HasChild));
            continue;
        }

        if branch.pull_request.is_none() {
            plan.skipped
                .push((name.to_string(), PruneSkipReason::NoPullRequest));
            continue;
        }

        let refname = normalize_head_ref(name);
        let Some(remote_tip) = remote_refs.get(&refname) else {
            plan.skipped
                .push((name.to_string(), PruneSkipReason::PrHeadNotFound));
            continue;
        };
        if !git.branch_exists(name) {
            // Ref already gone locally; only the record is left to drop.
            candidates.push((name, snapshot.ancestors(name).len()));
            continue;
        }
        if git.branch_oid(name)? != *remote_tip {
            plan.skipped
                .push((name.to_string(), PruneSkipReason::PrHeadIsDifferent));
            continue;
        }

        candidates.push((name, snapshot.ancestors(name).len()));
    }

    // Children before parents: deeper branches first.
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    plan.delete = candidates
        .into_iter()
        .map(|(name, _)| name.to_string())
        .collect();
    Ok(plan)
}

fn normalize_head_ref(branch: &str) -> String {
    let bare = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    format!("refs/heads/{bare}")
}

/// Delete the planned branches: record and ref together, child-to-parent,
/// HEAD parked out of the way first and restored afterwards.
///
/// HEAD restore order: the original branch if it survived, else the local
/// trunk, else detached at the remote trunk tip.
///
/// # Errors
/// Returns git or database errors.
pub fn execute<G: GitOps>(
    git: &G,
    db: &MetaDb,
    plan: &PrunePlan,
    trunk: &str,
    remote: &str,
) -> Result<PruneReport> {
    let mut report = PruneReport::default();
    if plan.delete.is_empty() {
        return Ok(report);
    }

    let original = match git.head()? {
        Head::Branch(name) => Some(name),
        Head::Detached(_) => None,
    };

    // Cannot delete the checked-out branch.
    if let Some(current) = &original {
        if plan.delete.contains(current) {
            git.detach_head()?;
        }
    }

    for branch in &plan.delete {
        let mut tx = db.write_tx();
        tx.delete_branch(branch);
        tx.commit()?;

        if git.branch_exists(branch) {
            git.branch_delete(branch, true)?;
        }
        report.deleted.push(branch.clone());
    }

    // Restore HEAD if we parked it.
    let needs_restore = match git.head()? {
        Head::Detached(_) => true,
        Head::Branch(_) => false,
    };
    if needs_restore {
        if let Some(original) = original.filter(|o| git.branch_exists(o)) {
            git.checkout_branch(&original, false)?;
            report.restored_to = Some(original);
        } else if git.branch_exists(trunk) {
            git.checkout_branch(trunk, false)?;
            report.restored_to = Some(trunk.to_string());
        } else if let Ok(oid) = git.remote_tracking_oid(remote, trunk) {
            git.detach_head_at(oid)?;
            report.restored_to = Some(format!("{remote}/{trunk}"));
        }
    }

    Ok(report)
}
