//! The push controller.
//!
//! Classifies each branch into "push" or "skip with reason", then advances
//! every pushable branch in a single atomic force-with-lease push: either
//! the whole stack moves on the remote or none of it does. A successful
//! push is recorded in per-branch git config as audit state.

use std::collections::HashMap;
use std::fmt;

use strata_git::{ForcePushSpec, GitOps, Oid};

use crate::error::{Error, Result};
use crate::meta::{PrState, Snapshot};

/// Git config keys recording the last push, for later audit.
const PUSHED_REMOTE_KEY: &str = "strata-pushed-remote";
const PUSHED_REF_KEY: &str = "strata-pushed-ref";
const PUSHED_COMMIT_KEY: &str = "strata-pushed-commit";

/// Why a branch is not being pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSkipReason {
    /// The PR is merged; pushing would resurrect it.
    Merged,
    /// The PR is closed.
    Closed,
    /// Local tip equals the remote and the PR body is current.
    UpToDate,
    /// The branch has never been pushed; submitting is a separate step.
    NotPushed,
    /// A non-trunk ancestor has no remote branch yet.
    ParentNotPushed,
    /// An ancestor has no PR, so stack metadata cannot be encoded.
    NoPr,
}

impl fmt::Display for PushSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Merged => "PR is merged",
            Self::Closed => "PR is closed",
            Self::UpToDate => "already up to date",
            Self::NotPushed => "not pushed to remote yet",
            Self::ParentNotPushed => "parent not pushed to remote yet",
            Self::NoPr => "an ancestor has no PR",
        };
        write!(f, "{s}")
    }
}

/// Provider-side facts the classifier needs per branch.
#[derive(Debug, Clone)]
pub struct PrFacts {
    /// Current PR state.
    pub state: PrState,
    /// Whether the PR body's stack block already matches what we'd write.
    pub body_current: bool,
}

/// One branch to push.
#[derive(Debug, Clone)]
pub struct PushItem {
    /// Branch name.
    pub branch: String,
    /// Local tip to push.
    pub local: Oid,
    /// Remote tip the lease is conditioned on.
    pub expected_remote: Oid,
}

/// The classified push set.
#[derive(Debug, Default)]
pub struct PushPlan {
    /// Branches to push, with their lease expectations.
    pub items: Vec<PushItem>,
    /// Branches skipped, with reasons.
    pub skipped: Vec<(String, PushSkipReason)>,
}

impl PushPlan {
    /// Whether there is anything to push.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Classify `targets` into a push plan.
///
/// `prs` carries provider-side facts per branch; a branch absent from the
/// map is treated as having no PR of its own (which only matters for its
/// descendants' `NoPr` checks and for body freshness).
///
/// # Errors
/// Returns [`Error::NotManaged`] for unknown targets, or git errors.
pub fn plan<G: GitOps>(
    git: &G,
    snapshot: &Snapshot,
    remote: &str,
    targets: &[String],
    prs: &HashMap<String, PrFacts>,
) -> Result<PushPlan> {
    let mut plan = PushPlan::default();

    for branch in targets {
        let (record, exists) = snapshot.branch(branch);
        if !exists {
            return Err(Error::NotManaged(branch.clone()));
        }

        let state = prs
            .get(branch)
            .map(|f| f.state)
            .or_else(|| record.pull_request.as_ref().map(|pr| pr.state));
        match state {
            Some(PrState::Merged) => {
                plan.skipped.push((branch.clone(), PushSkipReason::Merged));
                continue;
            }
            Some(PrState::Closed) => {
                plan.skipped.push((branch.clone(), PushSkipReason::Closed));
                continue;
            }
            _ => {}
        }

        let Ok(remote_tip) = git.remote_tracking_oid(remote, branch) else {
            plan.skipped
                .push((branch.clone(), PushSkipReason::NotPushed));
            continue;
        };

        // Every non-trunk ancestor must already exist on the remote and
        // carry a PR, or the stack block in this branch's PR body would
        // name branches the reviewer cannot see.
        let ancestors = snapshot.ancestors(branch);
        if ancestors
            .iter()
            .any(|a| git.remote_tracking_oid(remote, a.name.as_str()).is_err())
        {
            plan.skipped
                .push((branch.clone(), PushSkipReason::ParentNotPushed));
            continue;
        }
        if ancestors.iter().any(|a| {
            a.pull_request.is_none() && !prs.contains_key(a.name.as_str())
        }) {
            plan.skipped.push((branch.clone(), PushSkipReason::NoPr));
            continue;
        }

        let local = git.branch_oid(branch)?;
        let body_current = prs.get(branch).is_none_or(|f| f.body_current);
        if local == remote_tip && body_current {
            plan.skipped
                .push((branch.clone(), PushSkipReason::UpToDate));
            continue;
        }

        plan.items.push(PushItem {
            branch: branch.clone(),
            local,
            expected_remote: remote_tip,
        });
    }

    Ok(plan)
}

/// Push the plan atomically and record the audit config keys.
///
/// Branches whose local tip already equals the remote (they are in the
/// plan only because their PR body is stale) are excluded from the
/// refspecs but still count as pushed for audit purposes.
///
/// # Errors
/// Returns [`strata_git::Error::PushRejected`] (wrapped) when the remote
/// refuses the lease; nothing is retried - the user must re-sync.
pub fn execute<G: GitOps>(git: &G, remote: &str, plan: &PushPlan) -> Result<()> {
    let specs: Vec<ForcePushSpec> = plan
        .items
        .iter()
        .filter(|item| item.local != item.expected_remote)
        .map(|item| ForcePushSpec {
            local_oid: item.local,
            remote_branch: item.branch.clone(),
            expected_remote_oid: Some(item.expected_remote),
        })
        .collect();

    if !specs.is_empty() {
        git.push_atomic_force_with_lease(remote, &specs)?;
    }

    for item in &plan.items {
        git.branch_set_config(&item.branch, PUSHED_REMOTE_KEY, remote)?;
        git.branch_set_config(
            &item.branch,
            PUSHED_REF_KEY,
            &format!("refs/heads/{}", item.branch),
        )?;
        git.branch_set_config(&item.branch, PUSHED_COMMIT_KEY, &item.local.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::meta::{Branch, MetaDb, Parent, PullRequestInfo};
    use crate::testutil::GitFixture;
    use crate::BranchName;

    fn name(s: &str) -> BranchName {
        BranchName::new(s).unwrap()
    }

    fn pr(number: u64, state: PrState) -> PullRequestInfo {
        PullRequestInfo {
            id: format!("PR_{number}"),
            number,
            permalink: format!("https://example.invalid/pr/{number}"),
            state,
        }
    }

    fn track(fixture: &GitFixture, branch: &str, oid: Oid) {
        fixture
            .repo
            .update_ref(&format!("refs/remotes/origin/{branch}"), oid, None)
            .unwrap();
    }

    #[test]
    fn classification_covers_all_reasons() {
        let fixture = GitFixture::new();
        let db = MetaDb::open(&fixture.repo.git_dir().to_path_buf(), name("main")).unwrap();

        fixture.branch("one");
        let one_old = fixture.commit("1.txt", "1\n", "one");
        fixture.branch("two");
        fixture.commit("2.txt", "2\n", "two");
        fixture.branch("merged");
        fixture.commit("m.txt", "m\n", "merged work");
        fixture.branch("fresh");
        fixture.commit("f.txt", "f\n", "fresh work");
        fixture.branch("orphan");
        fixture.commit("o.txt", "o\n", "orphan work");

        let mut tx = db.write_tx();
        let mut one = Branch::new(name("one"), Parent::trunk(name("main")));
        one.pull_request = Some(pr(1, PrState::Open));
        tx.set_branch(one);
        let mut two = Branch::new(name("two"), Parent::branch(name("one"), one_old.to_string()));
        two.pull_request = Some(pr(2, PrState::Open));
        tx.set_branch(two);
        let mut merged = Branch::new(name("merged"), Parent::trunk(name("main")));
        merged.pull_request = Some(pr(3, PrState::Merged));
        tx.set_branch(merged);
        tx.set_branch(Branch::new(name("fresh"), Parent::trunk(name("main"))));
        // orphan's ancestor chain has a branch with no PR.
        tx.set_branch(Branch::new(
            name("norpr"),
            Parent::trunk(name("main")),
        ));
        tx.set_branch(Branch::new(
            name("orphan"),
            Parent::branch(name("norpr"), one_old.to_string()),
        ));
        tx.commit().unwrap();

        // Remote state: one is stale on the remote, two tracks its tip,
        // norpr and orphan are tracked, fresh is not.
        let one_remote = fixture.tip("main");
        track(&fixture, "one", one_remote);
        let two_tip = fixture.tip("two");
        track(&fixture, "two", two_tip);
        track(&fixture, "norpr", one_old);
        track(&fixture, "orphan", fixture.tip("orphan"));

        let prs = HashMap::from([
            (
                "two".to_string(),
                PrFacts {
                    state: PrState::Open,
                    body_current: true,
                },
            ),
        ]);

        let targets: Vec<String> = ["one", "two", "merged", "fresh", "orphan"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let plan = plan(
            &fixture.repo,
            &db.read_tx(),
            "origin",
            &targets,
            &prs,
        )
        .unwrap();

        let skipped: HashMap<_, _> = plan.skipped.iter().cloned().collect();
        assert_eq!(skipped.get("merged"), Some(&PushSkipReason::Merged));
        assert_eq!(skipped.get("fresh"), Some(&PushSkipReason::NotPushed));
        assert_eq!(skipped.get("orphan"), Some(&PushSkipReason::NoPr));
        assert_eq!(skipped.get("two"), Some(&PushSkipReason::UpToDate));

        // one is ahead of its stale remote: pushed with the old tip as lease.
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].branch, "one");
        assert_eq!(plan.items[0].local, one_old);
        assert_eq!(plan.items[0].expected_remote, one_remote);
    }

    #[test]
    fn stale_body_forces_push_even_when_tips_match() {
        let fixture = GitFixture::new();
        let db = MetaDb::open(&fixture.repo.git_dir().to_path_buf(), name("main")).unwrap();

        fixture.branch("one");
        let tip = fixture.commit("1.txt", "1\n", "one");

        let mut tx = db.write_tx();
        let mut one = Branch::new(name("one"), Parent::trunk(name("main")));
        one.pull_request = Some(pr(1, PrState::Open));
        tx.set_branch(one);
        tx.commit().unwrap();

        track(&fixture, "one", tip);

        let prs = HashMap::from([(
            "one".to_string(),
            PrFacts {
                state: PrState::Open,
                body_current: false,
            },
        )]);
        let plan = plan(
            &fixture.repo,
            &db.read_tx(),
            "origin",
            &["one".to_string()],
            &prs,
        )
        .unwrap();

        // In the plan (the body needs rewriting) but with no refspec work.
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].local, plan.items[0].expected_remote);
    }

    /// S5: the remote moved under us; the atomic push rejects and no
    /// branch advances.
    #[test]
    fn lease_rejection_advances_nothing() {
        let fixture = GitFixture::new();

        // A real bare remote to push at.
        let remote_dir = tempfile::TempDir::new().unwrap();
        git2::Repository::init_bare(remote_dir.path()).unwrap();
        fixture
            .repo
            .inner()
            .remote("origin", remote_dir.path().to_str().unwrap())
            .unwrap();

        fixture.branch("one");
        let one_old = fixture.commit("1.txt", "1\n", "one");
        fixture.branch("two");
        let two_old = fixture.commit("2.txt", "2\n", "two");

        // First push establishes both branches on the remote.
        let first = PushPlan {
            items: vec![
                PushItem {
                    branch: "one".into(),
                    local: one_old,
                    expected_remote: one_old,
                },
                PushItem {
                    branch: "two".into(),
                    local: two_old,
                    expected_remote: two_old,
                },
            ],
            skipped: vec![],
        };
        // Tips equal expectations, so refspecs are empty; push directly.
        let specs: Vec<ForcePushSpec> = first
            .items
            .iter()
            .map(|i| ForcePushSpec {
                local_oid: i.local,
                remote_branch: i.branch.clone(),
                expected_remote_oid: None,
            })
            .collect();
        fixture
            .repo
            .push_atomic_force_with_lease("origin", &specs)
            .unwrap();

        // Local work on both branches.
        fixture.checkout("one");
        let one_new = fixture.commit("1.txt", "1b\n", "one again");
        fixture.checkout("two");
        let two_new = fixture.commit("2.txt", "2b\n", "two again");

        // Third party moves one on the remote.
        let third_party = fixture.commit("intruder.txt", "x\n", "third party");
        fixture
            .repo
            .push_atomic_force_with_lease(
                "origin",
                &[ForcePushSpec {
                    local_oid: third_party,
                    remote_branch: "one".into(),
                    expected_remote_oid: Some(one_old),
                }],
            )
            .unwrap();

        // Our push still expects the old remote tips: must be rejected
        // wholesale.
        let stale = PushPlan {
            items: vec![
                PushItem {
                    branch: "one".into(),
                    local: one_new,
                    expected_remote: one_old,
                },
                PushItem {
                    branch: "two".into(),
                    local: two_new,
                    expected_remote: two_old,
                },
            ],
            skipped: vec![],
        };
        let err = execute(&fixture.repo, "origin", &stale);
        assert!(matches!(
            err,
            Err(Error::Git(strata_git::Error::PushRejected(_)))
        ));

        // Neither ref moved on the remote.
        let remote_refs = fixture.repo.ls_remote("origin").unwrap();
        assert_eq!(remote_refs.get("refs/heads/one"), Some(&third_party));
        assert_eq!(remote_refs.get("refs/heads/two"), Some(&two_old));
    }
}
