//! Stack-shape inference for branches created outside strata.
//!
//! Walks each unmanaged branch's history tip-down until it hits something
//! that identifies a parent: a commit already reachable from the trunk, or
//! the tip of another branch. Merge commits and shared tips cannot be
//! adopted automatically and come back as diagnostics instead.

use std::collections::BTreeMap;

use strata_git::{GitOps, Oid};

use crate::branch_name::BranchName;
use crate::error::Result;
use crate::meta::{Branch, MetaDb, Parent};

/// What the detector concluded about one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A parent was identified.
    Stacked {
        /// The branch examined.
        branch: String,
        /// Inferred parent (trunk or another branch).
        parent: String,
        /// Whether the parent is the trunk.
        parent_is_trunk: bool,
        /// Fork point: the parent-side commit the branch grows from.
        merge_base: Oid,
        /// The branch's own commits, oldest first.
        commits: Vec<Oid>,
    },
    /// History contains a merge commit; cannot adopt automatically.
    ContainsMerge {
        /// The branch examined.
        branch: String,
        /// The merge commit that stopped the walk.
        at: Oid,
    },
    /// More than one branch explains this commit; a human must choose.
    AmbiguousParent {
        /// The branch examined.
        branch: String,
        /// The commit shared by several branches.
        at: Oid,
        /// The branches that could be the parent.
        candidates: Vec<String>,
    },
    /// The walk ran out of history without reaching the trunk.
    NoParentFound {
        /// The branch examined.
        branch: String,
    },
}

impl Detection {
    /// The branch this detection is about.
    #[must_use]
    pub fn branch(&self) -> &str {
        match self {
            Self::Stacked { branch, .. }
            | Self::ContainsMerge { branch, .. }
            | Self::AmbiguousParent { branch, .. }
            | Self::NoParentFound { branch } => branch,
        }
    }
}

/// Infer parents for `targets`.
///
/// `parent_candidates` maps every branch that may serve as a parent
/// (managed branches and the targets themselves) to its tip.
///
/// # Errors
/// Returns git errors from the history walk.
pub fn detect<G: GitOps>(
    git: &G,
    trunk: &str,
    trunk_tip: Oid,
    targets: &[String],
    parent_candidates: &BTreeMap<String, Oid>,
) -> Result<Vec<Detection>> {
    // Invert to commit → branches for tip matching.
    let mut tips: BTreeMap<Oid, Vec<&str>> = BTreeMap::new();
    for (name, oid) in parent_candidates {
        tips.entry(*oid).or_default().push(name.as_str());
    }

    let mut detections = Vec::new();
    for target in targets {
        detections.push(detect_one(git, trunk, trunk_tip, target, &tips)?);
    }
    Ok(detections)
}

fn detect_one<G: GitOps>(
    git: &G,
    trunk: &str,
    trunk_tip: Oid,
    branch: &str,
    tips: &BTreeMap<Oid, Vec<&str>>,
) -> Result<Detection> {
    let tip = git.branch_oid(branch)?;
    let mut current = tip;
    let mut commits = Vec::new();

    loop {
        // Reached trunk history: the branch grows off the trunk here.
        if git.is_ancestor(current, trunk_tip)? {
            commits.reverse();
            return Ok(Detection::Stacked {
                branch: branch.to_string(),
                parent: trunk.to_string(),
                parent_is_trunk: true,
                merge_base: current,
                commits,
            });
        }

        let owners: Vec<&str> = tips
            .get(&current)
            .map(|names| {
                names
                    .iter()
                    .copied()
                    .filter(|name| *name != branch)
                    .collect()
            })
            .unwrap_or_default();

        if current == tip {
            // Another branch shares our tip: either could be the parent.
            if !owners.is_empty() {
                return Ok(Detection::AmbiguousParent {
                    branch: branch.to_string(),
                    at: current,
                    candidates: owners.iter().map(ToString::to_string).collect(),
                });
            }
        } else {
            match owners.as_slice() {
                [] => {}
                [parent] => {
                    commits.reverse();
                    return Ok(Detection::Stacked {
                        branch: branch.to_string(),
                        parent: (*parent).to_string(),
                        parent_is_trunk: false,
                        merge_base: current,
                        commits,
                    });
                }
                many => {
                    return Ok(Detection::AmbiguousParent {
                        branch: branch.to_string(),
                        at: current,
                        candidates: many.iter().map(ToString::to_string).collect(),
                    });
                }
            }
        }

        if git.parent_count(current)? > 1 {
            return Ok(Detection::ContainsMerge {
                branch: branch.to_string(),
                at: current,
            });
        }

        commits.push(current);
        match git.first_parent(current)? {
            Some(parent) => current = parent,
            None => {
                return Ok(Detection::NoParentFound {
                    branch: branch.to_string(),
                });
            }
        }
    }
}

/// Record successfully detected branches in the database.
///
/// The fork point becomes the parent head snapshot, so the next restack
/// replays exactly the commits the detector attributed to the branch.
/// Already-managed branches are left untouched, which makes adopt
/// idempotent.
///
/// Returns the names actually adopted.
///
/// # Errors
/// Returns database errors.
pub fn adopt(db: &MetaDb, detections: &[Detection]) -> Result<Vec<String>> {
    let mut adopted = Vec::new();
    let mut tx = db.write_tx();

    for detection in detections {
        let Detection::Stacked {
            branch,
            parent,
            parent_is_trunk,
            merge_base,
            ..
        } = detection
        else {
            continue;
        };

        let (_, exists) = tx.branch(branch);
        if exists {
            continue;
        }

        let parent_name = BranchName::new(parent.as_str())?;
        let parent_record = if *parent_is_trunk {
            Parent::trunk(parent_name)
        } else {
            Parent::branch(parent_name, merge_base.to_string())
        };
        tx.set_branch(Branch::new(BranchName::new(branch.as_str())?, parent_record));
        adopted.push(branch.clone());
    }

    if adopted.is_empty() {
        tx.abort();
    } else {
        tx.commit()?;
    }
    Ok(adopted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::GitFixture;

    fn candidates(fixture: &GitFixture, names: &[&str]) -> BTreeMap<String, Oid> {
        names
            .iter()
            .map(|n| ((*n).to_string(), fixture.tip(n)))
            .collect()
    }

    #[test]
    fn branch_off_trunk_is_detected() {
        let fixture = GitFixture::new();
        let initial = fixture.tip("main");

        fixture.branch("feature");
        let c1 = fixture.commit("f.txt", "1\n", "feature: one");
        let c2 = fixture.commit("f.txt", "2\n", "feature: two");

        let dets = detect(
            &fixture.repo,
            "main",
            initial,
            &["feature".to_string()],
            &candidates(&fixture, &["feature"]),
        )
        .unwrap();

        assert_eq!(
            dets,
            vec![Detection::Stacked {
                branch: "feature".into(),
                parent: "main".into(),
                parent_is_trunk: true,
                merge_base: initial,
                commits: vec![c1, c2],
            }]
        );
    }

    #[test]
    fn stacked_branch_finds_branch_parent() {
        let fixture = GitFixture::new();
        let initial = fixture.tip("main");

        fixture.branch("one");
        fixture.commit("a.txt", "a\n", "one: a");
        fixture.branch("two");
        let c = fixture.commit("b.txt", "b\n", "two: b");

        let dets = detect(
            &fixture.repo,
            "main",
            initial,
            &["two".to_string()],
            &candidates(&fixture, &["one", "two"]),
        )
        .unwrap();

        assert_eq!(
            dets,
            vec![Detection::Stacked {
                branch: "two".into(),
                parent: "one".into(),
                parent_is_trunk: false,
                merge_base: fixture.tip("one"),
                commits: vec![c],
            }]
        );
    }

    #[test]
    fn shared_tip_is_ambiguous() {
        let fixture = GitFixture::new();
        let initial = fixture.tip("main");

        fixture.branch("one");
        fixture.commit("a.txt", "a\n", "one: a");
        // twin points at the same commit as one.
        fixture.branch("twin");

        let dets = detect(
            &fixture.repo,
            "main",
            initial,
            &["twin".to_string()],
            &candidates(&fixture, &["one", "twin"]),
        )
        .unwrap();

        assert!(matches!(
            dets.as_slice(),
            [Detection::AmbiguousParent { candidates, .. }] if candidates == &["one".to_string()]
        ));
    }

    #[test]
    fn merge_commit_stops_detection() {
        let fixture = GitFixture::new();
        let initial = fixture.tip("main");

        fixture.branch("side");
        fixture.commit("s.txt", "s\n", "side work");
        fixture.checkout("main");
        fixture.commit("m.txt", "m\n", "main work");

        // Hand-build a merge commit on a new branch.
        let raw = fixture.repo.inner();
        let main_tip = raw.head().unwrap().peel_to_commit().unwrap();
        let side_tip = raw
            .find_branch("side", git2::BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let merge = raw
            .commit(
                None,
                &sig,
                &sig,
                "merge side",
                &main_tip.tree().unwrap(),
                &[&main_tip, &side_tip],
            )
            .unwrap();
        raw.reference("refs/heads/merged", merge, true, "test")
            .unwrap();

        let dets = detect(
            &fixture.repo,
            "main",
            initial,
            &["merged".to_string()],
            &candidates(&fixture, &["merged"]),
        )
        .unwrap();

        assert!(matches!(
            dets.as_slice(),
            [Detection::ContainsMerge { at, .. }] if *at == merge
        ));
    }

    #[test]
    fn adopt_records_and_is_idempotent() {
        let fixture = GitFixture::new();
        let initial = fixture.tip("main");

        fixture.branch("feature");
        fixture.commit("f.txt", "1\n", "feature: one");

        let db = MetaDb::open(
            &fixture.repo.git_dir().to_path_buf(),
            BranchName::new("main").unwrap(),
        )
        .unwrap();

        let dets = detect(
            &fixture.repo,
            "main",
            initial,
            &["feature".to_string()],
            &candidates(&fixture, &["feature"]),
        )
        .unwrap();

        let adopted = adopt(&db, &dets).unwrap();
        assert_eq!(adopted, ["feature"]);

        let (record, exists) = db.read_tx().branch("feature");
        assert!(exists);
        assert!(record.parent.trunk);
        assert_eq!(record.parent.name, "main");

        // Second run adopts nothing and changes nothing.
        let again = adopt(&db, &dets).unwrap();
        assert!(again.is_empty());
    }
}
