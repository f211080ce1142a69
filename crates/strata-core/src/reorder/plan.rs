//! The reorder plan language.
//!
//! A plan is a line-oriented script the user edits in their editor:
//!
//! ```text
//! stack-branch one --trunk main@2f1e8c0
//! pick 1a2b3c4    # first commit
//! pick 5d6e7f8
//! stack-branch two --parent one
//! pick 9a8b7c6
//! delete-branch scratch --delete-ref
//! ```
//!
//! `#` starts an end-of-line comment. `sb`, `p`, and `db` are accepted as
//! short forms; serialization always emits the long forms.

use strata_git::GitOps;

use crate::error::{Error, Result};
use crate::meta::Snapshot;

/// Where a `stack-branch` command roots its branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentSpec {
    /// `--parent <branch>`
    Branch(String),
    /// `--trunk <name>[@<commit>]`
    Trunk {
        /// Trunk branch name.
        name: String,
        /// Pin the branch's start point to this commit; defaults to the
        /// trunk tip at execution time.
        commit: Option<String>,
    },
}

/// One plan command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create or reposition a branch; subsequent `pick`s apply to it.
    StackBranch {
        /// Branch name.
        name: String,
        /// Explicit parent; `None` means the previous `stack-branch`.
        parent: Option<ParentSpec>,
    },
    /// Cherry-pick a commit onto the current branch (fast-forward enabled).
    Pick {
        /// Commit id, full or abbreviated.
        commit: String,
    },
    /// Remove a branch from the database, optionally deleting the git ref.
    DeleteBranch {
        /// Branch name.
        name: String,
        /// Also delete `refs/heads/<name>`.
        delete_ref: bool,
    },
}

impl Command {
    fn parse(line_no: usize, tokens: &[&str]) -> Result<Self> {
        let err = |message: String| Error::PlanParse {
            line: line_no,
            message,
        };

        match tokens[0] {
            "stack-branch" | "sb" => {
                let name = tokens
                    .get(1)
                    .ok_or_else(|| err("stack-branch requires a branch name".into()))?;
                let mut parent = None;
                let mut rest = tokens[2..].iter();
                while let Some(flag) = rest.next() {
                    let value = rest
                        .next()
                        .ok_or_else(|| err(format!("{flag} requires a value")))?;
                    let spec = match *flag {
                        "--parent" => ParentSpec::Branch((*value).to_string()),
                        "--trunk" => match value.split_once('@') {
                            Some((name, commit)) => ParentSpec::Trunk {
                                name: name.to_string(),
                                commit: Some(commit.to_string()),
                            },
                            None => ParentSpec::Trunk {
                                name: (*value).to_string(),
                                commit: None,
                            },
                        },
                        other => return Err(err(format!("unknown flag {other}"))),
                    };
                    if parent.replace(spec).is_some() {
                        return Err(err(
                            "at most one of --parent / --trunk may be given".into()
                        ));
                    }
                }
                Ok(Self::StackBranch {
                    name: (*name).to_string(),
                    parent,
                })
            }
            "pick" | "p" => {
                let commit = tokens
                    .get(1)
                    .ok_or_else(|| err("pick requires a commit".into()))?;
                if tokens.len() > 2 {
                    return Err(err("pick takes exactly one commit".into()));
                }
                Ok(Self::Pick {
                    commit: (*commit).to_string(),
                })
            }
            "delete-branch" | "db" => {
                let name = tokens
                    .get(1)
                    .ok_or_else(|| err("delete-branch requires a branch name".into()))?;
                let delete_ref = match tokens.get(2) {
                    None => false,
                    Some(&"--delete-ref") => true,
                    Some(other) => return Err(err(format!("unknown flag {other}"))),
                };
                Ok(Self::DeleteBranch {
                    name: (*name).to_string(),
                    delete_ref,
                })
            }
            other => Err(err(format!("unknown command {other}"))),
        }
    }

    /// Serialize to one plan line.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::StackBranch { name, parent } => match parent {
                None => format!("stack-branch {name}"),
                Some(ParentSpec::Branch(p)) => format!("stack-branch {name} --parent {p}"),
                Some(ParentSpec::Trunk { name: t, commit }) => match commit {
                    Some(c) => format!("stack-branch {name} --trunk {t}@{c}"),
                    None => format!("stack-branch {name} --trunk {t}"),
                },
            },
            Self::Pick { commit } => format!("pick {commit}"),
            Self::DeleteBranch { name, delete_ref } => {
                if *delete_ref {
                    format!("delete-branch {name} --delete-ref")
                } else {
                    format!("delete-branch {name}")
                }
            }
        }
    }
}

/// An editable reorder plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Commands in execution order.
    pub commands: Vec<Command>,
}

impl Plan {
    /// Parse a plan from its textual form.
    ///
    /// # Errors
    /// Returns [`Error::PlanParse`] with the offending 1-based line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut commands = Vec::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            commands.push(Command::parse(idx + 1, &tokens)?);
        }
        Ok(Self { commands })
    }

    /// Serialize to the textual form. `parse(serialize(plan)) == plan`.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            out.push_str(&command.to_line());
            out.push('\n');
        }
        out
    }

    /// Branch names created or positioned by this plan.
    #[must_use]
    pub fn stacked_branches(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::StackBranch { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Branch names explicitly deleted by this plan.
    #[must_use]
    pub fn deleted_branches(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DeleteBranch { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Resolve implicit parents: a `stack-branch` with no `--parent`/
    /// `--trunk` is parented on the previous `stack-branch` in the plan.
    ///
    /// # Errors
    /// Returns [`Error::PlanParse`] if the first `stack-branch` has no
    /// explicit parent.
    pub fn resolve_implicit_parents(&mut self) -> Result<()> {
        let mut previous: Option<String> = None;
        for (idx, command) in self.commands.iter_mut().enumerate() {
            if let Command::StackBranch { name, parent } = command {
                if parent.is_none() {
                    let prev = previous.clone().ok_or(Error::PlanParse {
                        line: idx + 1,
                        message: "first stack-branch needs --parent or --trunk".to_string(),
                    })?;
                    *parent = Some(ParentSpec::Branch(prev));
                }
                previous = Some(name.clone());
            }
        }
        Ok(())
    }
}

/// Branches added and removed between two plans.
///
/// A branch "removed" by deleting its lines is only safe if it still
/// exists in git or is explicitly handled by `delete-branch`; callers warn
/// about the rest.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanDiff {
    /// In `new` but not `old`.
    pub added: Vec<String>,
    /// In `old` but neither stacked nor deleted in `new`.
    pub removed: Vec<String>,
}

/// Compute the branch-level diff between two plans.
#[must_use]
pub fn diff(old: &Plan, new: &Plan) -> PlanDiff {
    let old_branches = old.stacked_branches();
    let new_branches = new.stacked_branches();
    let new_deleted = new.deleted_branches();

    PlanDiff {
        added: new_branches
            .iter()
            .filter(|b| !old_branches.contains(b))
            .map(ToString::to_string)
            .collect(),
        removed: old_branches
            .iter()
            .filter(|b| !new_branches.contains(b) && !new_deleted.contains(b))
            .map(ToString::to_string)
            .collect(),
    }
}

/// Generate the canonical plan for the stack rooted at `root`'s stack root:
/// depth-first over the tree, one `stack-branch` header per branch followed
/// by a `pick` for each commit the branch introduced.
///
/// # Errors
/// Returns git errors resolving tips and merge bases.
pub fn generate<G: GitOps>(git: &G, snapshot: &Snapshot, root: &str) -> Result<Plan> {
    let mut commands = Vec::new();

    for branch in snapshot.stack_branches(root) {
        let tip = git.branch_oid(branch.name.as_str())?;

        let (header_parent, bound) = if branch.parent.trunk {
            let trunk_tip = git.branch_oid(branch.parent.name.as_str()).or_else(|_| {
                git.rev_parse(&format!("refs/remotes/origin/{}", branch.parent.name))
            })?;
            let base = git.merge_base(trunk_tip, tip)?;
            (
                ParentSpec::Trunk {
                    name: branch.parent.name.to_string(),
                    commit: Some(short(&base.to_string())),
                },
                base,
            )
        } else {
            let bound = match branch.parent.head.as_deref() {
                Some(head) => git.rev_parse(head)?,
                None => {
                    let parent_tip = git.branch_oid(branch.parent.name.as_str())?;
                    git.merge_base(parent_tip, tip)?
                }
            };
            (ParentSpec::Branch(branch.parent.name.to_string()), bound)
        };

        commands.push(Command::StackBranch {
            name: branch.name.to_string(),
            parent: Some(header_parent),
        });
        for commit in git.rev_list(tip, Some(bound), true)? {
            commands.push(Command::Pick {
                commit: short(&commit.to_string()),
            });
        }
    }

    Ok(Plan { commands })
}

fn short(oid: &str) -> String {
    oid.chars().take(12).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# reorder two branches
stack-branch one --trunk main@2f1e8c0abc12
pick 1a2b3c4
pick 5d6e7f8      # keep this one second
stack-branch two --parent one
pick 9a8b7c6
delete-branch scratch --delete-ref
";

    #[test]
    fn parse_sample_plan() {
        let plan = Plan::parse(SAMPLE).unwrap();
        assert_eq!(plan.commands.len(), 6);
        assert_eq!(
            plan.commands[0],
            Command::StackBranch {
                name: "one".into(),
                parent: Some(ParentSpec::Trunk {
                    name: "main".into(),
                    commit: Some("2f1e8c0abc12".into()),
                }),
            }
        );
        assert_eq!(
            plan.commands[5],
            Command::DeleteBranch {
                name: "scratch".into(),
                delete_ref: true,
            }
        );
    }

    #[test]
    fn parse_accepts_short_forms() {
        let plan = Plan::parse("sb one --trunk main\np abc123\ndb old\n").unwrap();
        assert_eq!(plan.commands.len(), 3);
        assert!(matches!(&plan.commands[1], Command::Pick { commit } if commit == "abc123"));
    }

    #[test]
    fn round_trip() {
        let plan = Plan::parse(SAMPLE).unwrap();
        let reparsed = Plan::parse(&plan.serialize()).unwrap();
        assert_eq!(plan, reparsed);
    }

    #[test]
    fn parse_rejects_bad_lines() {
        for (text, want_line) in [
            ("frobnicate x", 1),
            ("pick", 1),
            ("stack-branch", 1),
            ("pick a b", 1),
            ("sb x --parent p --trunk t", 1),
            ("sb ok --trunk main\nsb bad --wat y", 2),
        ] {
            match Plan::parse(text) {
                Err(Error::PlanParse { line, .. }) => assert_eq!(line, want_line, "{text}"),
                other => panic!("expected parse error for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn implicit_parent_resolution() {
        let mut plan = Plan::parse("sb one --trunk main\nsb two\nsb three\n").unwrap();
        plan.resolve_implicit_parents().unwrap();
        assert_eq!(
            plan.commands[1],
            Command::StackBranch {
                name: "two".into(),
                parent: Some(ParentSpec::Branch("one".into())),
            }
        );
        assert_eq!(
            plan.commands[2],
            Command::StackBranch {
                name: "three".into(),
                parent: Some(ParentSpec::Branch("two".into())),
            }
        );

        let mut headless = Plan::parse("sb one\n").unwrap();
        assert!(headless.resolve_implicit_parents().is_err());
    }

    #[test]
    fn diff_flags_dropped_branches() {
        let old = Plan::parse("sb one --trunk main\nsb two --parent one\n").unwrap();

        let kept = Plan::parse("sb one --trunk main\ndb two\n").unwrap();
        let d = diff(&old, &kept);
        assert!(d.removed.is_empty());

        let dropped = Plan::parse("sb one --trunk main\n").unwrap();
        let d = diff(&old, &dropped);
        assert_eq!(d.removed, ["two"]);

        let added = Plan::parse("sb one --trunk main\nsb two --parent one\nsb three\n").unwrap();
        let d = diff(&old, &added);
        assert_eq!(d.added, ["three"]);
    }
}
