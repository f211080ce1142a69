//! Pure navigation over a database snapshot.
//!
//! Children are never stored; every relation here is derived from the
//! parent pointers, so the graph cannot drift out of sync with itself.

use crate::branch_name::BranchName;
use crate::meta::{Branch, Snapshot};

impl Snapshot {
    /// Branches whose parent is `name`, ordered by name.
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<&Branch> {
        self.all_branches()
            .filter(|b| b.parent.name == name)
            .collect()
    }

    /// All transitive descendants of `name`, topologically ordered
    /// (parents before children).
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&Branch> {
        let mut result = Vec::new();
        let mut frontier = vec![name.to_string()];

        while let Some(parent) = frontier.pop() {
            for child in self.children(&parent) {
                result.push(child);
                frontier.push(child.name.to_string());
            }
        }
        result
    }

    /// Managed ancestors of `name`, root-first, excluding trunks and the
    /// branch itself.
    #[must_use]
    pub fn ancestors(&self, name: &str) -> Vec<&Branch> {
        let mut chain = Vec::new();
        let mut current = match self.get(name) {
            Some(branch) => branch,
            None => return chain,
        };

        while !current.parent.trunk {
            match self.get(current.parent.name.as_str()) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
            // Committed state is acyclic; cap the walk anyway so a
            // hand-edited database cannot hang us.
            if chain.len() > self.len() {
                break;
            }
        }

        chain.reverse();
        chain
    }

    /// Topologically ordered ancestors of `name` (root-first); alias used
    /// by the engines when walking toward a branch.
    #[must_use]
    pub fn previous_branches(&self, name: &str) -> Vec<&Branch> {
        self.ancestors(name)
    }

    /// Topologically ordered descendants of `name`.
    #[must_use]
    pub fn subsequent_branches(&self, name: &str) -> Vec<&Branch> {
        self.descendants(name)
    }

    /// The last managed ancestor whose parent is a trunk (or the branch
    /// itself when it sits directly on a trunk).
    #[must_use]
    pub fn stack_root(&self, name: &str) -> Option<&Branch> {
        let branch = self.get(name)?;
        if branch.parent.trunk {
            return Some(branch);
        }
        self.ancestors(name)
            .into_iter()
            .find(|b| b.parent.trunk)
            .or(Some(branch))
    }

    /// The trunk this branch's stack ultimately rests on.
    #[must_use]
    pub fn trunk_of(&self, name: &str) -> Option<&BranchName> {
        self.stack_root(name).map(|root| &root.parent.name)
    }

    /// Every branch in the tree rooted at `name`'s stack root, topologically
    /// ordered: root first, then descendants parent-before-child.
    #[must_use]
    pub fn stack_branches(&self, name: &str) -> Vec<&Branch> {
        let Some(root) = self.stack_root(name) else {
            return Vec::new();
        };
        let mut all = vec![root];
        all.extend(self.descendants(root.name.as_str()));
        all
    }

    /// Whether setting `branch`'s parent to `new_parent` would introduce a
    /// cycle: true iff `new_parent` is `branch` itself or one of its
    /// descendants.
    #[must_use]
    pub fn would_create_cycle(&self, branch: &str, new_parent: &str) -> bool {
        if branch == new_parent {
            return true;
        }
        self.descendants(branch)
            .iter()
            .any(|d| d.name == new_parent)
    }
}
