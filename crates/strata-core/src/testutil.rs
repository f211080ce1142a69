//! Real-repository test fixtures for the engine tests.
//!
//! The engines drive actual `git` invocations, so their tests run against
//! real repositories built in a tempdir.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use std::process::Command;

use strata_git::{Oid, Repository};
use tempfile::TempDir;

/// A throwaway repository with `main` checked out at an initial commit.
pub struct GitFixture {
    /// Keeps the directory alive for the fixture's lifetime.
    pub temp: TempDir,
    /// Adapter over the fixture repository.
    pub repo: Repository,
}

impl GitFixture {
    /// Initialize a repository on branch `main` with one commit.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let raw = git2::Repository::init(temp.path()).unwrap();

        // Branch name and committer identity independent of host config.
        raw.reference_symbolic("HEAD", "refs/heads/main", true, "init")
            .unwrap();
        let mut config = raw.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        drop(config);
        drop(raw);

        let fixture = Self {
            repo: Repository::open(temp.path()).unwrap(),
            temp,
        };
        fixture.commit("README.md", "fixture\n", "initial commit");
        fixture
    }

    fn workdir(&self) -> &Path {
        self.repo.workdir().unwrap()
    }

    /// Write a file and commit it on the current branch.
    pub fn commit(&self, file: &str, content: &str, message: &str) -> Oid {
        let raw = self.repo.inner();
        fs::write(self.workdir().join(file), content).unwrap();

        let mut index = raw.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = raw.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();

        let parents: Vec<git2::Commit<'_>> = raw
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        raw.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    /// Create a branch at the current HEAD and check it out.
    pub fn branch(&self, name: &str) {
        self.repo.checkout_branch(name, true).unwrap();
    }

    /// Check out an existing branch.
    pub fn checkout(&self, name: &str) {
        self.repo.checkout_branch(name, false).unwrap();
    }

    /// Tip of a branch.
    pub fn tip(&self, name: &str) -> Oid {
        self.repo.branch_oid(name).unwrap()
    }

    /// Overwrite every conflicted file with `content` and stage the result,
    /// as a user resolving a conflict would.
    pub fn resolve_all(&self, content: &str) {
        for file in self.repo.conflicting_files().unwrap() {
            fs::write(self.workdir().join(file), content).unwrap();
        }
        let status = Command::new("git")
            .args(["add", "-A"])
            .current_dir(self.workdir())
            .status()
            .unwrap();
        assert!(status.success());
    }
}
