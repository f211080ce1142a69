//! The stack metadata database.
//!
//! A single JSON document at `<git-dir>/strata/strata.db` maps branch name
//! to branch record: parent pointer, parent head snapshot, pull-request
//! linkage, merge commit, exclusion flag. Reads copy a snapshot; writes hold
//! the process-wide lock until the document is atomically replaced on disk.
//! There is no cross-process locking; running two strata processes against
//! the same repository is undefined.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::branch_name::BranchName;
use crate::error::{Error, Result};

/// A commit id, stored in its hex form.
pub type CommitId = String;

/// The repository this database describes. Singleton per process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Opaque id issued by the hosting provider.
    #[serde(default)]
    pub id: String,
    /// Repository owner (user or organization).
    #[serde(default)]
    pub owner: String,
    /// Repository name.
    #[serde(default)]
    pub name: String,
}

/// A branch's parent pointer.
///
/// A trunk parent has no head snapshot (it tracks the remote tip at restack
/// time); a non-trunk parent records the parent's tip as of this branch's
/// last restack. That snapshot is the exclusive lower bound for the next
/// rebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parent {
    /// Parent branch name (managed branch or trunk).
    pub name: BranchName,
    /// Whether the parent is a trunk (long-lived integration branch).
    pub trunk: bool,
    /// The parent's tip at the last restack; `None` iff `trunk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<CommitId>,
}

impl Parent {
    /// A trunk parent.
    #[must_use]
    pub const fn trunk(name: BranchName) -> Self {
        Self {
            name,
            trunk: true,
            head: None,
        }
    }

    /// A managed-branch parent with its head snapshot.
    #[must_use]
    pub const fn branch(name: BranchName, head: CommitId) -> Self {
        Self {
            name,
            trunk: false,
            head: Some(head),
        }
    }
}

/// State of an associated pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    /// PR is open.
    Open,
    /// PR was closed without merging.
    Closed,
    /// PR was merged.
    Merged,
}

/// Pull-request linkage recorded on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// Provider-issued id.
    pub id: String,
    /// PR number.
    pub number: u64,
    /// Web URL.
    pub permalink: String,
    /// Last observed state.
    pub state: PrState,
}

/// One managed branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    /// Branch name (unique key).
    pub name: BranchName,
    /// Parent pointer.
    pub parent: Parent,
    /// Associated pull request, once one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
    /// The trunk commit this branch's PR was squash/rebase-merged as,
    /// once observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<CommitId>,
    /// Skip this branch in `sync --all`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded_from_sync_all: bool,
}

impl Branch {
    /// A fresh record for a branch stacked on `parent`.
    #[must_use]
    pub const fn new(name: BranchName, parent: Parent) -> Self {
        Self {
            name,
            parent,
            pull_request: None,
            merge_commit: None,
            excluded_from_sync_all: false,
        }
    }

    /// Whether this branch is known to be merged into a trunk.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merge_commit.is_some()
            || self
                .pull_request
                .as_ref()
                .is_some_and(|pr| pr.state == PrState::Merged)
    }
}

/// Raw branch record as found on disk. Older databases may omit the parent
/// entirely or its name; those records are interpreted as parented on the
/// default trunk.
#[derive(Debug, Deserialize)]
struct RawBranch {
    name: Option<BranchName>,
    parent: Option<RawParent>,
    pull_request: Option<PullRequestInfo>,
    merge_commit: Option<CommitId>,
    #[serde(default)]
    excluded_from_sync_all: bool,
}

#[derive(Debug, Deserialize)]
struct RawParent {
    name: Option<BranchName>,
    #[serde(default)]
    trunk: bool,
    head: Option<CommitId>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Document {
    repository: Repository,
    branches: BTreeMap<String, Branch>,
}

/// An immutable copy of the database state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    repository: Repository,
    branches: BTreeMap<String, Branch>,
    default_trunk: BranchName,
}

impl Snapshot {
    /// The repository record.
    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.repository
    }

    /// The trunk the database defaults to for legacy/zero records.
    #[must_use]
    pub const fn default_trunk(&self) -> &BranchName {
        &self.default_trunk
    }

    /// Look up a branch record.
    ///
    /// Returns a zero record (name populated, parented on the default
    /// trunk) and `false` when the branch has never been seen; callers
    /// distinguish "never seen" from "deleted" via the flag, never the
    /// record contents.
    #[must_use]
    pub fn branch(&self, name: &str) -> (Branch, bool) {
        self.branches.get(name).map_or_else(
            || (self.zero_record(name), false),
            |branch| (branch.clone(), true),
        )
    }

    fn zero_record(&self, name: &str) -> Branch {
        let name = BranchName::new(name).unwrap_or_else(|_| self.default_trunk.clone());
        Branch::new(name, Parent::trunk(self.default_trunk.clone()))
    }

    /// Shared lookup used by navigation; `None` when not managed.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    /// Whether a branch is recorded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// All branch records, ordered by name.
    pub fn all_branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    /// Number of managed branches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    /// Whether no branches are managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Whether `name` acts as a trunk: it is the default trunk or some
    /// record claims it as a trunk parent.
    #[must_use]
    pub fn is_trunk(&self, name: &str) -> bool {
        self.default_trunk == name
            || self
                .branches
                .values()
                .any(|b| b.parent.trunk && b.parent.name == name)
    }
}

/// The stack metadata database.
#[derive(Debug)]
pub struct MetaDb {
    path: PathBuf,
    default_trunk: BranchName,
    warnings: Vec<String>,
    state: Mutex<Document>,
}

impl MetaDb {
    const DB_FILE: &'static str = "strata.db";
    const DIR: &'static str = "strata";

    /// The strata state directory inside a git dir.
    #[must_use]
    pub fn state_dir(git_dir: &Path) -> PathBuf {
        git_dir.join(Self::DIR)
    }

    /// Whether a database file exists for this repository.
    #[must_use]
    pub fn is_initialized(git_dir: &Path) -> bool {
        Self::state_dir(git_dir).join(Self::DB_FILE).exists()
    }

    /// Open (or create in memory) the database for a repository.
    ///
    /// The state directory is created; the file itself is only written by
    /// the first committed transaction. Records whose parent name is
    /// missing are interpreted as parented on `default_trunk`; records that
    /// fail to parse at all are skipped and reported via [`Self::warnings`].
    ///
    /// # Errors
    /// Returns [`Error::DbCorrupt`] if the document itself is unreadable.
    pub fn open(git_dir: &Path, default_trunk: BranchName) -> Result<Self> {
        let dir = Self::state_dir(git_dir);
        fs::create_dir_all(&dir)?;
        let path = dir.join(Self::DB_FILE);

        let mut warnings = Vec::new();
        let document = if path.exists() {
            Self::load(&path, &default_trunk, &mut warnings)?
        } else {
            Document::default()
        };

        Ok(Self {
            path,
            default_trunk,
            warnings,
            state: Mutex::new(document),
        })
    }

    fn load(
        path: &Path,
        default_trunk: &BranchName,
        warnings: &mut Vec<String>,
    ) -> Result<Document> {
        let content = fs::read_to_string(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| Error::DbCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let repository = value
            .get("repository")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::DbCorrupt {
                path: path.to_path_buf(),
                message: format!("repository record: {e}"),
            })?
            .unwrap_or_default();

        let mut branches = BTreeMap::new();
        if let Some(map) = value.get("branches").and_then(|b| b.as_object()) {
            for (key, raw) in map {
                match Self::parse_branch(key, raw.clone(), default_trunk) {
                    Ok(branch) => {
                        branches.insert(key.clone(), branch);
                    }
                    Err(message) => {
                        warnings.push(format!("skipping corrupt record for '{key}': {message}"));
                    }
                }
            }
        }

        Ok(Document {
            repository,
            branches,
        })
    }

    /// Parse one branch record, applying the legacy-parent default.
    fn parse_branch(
        key: &str,
        raw: serde_json::Value,
        default_trunk: &BranchName,
    ) -> std::result::Result<Branch, String> {
        let raw: RawBranch = serde_json::from_value(raw).map_err(|e| e.to_string())?;

        let name = match raw.name {
            Some(name) => name,
            None => BranchName::new(key).map_err(|e| e.to_string())?,
        };

        let parent = match raw.parent {
            Some(RawParent {
                name: Some(parent_name),
                trunk,
                head,
            }) => Parent {
                name: parent_name,
                trunk,
                head,
            },
            // Missing parent name: default trunk (backward compatibility).
            _ => Parent::trunk(default_trunk.clone()),
        };

        Ok(Branch {
            name,
            parent,
            pull_request: raw.pull_request,
            merge_commit: raw.merge_commit,
            excluded_from_sync_all: raw.excluded_from_sync_all,
        })
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-record recovery warnings collected at open time.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Open a read transaction: copy the current state as a snapshot.
    ///
    /// # Panics
    /// Panics if the lock is poisoned (a prior panic mid-write).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn read_tx(&self) -> Snapshot {
        let guard = self.state.lock().expect("metadb lock poisoned");
        Snapshot {
            repository: guard.repository.clone(),
            branches: guard.branches.clone(),
            default_trunk: self.default_trunk.clone(),
        }
    }

    /// Open a write transaction. The lock is held until `commit` or drop.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn write_tx(&self) -> WriteTx<'_> {
        let guard = self.state.lock().expect("metadb lock poisoned");
        let work = guard.clone();
        WriteTx {
            db: self,
            guard,
            work,
        }
    }
}

/// An open write transaction.
///
/// Mutations apply to a working copy; nothing is visible to readers or the
/// filesystem until [`WriteTx::commit`]. Dropping the transaction aborts it.
#[derive(Debug)]
pub struct WriteTx<'a> {
    db: &'a MetaDb,
    guard: MutexGuard<'a, Document>,
    work: Document,
}

impl WriteTx<'_> {
    /// The repository record.
    #[must_use]
    pub const fn repository(&self) -> &Repository {
        &self.work.repository
    }

    /// Look up a branch in the working state (same contract as
    /// [`Snapshot::branch`]).
    #[must_use]
    pub fn branch(&self, name: &str) -> (Branch, bool) {
        self.snapshot().branch(name)
    }

    /// A snapshot of the working state, for navigation mid-transaction.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            repository: self.work.repository.clone(),
            branches: self.work.branches.clone(),
            default_trunk: self.db.default_trunk.clone(),
        }
    }

    /// Replace the repository record.
    pub fn set_repository(&mut self, repository: Repository) {
        self.work.repository = repository;
    }

    /// Insert or replace a branch record.
    pub fn set_branch(&mut self, branch: Branch) {
        self.work
            .branches
            .insert(branch.name.as_str().to_string(), branch);
    }

    /// Remove a branch record. Removing an absent record is a no-op.
    pub fn delete_branch(&mut self, name: &str) {
        self.work.branches.remove(name);
    }

    /// Validate invariants, atomically replace the on-disk document, and
    /// publish the new state to readers.
    ///
    /// A failed commit leaves both the prior file and the prior in-memory
    /// state intact.
    ///
    /// # Errors
    /// Returns an invariant violation, or an IO error from the atomic
    /// replace.
    pub fn commit(mut self) -> Result<()> {
        self.validate()?;

        let json = serde_json::to_string_pretty(&self.work)?;

        let dir = self
            .db
            .path
            .parent()
            .ok_or_else(|| Error::Io(std::io::Error::other("db path has no parent")))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.db.path)
            .map_err(|e| Error::Io(e.error))?;

        *self.guard = self.work;
        Ok(())
    }

    /// Discard the transaction, releasing the lock.
    pub fn abort(self) {
        drop(self);
    }

    /// Check the structural invariants over the working state.
    fn validate(&self) -> Result<()> {
        let branches = &self.work.branches;

        for branch in branches.values() {
            // 5: never self-parented.
            if branch.parent.name == branch.name {
                return Err(Error::SelfParent(branch.name.to_string()));
            }

            // 3: trunk ⇔ head empty.
            if branch.parent.trunk != branch.parent.head.is_none() {
                return Err(Error::TrunkHeadMismatch(branch.name.to_string()));
            }

            // 2: parent is a managed branch or a trunk.
            if !branch.parent.trunk && !branches.contains_key(branch.parent.name.as_str()) {
                return Err(Error::UnknownParent {
                    branch: branch.name.to_string(),
                    parent: branch.parent.name.to_string(),
                });
            }
        }

        // 1: no cycles. Walk each parent chain; trunk parents terminate.
        for start in branches.values() {
            let mut current = start;
            let mut steps = 0usize;
            while !current.parent.trunk {
                if current.parent.name == start.name || steps > branches.len() {
                    return Err(Error::CycleDetected {
                        branch: start.name.to_string(),
                        parent: start.parent.name.to_string(),
                    });
                }
                match branches.get(current.parent.name.as_str()) {
                    Some(next) => current = next,
                    None => break,
                }
                steps += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn trunk() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn open_db(temp: &TempDir) -> MetaDb {
        MetaDb::open(temp.path(), trunk()).unwrap()
    }

    fn record(name: &str, parent: Parent) -> Branch {
        Branch::new(BranchName::new(name).unwrap(), parent)
    }

    #[test]
    fn branch_lookup_distinguishes_never_seen() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let snapshot = db.read_tx();
        let (zero, exists) = snapshot.branch("ghost");
        assert!(!exists);
        assert_eq!(zero.name, "ghost");
        assert!(zero.parent.trunk);
        assert_eq!(zero.parent.name, "main");
    }

    #[test]
    fn commit_is_atomic_and_visible() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        tx.set_branch(record("one", Parent::trunk(trunk())));
        tx.commit().unwrap();

        assert!(MetaDb::is_initialized(temp.path()));
        let (_, exists) = db.read_tx().branch("one");
        assert!(exists);

        // Reload from disk sees the same state.
        let reopened = open_db(&temp);
        assert!(reopened.read_tx().contains("one"));
    }

    #[test]
    fn abort_discards_changes() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        tx.set_branch(record("one", Parent::trunk(trunk())));
        tx.abort();

        assert!(db.read_tx().is_empty());
    }

    #[test]
    fn failed_commit_leaves_prior_state() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        tx.set_branch(record("one", Parent::trunk(trunk())));
        tx.commit().unwrap();

        // Self-parent violates invariant 5; commit must fail and change nothing.
        let mut tx = db.write_tx();
        tx.set_branch(record(
            "two",
            Parent::branch(BranchName::new("two").unwrap(), "abc".into()),
        ));
        assert!(matches!(tx.commit(), Err(Error::SelfParent(_))));

        let snapshot = db.read_tx();
        assert!(snapshot.contains("one"));
        assert!(!snapshot.contains("two"));
    }

    #[test]
    fn cycle_is_rejected() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let a = BranchName::new("a").unwrap();
        let b = BranchName::new("b").unwrap();

        let mut tx = db.write_tx();
        tx.set_branch(record("a", Parent::branch(b.clone(), "1111".into())));
        tx.set_branch(record("b", Parent::branch(a.clone(), "2222".into())));
        assert!(matches!(tx.commit(), Err(Error::CycleDetected { .. })));
    }

    #[test]
    fn trunk_head_mismatch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        let mut bad = record("one", Parent::trunk(trunk()));
        bad.parent.head = Some("abc".into());
        tx.set_branch(bad);
        assert!(matches!(tx.commit(), Err(Error::TrunkHeadMismatch(_))));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        tx.set_branch(record(
            "one",
            Parent::branch(BranchName::new("missing").unwrap(), "abc".into()),
        ));
        assert!(matches!(tx.commit(), Err(Error::UnknownParent { .. })));
    }

    #[test]
    fn legacy_record_defaults_to_trunk_parent() {
        let temp = TempDir::new().unwrap();
        let dir = MetaDb::state_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("strata.db"),
            r#"{ "repository": {"id":"R1","owner":"o","name":"r"},
                 "branches": { "old": { "name": "old" } } }"#,
        )
        .unwrap();

        let db = open_db(&temp);
        let (old, exists) = db.read_tx().branch("old");
        assert!(exists);
        assert!(old.parent.trunk);
        assert_eq!(old.parent.name, "main");
    }

    #[test]
    fn corrupt_record_is_skipped_with_warning() {
        let temp = TempDir::new().unwrap();
        let dir = MetaDb::state_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("strata.db"),
            r#"{ "repository": {},
                 "branches": {
                   "good": { "name": "good" },
                   "bad": { "name": 42 } } }"#,
        )
        .unwrap();

        let db = open_db(&temp);
        assert_eq!(db.warnings().len(), 1);
        let snapshot = db.read_tx();
        assert!(snapshot.contains("good"));
        assert!(!snapshot.contains("bad"));
    }

    #[test]
    fn corrupt_document_errors() {
        let temp = TempDir::new().unwrap();
        let dir = MetaDb::state_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("strata.db"), "not json").unwrap();

        assert!(matches!(
            MetaDb::open(temp.path(), trunk()),
            Err(Error::DbCorrupt { .. })
        ));
    }

    #[test]
    fn serialization_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);

        let mut tx = db.write_tx();
        tx.set_branch(record("b", Parent::trunk(trunk())));
        tx.set_branch(record(
            "a",
            Parent::branch(BranchName::new("b").unwrap(), "abc".into()),
        ));
        tx.commit().unwrap();
        let first = fs::read(db.path()).unwrap();

        // A no-op transaction must rewrite identical bytes.
        let tx = db.write_tx();
        tx.commit().unwrap();
        let second = fs::read(db.path()).unwrap();
        assert_eq!(first, second);
    }
}
