//! Persisted checkpoints for resumable operations.
//!
//! The checkpoint file IS the operation state: after a conflict the process
//! exits, the user resolves in their shell, and `--continue` rebuilds the
//! in-memory state from the file. At most one checkpoint exists at a time,
//! across all operation kinds; starting anything while one exists is an
//! error.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::meta::MetaDb;

/// Which resumable operation a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// `strata restack`
    Restack,
    /// `strata sync`
    Sync,
    /// `strata reorder`
    Reorder,
}

impl OpKind {
    const ALL: [Self; 3] = [Self::Restack, Self::Sync, Self::Reorder];

    /// Checkpoint file name for this operation.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Restack => "restack.state.json",
            Self::Sync => "sync.state.json",
            Self::Reorder => "reorder.state.json",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Restack => "restack",
            Self::Sync => "sync",
            Self::Reorder => "reorder",
        };
        write!(f, "{s}")
    }
}

/// A resumable operation's persisted state.
///
/// For restack/sync the queue holds branch names still to process; for
/// reorder it holds serialized plan commands. `current` is the item the
/// operation stopped on (set while awaiting conflict resolution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Which operation this belongs to.
    pub op: OpKind,
    /// Branch name (or commit id, when HEAD was detached) to restore on
    /// completion or abort.
    pub original_head: String,
    /// Items remaining after `current`.
    pub queue: Vec<String>,
    /// The item being processed when the operation suspended.
    pub current: Option<String>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint at the start of an operation.
    #[must_use]
    pub fn new(op: OpKind, original_head: String, queue: Vec<String>) -> Self {
        Self {
            op,
            original_head,
            queue,
            current: None,
            started_at: Utc::now(),
        }
    }

    /// Move the next queued item into `current`, returning it.
    pub fn take_next(&mut self) -> Option<String> {
        if self.queue.is_empty() {
            self.current = None;
            return None;
        }
        let next = self.queue.remove(0);
        self.current = Some(next.clone());
        Some(next)
    }

    /// Whether nothing remains to process.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }
}

/// Filesystem store for checkpoints, rooted at `<git-dir>/strata/`.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store for a repository's git dir.
    #[must_use]
    pub fn new(git_dir: &Path) -> Self {
        Self {
            dir: MetaDb::state_dir(git_dir),
        }
    }

    fn path(&self, op: OpKind) -> PathBuf {
        self.dir.join(op.file_name())
    }

    /// The operation whose checkpoint currently exists, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<OpKind> {
        OpKind::ALL.into_iter().find(|op| self.path(*op).exists())
    }

    /// Persist the checkpoint for a *new* operation.
    ///
    /// # Errors
    /// Returns [`Error::OperationInProgress`] if any checkpoint already
    /// exists - silent overwrite would lose a resumable operation.
    pub fn create(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(existing) = self.in_progress() {
            return Err(Error::OperationInProgress(existing));
        }
        self.write(checkpoint)
    }

    /// Re-persist an already-running operation's checkpoint.
    ///
    /// # Errors
    /// Returns error if serialization or the write fails.
    pub fn update(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write(checkpoint)
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(checkpoint)?;
        fs::write(self.path(checkpoint.op), json)?;
        Ok(())
    }

    /// Load the checkpoint for an operation.
    ///
    /// # Errors
    /// Returns [`Error::NoOperationInProgress`] if none exists.
    pub fn load(&self, op: OpKind) -> Result<Checkpoint> {
        let path = self.path(op);
        if !path.exists() {
            return Err(Error::NoOperationInProgress);
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Remove an operation's checkpoint. Removing an absent one is a no-op.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed.
    pub fn clear(&self, op: OpKind) -> Result<()> {
        let path = self.path(op);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_load_clear_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path());
        assert!(store.in_progress().is_none());

        let cp = Checkpoint::new(
            OpKind::Restack,
            "main".into(),
            vec!["one".into(), "two".into()],
        );
        store.create(&cp).unwrap();
        assert_eq!(store.in_progress(), Some(OpKind::Restack));

        let loaded = store.load(OpKind::Restack).unwrap();
        assert_eq!(loaded, cp);

        store.clear(OpKind::Restack).unwrap();
        assert!(store.in_progress().is_none());
        assert!(matches!(
            store.load(OpKind::Restack),
            Err(Error::NoOperationInProgress)
        ));
    }

    #[test]
    fn second_checkpoint_is_refused() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp.path());

        let restack = Checkpoint::new(OpKind::Restack, "main".into(), vec![]);
        store.create(&restack).unwrap();

        // Any second operation must be refused, not just the same kind.
        let reorder = Checkpoint::new(OpKind::Reorder, "main".into(), vec![]);
        assert!(matches!(
            store.create(&reorder),
            Err(Error::OperationInProgress(OpKind::Restack))
        ));
    }

    #[test]
    fn take_next_tracks_current() {
        let mut cp = Checkpoint::new(OpKind::Sync, "main".into(), vec!["a".into(), "b".into()]);
        assert!(!cp.is_complete());

        assert_eq!(cp.take_next().as_deref(), Some("a"));
        assert_eq!(cp.current.as_deref(), Some("a"));
        assert_eq!(cp.queue, vec!["b".to_string()]);

        assert_eq!(cp.take_next().as_deref(), Some("b"));
        assert_eq!(cp.take_next(), None);
        assert!(cp.is_complete());
    }
}
