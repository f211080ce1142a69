//! Error types for strata-core.

use std::path::PathBuf;

use crate::checkpoint::OpKind;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strata-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Branch is not recorded in the stack database.
    #[error("branch '{0}' is not managed by strata - run `strata adopt` first")]
    NotManaged(String),

    /// Branch does not exist in git.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Invalid branch name.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName {
        /// The invalid name.
        name: String,
        /// Why the name is invalid.
        reason: String,
    },

    /// A proposed parent assignment would make the graph cyclic.
    #[error("setting parent of '{branch}' to '{parent}' would create a cycle")]
    CycleDetected {
        /// The branch being re-parented.
        branch: String,
        /// The proposed parent.
        parent: String,
    },

    /// A branch record names itself as parent.
    #[error("branch '{0}' cannot be its own parent")]
    SelfParent(String),

    /// A branch record names a parent that is neither managed nor a trunk.
    #[error("branch '{branch}' has unknown parent '{parent}'")]
    UnknownParent {
        /// The branch with the dangling pointer.
        branch: String,
        /// The missing parent.
        parent: String,
    },

    /// Trunk parents carry no head snapshot; non-trunk parents must.
    #[error("branch '{0}': trunk parent must have no head snapshot (and vice versa)")]
    TrunkHeadMismatch(String),

    /// An operation checkpoint already exists.
    #[error(
        "a {0} is already in progress - run `strata {0} --continue`, `--skip`, or `--abort` first"
    )]
    OperationInProgress(OpKind),

    /// No checkpoint exists for --continue/--abort.
    #[error("no operation in progress")]
    NoOperationInProgress,

    /// --continue was invoked but git has nothing pending.
    #[error("nothing to continue - git reports no rebase or cherry-pick in progress")]
    NothingToContinue,

    /// Preflight: the branch must be restacked before a destructive operation.
    #[error("branch '{branch}' is not in sync with parent '{parent}' - run `strata sync` first")]
    NotInSyncWithParent {
        /// The out-of-date branch.
        branch: String,
        /// Its recorded parent.
        parent: String,
    },

    /// The database document itself could not be parsed.
    #[error("stack database at {path} is corrupt: {message}")]
    DbCorrupt {
        /// Database file path.
        path: PathBuf,
        /// Parse failure detail.
        message: String,
    },

    /// A reorder plan failed to parse.
    #[error("plan line {line}: {message}")]
    PlanParse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A reorder plan drops branches without handling them.
    #[error("plan drops branches without `delete-branch`: {0}")]
    PlanDropsBranches(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(#[from] strata_git::Error),
}
