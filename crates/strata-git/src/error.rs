//! Error types for strata-git.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in git adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not inside a Git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepository,

    /// Operation requires a working tree (bare repository).
    #[error("this operation requires a working tree")]
    BareRepository,

    /// HEAD is not on a branch.
    #[error("HEAD is detached - check out a branch first")]
    DetachedHead,

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Reference not found.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Remote not found.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// A revision could not be resolved to a commit.
    #[error("cannot resolve revision: {0}")]
    RevParseFailed(String),

    /// The working directory has uncommitted changes.
    #[error("working directory has uncommitted changes - commit or stash them first")]
    DirtyWorkingDirectory,

    /// A ref update was rejected because the old value didn't match.
    #[error("ref '{refname}' changed concurrently - expected {expected}")]
    StaleRef {
        /// The ref that was being updated.
        refname: String,
        /// The old value the update was conditioned on.
        expected: String,
    },

    /// A spawned git command exited non-zero for a non-conflict reason.
    #[error("git {command} failed: {stderr}")]
    CommandFailed {
        /// The git subcommand that was run.
        command: String,
        /// Captured stderr from the process.
        stderr: String,
    },

    /// The remote rejected a push.
    #[error("push rejected by remote: {0}")]
    PushRejected(String),

    /// Fetch from the remote failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Git object layer error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error spawning or talking to a git process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
