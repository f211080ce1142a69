//! Error types for strata-github.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication failed or token rejected.
    #[error("GitHub authentication failed - run `gh auth login` or set GITHUB_TOKEN")]
    AuthenticationFailed,

    /// No token could be resolved.
    #[error("no GitHub token found - run `gh auth login` or set GITHUB_TOKEN")]
    NoToken,

    /// API rate limit exceeded.
    #[error("GitHub API rate limit exceeded - wait and try again")]
    RateLimited,

    /// PR not found.
    #[error("pull request not found: #{0}")]
    PrNotFound(u64),

    /// GraphQL mutation came back with errors.
    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),

    /// API error with status code.
    #[error("GitHub API error ({status}): {message}")]
    ApiError {
        /// HTTP status.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("failed to parse GitHub response: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error (e.g., reading the gh CLI token).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
