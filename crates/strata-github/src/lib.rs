//! # strata-github
//!
//! The PR provider interface for Strata: a [`PullRequestApi`] trait the
//! controllers depend on, a concrete [`GitHubClient`] over the REST and
//! GraphQL APIs, and the [`StackBlock`] stack-metadata block that strata
//! round-trips through PR bodies.
//!
//! Tokens are held as `SecretString` and zeroized on drop.

mod auth;
mod body;
mod client;
mod error;
mod traits;
mod types;

pub use auth::Auth;
pub use body::StackBlock;
pub use client::GitHubClient;
pub use error::{Error, Result};
// Re-export for constructing Auth::Token.
pub use secrecy::SecretString;
pub use traits::PullRequestApi;
pub use types::{
    CreatePullRequest, PullRequest, PullRequestState, RepositoryInfo, ReviewRequest,
    UpdatePullRequest,
};
