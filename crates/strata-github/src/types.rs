//! GitHub API types.

use serde::{Deserialize, Serialize};

/// A pull request as the core cares about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// Provider-issued opaque id (the GraphQL node id); needed for draft
    /// conversions.
    pub id: String,

    /// PR number.
    pub number: u64,

    /// Web URL.
    pub permalink: String,

    /// PR state.
    pub state: PullRequestState,

    /// Whether this is a draft PR.
    pub draft: bool,

    /// Head branch name.
    pub head_branch: String,

    /// Base branch name.
    pub base_branch: String,

    /// PR body, where the stack block lives.
    pub body: Option<String>,
}

/// State of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PullRequestState {
    /// PR is open.
    Open,
    /// PR was closed without merging.
    Closed,
    /// PR was merged.
    Merged,
}

/// The repository as the provider describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    /// Provider-issued opaque id.
    pub id: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Default branch (the trunk, from the provider's point of view).
    pub default_branch: String,
}

/// Request to create a pull request.
#[derive(Debug, Serialize)]
pub struct CreatePullRequest {
    /// PR title.
    pub title: String,

    /// PR body.
    pub body: String,

    /// Head branch.
    pub head: String,

    /// Base branch.
    pub base: String,

    /// Whether to create as draft.
    pub draft: bool,
}

/// Request to update a pull request. Only `Some` fields are sent.
#[derive(Debug, Default, Serialize)]
pub struct UpdatePullRequest {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// New body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// New base branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

/// Request to add reviewers to a pull request.
#[derive(Debug, Serialize)]
pub struct ReviewRequest {
    /// User logins to request review from.
    pub reviewers: Vec<String>,

    /// Team slugs to request review from.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub team_reviewers: Vec<String>,
}
