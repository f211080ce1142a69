//! Trait abstraction for the PR provider.
//!
//! The core only needs a handful of operations; abstracting them keeps the
//! engines testable against canned PR records and keeps the wire protocol
//! out of the core entirely.

use crate::{
    CreatePullRequest, PullRequest, RepositoryInfo, Result, ReviewRequest, UpdatePullRequest,
};

/// PR provider operations used by the sync/push controllers.
///
/// All methods take `owner` and `repo` so one client can serve multiple
/// repositories.
pub trait PullRequestApi: Send + Sync {
    /// The repository record (opaque id, default branch).
    fn get_repository(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl std::future::Future<Output = Result<RepositoryInfo>> + Send;

    /// Find the PR whose head is `branch`, regardless of state.
    ///
    /// Returns `None` when the branch never had a PR.
    fn get_pr_by_head_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> impl std::future::Future<Output = Result<Option<PullRequest>>> + Send;

    /// Get a pull request by number.
    fn get_pr_by_number(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    /// The commit a merged PR landed as, once the provider knows it.
    fn get_merge_commit(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Create a pull request.
    fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    /// Update a pull request (body and/or base).
    fn update_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> impl std::future::Future<Output = Result<PullRequest>> + Send;

    /// Convert an open PR to draft (provider node id).
    fn convert_to_draft(
        &self,
        pr_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Mark a draft PR ready for review (provider node id).
    fn mark_ready(&self, pr_id: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Request reviews on a pull request.
    fn request_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        request: ReviewRequest,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
