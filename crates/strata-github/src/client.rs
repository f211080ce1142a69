//! GitHub API client.
//!
//! REST for everything the REST API can do; GraphQL mutations for the two
//! operations it cannot (draft conversion in both directions).

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::auth::Auth;
use crate::error::{Error, Result};
use crate::traits::PullRequestApi;
use crate::types::{
    CreatePullRequest, PullRequest, PullRequestState, RepositoryInfo, ReviewRequest,
    UpdatePullRequest,
};

// === Internal API response types ===

#[derive(serde::Deserialize)]
struct ApiPullRequest {
    node_id: String,
    number: u64,
    body: Option<String>,
    state: String,
    /// GitHub returns state="closed" + merged=true for merged PRs.
    #[serde(default)]
    merged: bool,
    /// The list endpoint has no `merged` field, only `merged_at`.
    merged_at: Option<String>,
    merge_commit_sha: Option<String>,
    draft: bool,
    html_url: String,
    head: ApiBranch,
    base: ApiBranch,
}

#[derive(serde::Deserialize)]
struct ApiBranch {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl ApiPullRequest {
    fn into_pull_request(self) -> PullRequest {
        let state = if self.merged || self.merged_at.is_some() {
            PullRequestState::Merged
        } else if self.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };

        PullRequest {
            id: self.node_id,
            number: self.number,
            permalink: self.html_url,
            state,
            draft: self.draft,
            head_branch: self.head.ref_name,
            base_branch: self.base.ref_name,
            body: self.body,
        }
    }
}

#[derive(serde::Deserialize)]
struct ApiRepository {
    node_id: String,
    name: String,
    owner: ApiOwner,
    default_branch: String,
}

#[derive(serde::Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(serde::Serialize)]
struct GraphQlRequest {
    query: String,
    variables: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct GraphQlResponse {
    errors: Option<Vec<GraphQlError>>,
}

#[derive(serde::Deserialize)]
struct GraphQlError {
    message: String,
}

/// GitHub API client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    /// Stored as `SecretString` for zeroization on drop.
    token: SecretString,
}

impl GitHubClient {
    /// Default GitHub API URL.
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";

    /// Create a client against the public API.
    ///
    /// # Errors
    /// Returns error if no token can be resolved.
    pub fn new(auth: &Auth) -> Result<Self> {
        Self::with_base_url(auth, Self::DEFAULT_API_URL)
    }

    /// Create a client with a custom API URL (GitHub Enterprise).
    ///
    /// # Errors
    /// Returns error if no token can be resolved.
    pub fn with_base_url(auth: &Auth, base_url: impl Into<String>) -> Result<Self> {
        let token = auth.resolve()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("strata-cli"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, self.auth_header())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn patch<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .patch(format!("{}{path}", self.base_url))
            .header(AUTHORIZATION, self.auth_header())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        match status.as_u16() {
            401 => Err(Error::AuthenticationFailed),
            403 if response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v == "0") =>
            {
                Err(Error::RateLimited)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(Error::ApiError { status, message })
            }
        }
    }

    /// Run a GraphQL mutation that returns nothing we need.
    async fn graphql_mutation(&self, query: String, variables: serde_json::Value) -> Result<()> {
        let response: GraphQlResponse = self
            .post("/graphql", &GraphQlRequest { query, variables })
            .await?;

        if let Some(errors) = response.errors {
            let message = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::GraphQl(message));
        }
        Ok(())
    }
}

impl PullRequestApi for GitHubClient {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<RepositoryInfo> {
        let api: ApiRepository = self.get(&format!("/repos/{owner}/{repo}")).await?;
        Ok(RepositoryInfo {
            id: api.node_id,
            owner: api.owner.login,
            name: api.name,
            default_branch: api.default_branch,
        })
    }

    async fn get_pr_by_head_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<PullRequest>> {
        let prs: Vec<ApiPullRequest> = self
            .get(&format!(
                "/repos/{owner}/{repo}/pulls?head={owner}:{branch}&state=all&per_page=1"
            ))
            .await?;
        Ok(prs.into_iter().next().map(ApiPullRequest::into_pull_request))
    }

    async fn get_pr_by_number(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest> {
        let api: ApiPullRequest = self
            .get(&format!("/repos/{owner}/{repo}/pulls/{number}"))
            .await
            .map_err(|e| match e {
                Error::ApiError { status: 404, .. } => Error::PrNotFound(number),
                other => other,
            })?;
        Ok(api.into_pull_request())
    }

    async fn get_merge_commit(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Option<String>> {
        let api: ApiPullRequest = self
            .get(&format!("/repos/{owner}/{repo}/pulls/{number}"))
            .await?;
        if api.merged || api.merged_at.is_some() {
            Ok(api.merge_commit_sha)
        } else {
            Ok(None)
        }
    }

    async fn create_pr(
        &self,
        owner: &str,
        repo: &str,
        pr: CreatePullRequest,
    ) -> Result<PullRequest> {
        let api: ApiPullRequest = self.post(&format!("/repos/{owner}/{repo}/pulls"), &pr).await?;
        Ok(api.into_pull_request())
    }

    async fn update_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        update: UpdatePullRequest,
    ) -> Result<PullRequest> {
        let api: ApiPullRequest = self
            .patch(&format!("/repos/{owner}/{repo}/pulls/{number}"), &update)
            .await?;
        Ok(api.into_pull_request())
    }

    async fn convert_to_draft(&self, pr_id: &str) -> Result<()> {
        self.graphql_mutation(
            "mutation($id: ID!) { convertPullRequestToDraft(input: {pullRequestId: $id}) \
             { pullRequest { id } } }"
                .to_string(),
            serde_json::json!({ "id": pr_id }),
        )
        .await
    }

    async fn mark_ready(&self, pr_id: &str) -> Result<()> {
        self.graphql_mutation(
            "mutation($id: ID!) { markPullRequestReadyForReview(input: {pullRequestId: $id}) \
             { pullRequest { id } } }"
                .to_string(),
            serde_json::json!({ "id": pr_id }),
        )
        .await
    }

    async fn request_reviews(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        request: ReviewRequest,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!("/repos/{owner}/{repo}/pulls/{number}/requested_reviewers"),
                &request,
            )
            .await?;
        Ok(())
    }
}
