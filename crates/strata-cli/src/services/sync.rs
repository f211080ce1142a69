//! PR reconciliation service.
//!
//! Everything in sync that needs the provider lives here: discovering and
//! refreshing PR linkage, detecting merges, keeping PR bodies' stack blocks
//! and base refs current, and the CODEOWNERS draft cycle around a push.

use std::collections::HashMap;

use anyhow::Result;
use strata_core::sync::PrUpdate;
use strata_core::{push::PrFacts, MetaDb, PrState, PullRequestInfo, Snapshot};
use strata_github::{PullRequestApi, PullRequestState, StackBlock, UpdatePullRequest};

/// Glue between the metadata database and the PR provider.
pub struct PrReconciler<'a, P: PullRequestApi> {
    client: &'a P,
    owner: String,
    repo: String,
}

impl<'a, P: PullRequestApi> PrReconciler<'a, P> {
    /// Create a reconciler for one repository.
    pub const fn new(client: &'a P, owner: String, repo: String) -> Self {
        Self {
            client,
            owner,
            repo,
        }
    }

    /// Refresh the repository record with the provider's view of it (the
    /// opaque id in particular, which `strata init` cannot know).
    pub async fn refresh_repository(&self, db: &MetaDb) -> Result<()> {
        if !db.read_tx().repository().id.is_empty() {
            return Ok(());
        }
        let info = self.client.get_repository(&self.owner, &self.repo).await?;
        let mut tx = db.write_tx();
        tx.set_repository(strata_core::Repository {
            id: info.id,
            owner: info.owner,
            name: info.name,
        });
        tx.commit()?;
        Ok(())
    }

    /// Refresh PR linkage for `targets` and report observed states.
    ///
    /// Branches without a recorded PR are looked up by head ref, so PRs
    /// opened in the web UI get linked too. Merge commits are fetched for
    /// merged PRs; the caller feeds the result into
    /// [`strata_core::sync::SyncEngine::record_pr_updates`].
    pub async fn reconcile(&self, db: &MetaDb, targets: &[String]) -> Result<Vec<PrUpdate>> {
        let snapshot = db.read_tx();
        let mut updates = Vec::new();
        let mut linkage: Vec<(String, PullRequestInfo)> = Vec::new();

        for branch in targets {
            let (record, exists) = snapshot.branch(branch);
            if !exists {
                continue;
            }

            let pr = match &record.pull_request {
                Some(info) => Some(
                    self.client
                        .get_pr_by_number(&self.owner, &self.repo, info.number)
                        .await?,
                ),
                None => {
                    self.client
                        .get_pr_by_head_ref(&self.owner, &self.repo, branch)
                        .await?
                }
            };
            let Some(pr) = pr else {
                continue;
            };

            let state = core_state(pr.state);
            linkage.push((
                branch.clone(),
                PullRequestInfo {
                    id: pr.id.clone(),
                    number: pr.number,
                    permalink: pr.permalink.clone(),
                    state,
                },
            ));

            let merge_commit = if state == PrState::Merged {
                self.client
                    .get_merge_commit(&self.owner, &self.repo, pr.number)
                    .await?
            } else {
                None
            };
            updates.push(PrUpdate {
                branch: branch.clone(),
                state,
                merge_commit,
            });
        }

        // One transaction for all linkage refreshes.
        let mut tx = db.write_tx();
        for (branch, info) in linkage {
            let (mut record, exists) = tx.branch(&branch);
            if exists {
                record.pull_request = Some(info);
                tx.set_branch(record);
            }
        }
        tx.commit()?;

        Ok(updates)
    }

    /// The stack block a branch's PR body should carry right now.
    fn expected_block(snapshot: &Snapshot, trunk: &str, branch: &str) -> Option<StackBlock> {
        let (record, exists) = snapshot.branch(branch);
        if !exists {
            return None;
        }
        let parent_pull = snapshot
            .get(record.parent.name.as_str())
            .and_then(|p| p.pull_request.as_ref())
            .map(|pr| pr.number);
        Some(StackBlock {
            parent: record.parent.name.to_string(),
            parent_head: record.parent.head.clone(),
            parent_pull,
            trunk: snapshot
                .trunk_of(branch)
                .map_or_else(|| trunk.to_string(), ToString::to_string),
        })
    }

    /// Provider-side facts for push classification.
    pub async fn push_facts(
        &self,
        db: &MetaDb,
        trunk: &str,
        targets: &[String],
    ) -> Result<HashMap<String, PrFacts>> {
        let snapshot = db.read_tx();
        let mut facts = HashMap::new();

        for branch in targets {
            let (record, exists) = snapshot.branch(branch);
            let Some(info) = (exists.then_some(()).and(record.pull_request.as_ref())) else {
                continue;
            };
            let pr = self
                .client
                .get_pr_by_number(&self.owner, &self.repo, info.number)
                .await?;

            let expected = Self::expected_block(&snapshot, trunk, branch);
            let body_current = match (&expected, pr.body.as_deref().map(StackBlock::extract)) {
                (Some(expected), Some(Some(actual))) => {
                    *expected == actual && pr.base_branch == expected.parent
                }
                _ => false,
            };

            facts.insert(
                branch.clone(),
                PrFacts {
                    state: core_state(pr.state),
                    body_current,
                },
            );
        }
        Ok(facts)
    }

    /// Rewrite PR bodies (stack block) and base refs after a push.
    ///
    /// Returns the number of PRs updated.
    pub async fn update_pr_metadata(
        &self,
        db: &MetaDb,
        trunk: &str,
        targets: &[String],
    ) -> Result<usize> {
        let snapshot = db.read_tx();
        let mut updated = 0;

        for branch in targets {
            let (record, exists) = snapshot.branch(branch);
            let Some(info) = (exists.then_some(()).and(record.pull_request.as_ref())) else {
                continue;
            };
            let Some(block) = Self::expected_block(&snapshot, trunk, branch) else {
                continue;
            };

            let pr = self
                .client
                .get_pr_by_number(&self.owner, &self.repo, info.number)
                .await?;
            if pr.state != PullRequestState::Open {
                continue;
            }

            let new_body = block.apply(pr.body.as_deref().unwrap_or(""))?;
            let new_base = block.parent.clone();
            if pr.body.as_deref() == Some(new_body.as_str()) && pr.base_branch == new_base {
                continue;
            }

            self.client
                .update_pr(
                    &self.owner,
                    &self.repo,
                    pr.number,
                    UpdatePullRequest {
                        title: None,
                        body: Some(new_body),
                        base: Some(new_base),
                    },
                )
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Convert open non-draft PRs to draft; returns the ids converted, for
    /// [`Self::mark_ready`] afterwards. Used around pushes when the repo
    /// has a CODEOWNERS file, to suppress review-request spam from
    /// transient rebases.
    pub async fn convert_to_draft(&self, db: &MetaDb, targets: &[String]) -> Result<Vec<String>> {
        let snapshot = db.read_tx();
        let mut converted = Vec::new();

        for branch in targets {
            let (record, exists) = snapshot.branch(branch);
            let Some(info) = (exists.then_some(()).and(record.pull_request.as_ref())) else {
                continue;
            };
            let pr = self
                .client
                .get_pr_by_number(&self.owner, &self.repo, info.number)
                .await?;
            if pr.state == PullRequestState::Open && !pr.draft {
                self.client.convert_to_draft(&pr.id).await?;
                converted.push(pr.id);
            }
        }
        Ok(converted)
    }

    /// Undo [`Self::convert_to_draft`].
    pub async fn mark_ready(&self, pr_ids: &[String]) -> Result<()> {
        for id in pr_ids {
            self.client.mark_ready(id).await?;
        }
        Ok(())
    }
}

const fn core_state(state: PullRequestState) -> PrState {
    match state {
        PullRequestState::Open => PrState::Open,
        PullRequestState::Closed => PrState::Closed,
        PullRequestState::Merged => PrState::Merged,
    }
}
