//! # strata-git
//!
//! Git adapter for Strata. Object access (rev-parse, merge-base, revwalk,
//! refs, status) goes through git2; history-mutating operations (rebase,
//! cherry-pick, fetch, atomic push) drive the external `git` binary so that
//! conflict state lives where the user's own tools expect it.

mod error;
mod repository;
mod traits;

pub use error::{Error, Result};
pub use git2::Oid;
pub use repository::{
    CherryPickOutcome, ForcePushSpec, Head, RebaseOutcome, RefInfo, RefKind, Repository,
};
pub use traits::GitOps;
