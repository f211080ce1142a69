//! Services combining the core engines with the PR provider.

pub mod sync;
