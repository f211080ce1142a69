//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};

pub mod adopt;
pub mod branch;
pub mod completions;
pub mod init;
pub mod reorder;
pub mod restack;
pub mod status;
pub mod sync;
pub mod tidy;
mod utils;

pub use utils::Context;

/// Strata - stacked branches and their pull requests, without the manual
/// rebases.
///
/// Strata records each branch's parent and the parent's tip at the last
/// restack, then drives git so every branch always carries exactly the
/// commits it introduced, replayed onto its parent's current tip.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output as JSON (for tooling integration). Supported by: status.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress informational output.
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize strata in the current repository.
    Init,

    /// Create a new managed branch stacked on the current branch.
    #[command(alias = "b")]
    Branch {
        /// Name of the new branch.
        name: String,

        /// Parent branch (defaults to the current branch).
        #[arg(long, short)]
        parent: Option<String>,
    },

    /// Bring branches created with plain git under strata management.
    ///
    /// Infers each branch's parent from the commit graph; branches whose
    /// shape cannot be inferred (merge commits, shared tips) are reported
    /// and left alone.
    Adopt {
        /// Branches to adopt (default: every unmanaged local branch).
        branches: Vec<String>,

        /// Show what would be adopted without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Rebase every branch of the current stack onto its parent's tip.
    #[command(alias = "r")]
    Restack {
        /// Resume after resolving a conflict.
        #[arg(long, name = "continue")]
        continue_: bool,

        /// Skip the conflicting commit and carry on.
        #[arg(long, conflicts_with = "continue")]
        skip: bool,

        /// Abort and restore the original HEAD.
        #[arg(long, conflicts_with_all = ["continue", "skip"])]
        abort: bool,

        /// Also move stack roots onto the current trunk tip.
        #[arg(long)]
        rebase_to_trunk: bool,
    },

    /// Fetch, fold in merged PRs, restack, and optionally prune and push.
    #[command(alias = "sy")]
    Sync {
        /// Sync every managed stack, not just the current one.
        #[arg(long)]
        all: bool,

        /// Resume after resolving a conflict.
        #[arg(long, name = "continue")]
        continue_: bool,

        /// Skip the conflicting commit and carry on.
        #[arg(long, conflicts_with = "continue")]
        skip: bool,

        /// Abort and restore the original HEAD.
        #[arg(long, conflicts_with_all = ["continue", "skip"])]
        abort: bool,

        /// Push restacked branches: yes, no, or ask.
        #[arg(long, value_enum, default_value = "ask")]
        push: Choice,

        /// Delete merged branches: yes, no, or ask.
        #[arg(long, value_enum, default_value = "ask")]
        prune: Choice,

        /// Also move stack roots onto the current trunk tip.
        #[arg(long)]
        rebase_to_trunk: bool,

        /// Skip the initial fetch (offline).
        #[arg(long)]
        no_fetch: bool,
    },

    /// Rewrite the current stack from an editable plan.
    ///
    /// Opens the stack as a script of stack-branch/pick/delete-branch
    /// commands; the edited plan is replayed commit by commit.
    Reorder {
        /// Resume after resolving a cherry-pick conflict.
        #[arg(long, name = "continue")]
        continue_: bool,

        /// Abort and restore the original HEAD.
        #[arg(long, conflicts_with = "continue")]
        abort: bool,
    },

    /// Drop database records whose branches no longer exist, re-linking
    /// their children.
    Tidy,

    /// Show the managed stacks as a tree.
    #[command(alias = "st")]
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Three-way flag for prompts that can be pre-answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Choice {
    /// Do it without asking.
    Yes,
    /// Don't do it.
    No,
    /// Prompt interactively.
    Ask,
}

impl Choice {
    /// Resolve to a decision, prompting when interactive.
    #[must_use]
    pub fn decide(self, prompt: &str) -> bool {
        match self {
            Self::Yes => true,
            Self::No => false,
            Self::Ask => inquire::Confirm::new(prompt)
                .with_default(true)
                .prompt()
                .unwrap_or(false),
        }
    }
}
