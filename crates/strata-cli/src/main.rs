//! Strata CLI - stacked branches and their pull requests, without the
//! manual rebases.

use clap::Parser;

mod commands;
mod output;
mod services;

use commands::{Cli, Commands};

fn main() {
    // Respect NO_COLOR environment variable (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();
    output::set_quiet(cli.quiet);
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Branch { name, parent } => commands::branch::run(&name, parent.as_deref()),
        Commands::Adopt {
            branches,
            dry_run,
            yes,
        } => commands::adopt::run(&branches, dry_run, yes),
        Commands::Restack {
            continue_,
            skip,
            abort,
            rebase_to_trunk,
        } => commands::restack::run(continue_, skip, abort, rebase_to_trunk),
        Commands::Sync {
            all,
            continue_,
            skip,
            abort,
            push,
            prune,
            rebase_to_trunk,
            no_fetch,
        } => commands::sync::run(
            all,
            continue_,
            skip,
            abort,
            push,
            prune,
            rebase_to_trunk,
            no_fetch,
        ),
        Commands::Reorder { continue_, abort } => commands::reorder::run(continue_, abort),
        Commands::Tidy => commands::tidy::run(),
        Commands::Status => commands::status::run(json),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}
