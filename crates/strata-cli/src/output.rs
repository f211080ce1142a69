//! Terminal output formatting utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;

static QUIET: AtomicBool = AtomicBool::new(false);

/// Suppress non-error output.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message.
pub fn success(msg: &str) {
    if !quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message.
pub fn warn(msg: &str) {
    if !quiet() {
        println!("{} {}", "!".yellow(), msg);
    }
}

/// Print an info message.
pub fn info(msg: &str) {
    if !quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print an indented list item.
pub fn item(msg: &str) {
    if !quiet() {
        println!("  {} {}", "·".dimmed(), msg);
    }
}

/// Print the exact invocations that resume or cancel a suspended operation.
pub fn resume_instructions(op: &str, can_skip: bool) {
    if quiet() {
        return;
    }
    println!();
    info(&format!(
        "Resolve the conflicts, `git add` the files, then run: strata {op} --continue"
    ));
    if can_skip {
        info(&format!(
            "Skip the conflicting commit with: strata {op} --skip"
        ));
    }
    info(&format!("Or abort with: strata {op} --abort"));
}

/// A branch name with an optional current-branch marker.
#[must_use]
pub fn branch_name(name: &str, is_current: bool) -> String {
    if is_current {
        format!("{} {}", "▶".cyan(), name.cyan().bold())
    } else {
        format!("  {name}")
    }
}

/// Format a PR reference.
#[must_use]
pub fn pr_ref(number: Option<u64>) -> String {
    number.map_or_else(String::new, |n| format!("#{n}").dimmed().to_string())
}
