//! Authentication handling for the GitHub API.

use std::process::Command;

use secrecy::SecretString;

use crate::error::{Error, Result};

/// Environment variables consulted, in order.
const TOKEN_VARS: [&str; 2] = ["STRATA_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Authentication method for the GitHub API.
#[derive(Debug, Clone)]
pub enum Auth {
    /// Use the token from the gh CLI.
    GhCli,

    /// Use the token from an environment variable.
    EnvVar(String),

    /// Use a specific token.
    Token(SecretString),
}

impl Auth {
    /// Pick the first available method: `STRATA_GITHUB_TOKEN`,
    /// `GITHUB_TOKEN`, then the gh CLI.
    #[must_use]
    pub fn auto() -> Self {
        TOKEN_VARS
            .iter()
            .find(|var| std::env::var(var).is_ok())
            .map_or(Self::GhCli, |var| Self::EnvVar((*var).to_string()))
    }

    /// Resolve to a token.
    ///
    /// # Errors
    /// Returns [`Error::NoToken`] if no token can be obtained.
    pub fn resolve(&self) -> Result<SecretString> {
        match self {
            Self::GhCli => gh_cli_token(),
            Self::EnvVar(var) => std::env::var(var)
                .map(SecretString::from)
                .map_err(|_| Error::NoToken),
            Self::Token(token) => Ok(token.clone()),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::auto()
    }
}

fn gh_cli_token() -> Result<SecretString> {
    let output = Command::new("gh").args(["auth", "token"]).output()?;
    if !output.status.success() {
        return Err(Error::NoToken);
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::NoToken);
    }
    Ok(SecretString::from(token))
}
