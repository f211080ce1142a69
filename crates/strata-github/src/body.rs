//! The stack metadata block embedded in PR bodies.
//!
//! Every PR in a stack carries a machine-readable block naming its parent,
//! the parent head snapshot, the parent's PR, and the trunk. The block
//! round-trips: strata can recover stack structure from the remote when the
//! local database is gone.
//!
//! ```text
//! <!-- strata:begin -->
//! Part of a stack on `main`: this change depends on #41 (`auth-api`).
//! <!-- strata:meta {"parent":"auth-api","parent_head":"8c4f…","parent_pull":41,"trunk":"main"} -->
//! <!-- strata:end -->
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

const BEGIN: &str = "<!-- strata:begin -->";
const END: &str = "<!-- strata:end -->";
const META_PREFIX: &str = "<!-- strata:meta ";
const META_SUFFIX: &str = " -->";

/// The structured stack metadata carried in a PR body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBlock {
    /// Parent branch name.
    pub parent: String,

    /// Parent head snapshot at the time the PR body was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_head: Option<String>,

    /// Parent's PR number; absent when the parent is the trunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_pull: Option<u64>,

    /// The trunk the stack rests on.
    pub trunk: String,
}

impl StackBlock {
    /// Render the full body block, human-readable line included.
    ///
    /// # Errors
    /// Returns serialization errors.
    pub fn render(&self) -> Result<String> {
        let meta = serde_json::to_string(self)?;
        let description = match self.parent_pull {
            Some(number) => format!(
                "Part of a stack on `{}`: this change depends on #{} (`{}`).",
                self.trunk, number, self.parent
            ),
            None => format!("Part of a stack on `{}`.", self.trunk),
        };
        Ok(format!(
            "{BEGIN}\n{description}\n{META_PREFIX}{meta}{META_SUFFIX}\n{END}"
        ))
    }

    /// Recover the block from a PR body, if one is embedded.
    #[must_use]
    pub fn extract(body: &str) -> Option<Self> {
        let start = body.find(META_PREFIX)? + META_PREFIX.len();
        let rest = &body[start..];
        let end = rest.find(META_SUFFIX)?;
        serde_json::from_str(&rest[..end]).ok()
    }

    /// Replace the block in `body`, or append one if none exists. The
    /// user's own prose is left untouched.
    ///
    /// # Errors
    /// Returns serialization errors.
    pub fn apply(&self, body: &str) -> Result<String> {
        let rendered = self.render()?;

        if let (Some(begin), Some(end)) = (body.find(BEGIN), body.find(END)) {
            if begin < end {
                let mut out = String::with_capacity(body.len() + rendered.len());
                out.push_str(&body[..begin]);
                out.push_str(&rendered);
                out.push_str(&body[end + END.len()..]);
                return Ok(out);
            }
        }

        if body.trim().is_empty() {
            return Ok(rendered);
        }
        Ok(format!("{}\n\n{rendered}", body.trim_end()))
    }
}
