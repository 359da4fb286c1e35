// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::runtime::ToolRuntime;

/// What a tool hands back to the loop: the text appended as the tool result
/// and whether the workspace may have changed underneath the context
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReply {
    pub text: String,
    pub mutated: bool,
}

impl ToolReply {
    /// A reply that did not touch the filesystem.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mutated: false,
        }
    }

    pub fn mutating(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mutated: true,
        }
    }
}

/// Trait every built-in tool implements.
///
/// Failures are reported as `error: …` reply text, never as panics or
/// propagated errors; the model reads them and may correct itself.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the argument object.
    fn parameters_schema(&self) -> Value;
    /// Gated tools run only after the user has spoken the unlock phrase.
    /// The check itself lives in the registry so new tools inherit it.
    fn requires_unlock(&self) -> bool {
        false
    }
    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_reply_is_not_mutating() {
        let reply = ToolReply::text("ok");
        assert_eq!(reply.text, "ok");
        assert!(!reply.mutated);
    }

    #[test]
    fn mutating_reply_sets_the_flag() {
        assert!(ToolReply::mutating("applied").mutated);
    }
}
