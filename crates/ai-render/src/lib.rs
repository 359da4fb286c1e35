// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The renderer contract: everything the agent loop needs from a terminal
//! (or a test double) — streamed output, diff review, prompts, hotkeys.

mod recording;
mod terminal;

use std::path::Path;

pub use recording::RecordingRenderer;
pub use terminal::TerminalRenderer;

/// Keystroke events produced by the background watcher during streaming.
///
/// `Interrupt` carries Ctrl-C through the same queue so the loop can flush
/// its buffers and exit with code 130.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Quit,
    Retry,
    Interrupt,
}

/// Result of a file-update review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Applied,
    NoChange,
    UserRejected,
    /// The proposed content was empty; the caller deletes the file.
    DeleteRequested,
    SkippedOutOfScope,
    /// Carries a full `error: …` message.
    Error(String),
}

impl ReviewOutcome {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ReviewOutcome::Error(format!("error: {message}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReviewOutcome::Error(_))
    }

    /// The status string recorded in tool results.
    pub fn as_result_text(&self) -> String {
        match self {
            ReviewOutcome::Applied => "applied".into(),
            ReviewOutcome::NoChange => "no_change".into(),
            ReviewOutcome::UserRejected => "user_rejected".into(),
            ReviewOutcome::DeleteRequested => "delete_requested".into(),
            ReviewOutcome::SkippedOutOfScope => "skipped_out_of_scope".into(),
            ReviewOutcome::Error(message) => message.clone(),
        }
    }
}

/// Abstract sink for streamed model output and source of user input.
///
/// All methods take `&self`; implementations use interior mutability so the
/// renderer can be shared between the loop and the tool runtime.
pub trait Renderer: Send + Sync {
    fn display_info(&self, text: &str);
    fn display_error(&self, text: &str);
    fn display_user_prompt(&self, text: &str);
    fn display_assistant_message(&self, text: &str);
    fn display_shell_output(&self, text: &str);
    fn display_plan_update(&self, plan: &str, explanation: Option<&str>);
    fn display_reasoning(&self, text: &str);

    fn start_reasoning(&self, id: &str);
    fn update_reasoning(&self, id: &str, delta: &str);
    fn finish_reasoning(&self, id: &str, final_text: Option<&str>);

    fn start_assistant_stream(&self, id: &str);
    fn update_assistant_stream(&self, id: &str, delta: &str);
    fn finish_assistant_stream(&self, id: &str, final_text: Option<&str>);

    /// Show the proposed change and decide its fate.  `auto_apply` skips the
    /// confirmation prompt (the diff is still shown).
    fn review_file_update(
        &self,
        target_path: &Path,
        display_path: &Path,
        old_text: &str,
        new_text: &str,
        auto_apply: bool,
    ) -> ReviewOutcome;

    fn prompt_text(&self, prompt: &str) -> Option<String>;
    fn prompt_follow_up(&self) -> Option<String>;
    fn prompt_confirm(&self, prompt: &str, default_no: bool) -> bool;

    fn start_loader(&self);
    fn stop_loader(&self);

    fn start_hotkey_listener(&self);
    fn stop_hotkey_listener(&self);
    fn poll_hotkey_event(&self) -> Option<HotkeyEvent>;

    /// Messages composed out-of-band (e.g. in the editor) to be injected as
    /// user messages on the next turn.
    fn consume_completion_messages(&self) -> Vec<String>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_result_texts_match_the_tool_contract() {
        assert_eq!(ReviewOutcome::Applied.as_result_text(), "applied");
        assert_eq!(ReviewOutcome::NoChange.as_result_text(), "no_change");
        assert_eq!(ReviewOutcome::UserRejected.as_result_text(), "user_rejected");
        assert_eq!(
            ReviewOutcome::DeleteRequested.as_result_text(),
            "delete_requested"
        );
        assert_eq!(
            ReviewOutcome::SkippedOutOfScope.as_result_text(),
            "skipped_out_of_scope"
        );
    }

    #[test]
    fn error_outcome_carries_prefixed_message() {
        let outcome = ReviewOutcome::error("failed to write x: denied");
        assert!(outcome.is_error());
        assert_eq!(
            outcome.as_result_text(),
            "error: failed to write x: denied"
        );
    }
}
