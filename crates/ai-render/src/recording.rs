// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A scripted, recording renderer for loop-level tests.
//!
//! Every operation appends a line to the event log; prompts, confirms,
//! review outcomes and hotkey polls replay scripted answers.  An `Applied`
//! review writes the file for real so filesystem-observing tests work.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use crate::{HotkeyEvent, Renderer, ReviewOutcome};

#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<String>>,
    follow_ups: Mutex<VecDeque<Option<String>>>,
    text_answers: Mutex<VecDeque<Option<String>>>,
    confirm_answers: Mutex<VecDeque<bool>>,
    review_outcomes: Mutex<VecDeque<ReviewOutcome>>,
    hotkey_script: Mutex<VecDeque<Option<HotkeyEvent>>>,
    completion_messages: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    /// Everything that happened, in call order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_matching(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    /// Queue the answer for the next `prompt_follow_up` (None = EOF).
    pub fn push_follow_up(&self, answer: Option<&str>) {
        self.follow_ups
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
    }

    pub fn push_text_answer(&self, answer: Option<&str>) {
        self.text_answers
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
    }

    pub fn push_confirm(&self, answer: bool) {
        self.confirm_answers.lock().unwrap().push_back(answer);
    }

    /// Queue the outcome of the next `review_file_update`; the default when
    /// the script runs dry is `Applied`.
    pub fn push_review_outcome(&self, outcome: ReviewOutcome) {
        self.review_outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queue hotkey polls.  Each `poll_hotkey_event` pops one entry; `None`
    /// entries mean "no event pending at that poll".
    pub fn push_hotkey(&self, event: Option<HotkeyEvent>) {
        self.hotkey_script.lock().unwrap().push_back(event);
    }

    pub fn push_completion_message(&self, text: &str) {
        self.completion_messages.lock().unwrap().push(text.into());
    }
}

impl Renderer for RecordingRenderer {
    fn display_info(&self, text: &str) {
        self.record(format!("info: {text}"));
    }

    fn display_error(&self, text: &str) {
        self.record(format!("error: {text}"));
    }

    fn display_user_prompt(&self, text: &str) {
        self.record(format!("user_prompt: {text}"));
    }

    fn display_assistant_message(&self, text: &str) {
        self.record(format!("assistant: {text}"));
    }

    fn display_shell_output(&self, text: &str) {
        self.record(format!("shell: {text}"));
    }

    fn display_plan_update(&self, plan: &str, explanation: Option<&str>) {
        self.record(format!(
            "plan: {plan}{}",
            explanation.map(|e| format!(" ({e})")).unwrap_or_default()
        ));
    }

    fn display_reasoning(&self, text: &str) {
        self.record(format!("reasoning: {text}"));
    }

    fn start_reasoning(&self, id: &str) {
        self.record(format!("reasoning_start: {id}"));
    }

    fn update_reasoning(&self, id: &str, delta: &str) {
        self.record(format!("reasoning_delta: {id}: {delta}"));
    }

    fn finish_reasoning(&self, id: &str, final_text: Option<&str>) {
        self.record(format!(
            "reasoning_done: {id}: {}",
            final_text.unwrap_or_default()
        ));
    }

    fn start_assistant_stream(&self, id: &str) {
        self.record(format!("stream_start: {id}"));
    }

    fn update_assistant_stream(&self, id: &str, delta: &str) {
        self.record(format!("stream_delta: {id}: {delta}"));
    }

    fn finish_assistant_stream(&self, id: &str, final_text: Option<&str>) {
        self.record(format!(
            "stream_done: {id}: {}",
            final_text.unwrap_or_default()
        ));
    }

    fn review_file_update(
        &self,
        target_path: &Path,
        display_path: &Path,
        old_text: &str,
        new_text: &str,
        auto_apply: bool,
    ) -> ReviewOutcome {
        self.record(format!(
            "review: {} auto_apply={auto_apply} old_len={} new_len={}",
            display_path.display(),
            old_text.len(),
            new_text.len()
        ));
        let outcome = self
            .review_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReviewOutcome::Applied);
        if outcome == ReviewOutcome::Applied {
            if let Some(parent) = target_path.parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }
            if let Err(e) = std::fs::write(target_path, new_text) {
                return ReviewOutcome::error(format!(
                    "failed to write {}: {e}",
                    display_path.display()
                ));
            }
        }
        outcome
    }

    fn prompt_text(&self, prompt: &str) -> Option<String> {
        self.record(format!("prompt_text: {prompt}"));
        self.text_answers.lock().unwrap().pop_front().flatten()
    }

    fn prompt_follow_up(&self) -> Option<String> {
        self.record("prompt_follow_up");
        self.follow_ups.lock().unwrap().pop_front().flatten()
    }

    fn prompt_confirm(&self, prompt: &str, default_no: bool) -> bool {
        self.record(format!("prompt_confirm: {prompt}"));
        self.confirm_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(!default_no)
    }

    fn start_loader(&self) {
        self.record("loader_start");
    }

    fn stop_loader(&self) {
        self.record("loader_stop");
    }

    fn start_hotkey_listener(&self) {
        self.record("hotkeys_start");
    }

    fn stop_hotkey_listener(&self) {
        self.record("hotkeys_stop");
    }

    fn poll_hotkey_event(&self) -> Option<HotkeyEvent> {
        self.hotkey_script.lock().unwrap().pop_front().flatten()
    }

    fn consume_completion_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.completion_messages.lock().unwrap())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_display_calls_in_order() {
        let r = RecordingRenderer::new();
        r.display_info("one");
        r.display_assistant_message("two");
        assert_eq!(r.events(), vec!["info: one", "assistant: two"]);
    }

    #[test]
    fn follow_up_script_replays_then_eof() {
        let r = RecordingRenderer::new();
        r.push_follow_up(Some("next"));
        r.push_follow_up(None);
        assert_eq!(r.prompt_follow_up().as_deref(), Some("next"));
        assert!(r.prompt_follow_up().is_none());
        assert!(r.prompt_follow_up().is_none(), "dry script means EOF");
    }

    #[test]
    fn applied_review_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let r = RecordingRenderer::new();
        let outcome = r.review_file_update(&target, Path::new("out.txt"), "", "new\n", false);
        assert_eq!(outcome, ReviewOutcome::Applied);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new\n");
    }

    #[test]
    fn scripted_rejection_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "old\n").unwrap();
        let r = RecordingRenderer::new();
        r.push_review_outcome(ReviewOutcome::UserRejected);
        let outcome = r.review_file_update(&target, Path::new("out.txt"), "old\n", "new\n", false);
        assert_eq!(outcome, ReviewOutcome::UserRejected);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old\n");
    }

    #[test]
    fn hotkey_script_pops_one_per_poll() {
        let r = RecordingRenderer::new();
        r.push_hotkey(None);
        r.push_hotkey(Some(HotkeyEvent::Retry));
        assert!(r.poll_hotkey_event().is_none());
        assert_eq!(r.poll_hotkey_event(), Some(HotkeyEvent::Retry));
        assert!(r.poll_hotkey_event().is_none());
    }

    #[test]
    fn completion_messages_drain_once() {
        let r = RecordingRenderer::new();
        r.push_completion_message("done with editor");
        assert_eq!(r.consume_completion_messages(), vec!["done with editor"]);
        assert!(r.consume_completion_messages().is_empty());
    }
}
