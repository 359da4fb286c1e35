// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use ai_config::{Config, DEFAULT_DOG_WHISTLE};
use ai_context::{collect_context, format_context_for_prompt, DEFAULT_READ_LIMIT, MAX_READ_BYTES};
use ai_model::{
    FinalResponse, Item, OutputItem, ReasoningParams, ResponsesApi, ResponsesRequest,
    StreamEvent, ToolDefinition,
};
use ai_render::{HotkeyEvent, Renderer, ReviewOutcome};
use ai_sandbox::{format_command_result, run_sandboxed_bash};
use ai_store::ConversationStore;
use ai_tools::{
    apply_file_update, default_registry, delete_path_via_shell, instruction_implies_write,
    PlanState, ToolRegistry, ToolRuntime, JFDI_REQUIRED_MESSAGE,
};

use crate::detect::{detect_generated_files, strip_code_fence};
use crate::settings::{resolve_model, EngineSettings};

/// Follow-up sentinel that resets the conversation in place.
pub const NEW_CONVERSATION_TOKEN: &str = "<<NEW_CONVERSATION>>";

const FOLLOW_UP_REMINDER: &str =
    "\n\nReminder: use the `write` tool (or `write_file`) with full file contents when files must change.";

const NO_WRITE_REMINDER: &str = "It appears no files changed. Please call the `write` tool \
     (alias: `write_file`) with the full contents so the file can be created.";

fn claims_write_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(created|saved|written|added|generated)\b").expect("valid pattern")
    })
}

/// What ended a streaming window early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelAction {
    Quit,
    Retry,
    Interrupt,
}

/// Tool-visible state shared across every dispatch of one conversation:
/// the plan and the set of already-approved write targets.
#[derive(Default)]
pub(crate) struct ToolSession {
    pub(crate) plan: Arc<Mutex<PlanState>>,
    pub(crate) seen_writes: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Everything a single streaming window produced.
#[derive(Default)]
pub(crate) struct TurnOutcome {
    pub(crate) cancel: Option<CancelAction>,
    pub(crate) response: Option<FinalResponse>,
    pub(crate) error: Option<String>,
    /// Final text per provider item id, for reuse instead of re-printing.
    pub(crate) stream_cache: HashMap<String, String>,
    pub(crate) streamed_keys: HashSet<String>,
}

/// The multi-turn conversation engine.
pub struct Engine {
    renderer: Arc<dyn Renderer>,
    client: Arc<dyn ResponsesApi>,
    config: Config,
    settings: EngineSettings,
    registry: ToolRegistry,
    store: Option<ConversationStore>,
    workspace_root: PathBuf,
    dog_whistle: String,
    pub jfdi_enabled: bool,
}

impl Engine {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        client: Arc<dyn ResponsesApi>,
        config: Config,
        settings: EngineSettings,
    ) -> Self {
        let dog_whistle = {
            let configured = config.dog_whistle.trim();
            if configured.is_empty() {
                DEFAULT_DOG_WHISTLE.to_string()
            } else {
                configured.to_string()
            }
        };
        let workspace_root = std::env::current_dir()
            .and_then(|d| d.canonicalize())
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            renderer,
            client,
            config,
            settings,
            registry: default_registry(),
            store: None,
            workspace_root,
            dog_whistle,
            jfdi_enabled: false,
        }
    }

    /// Override the workspace root (tests and explicit-scope callers).
    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = root.canonicalize().unwrap_or(root);
        self
    }

    /// Attach the per-workspace transcript cache.
    pub fn with_store(mut self, store: ConversationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dog_whistle(&self) -> &str {
        &self.dog_whistle
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub(crate) fn renderer(&self) -> &dyn Renderer {
        &*self.renderer
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// `(max_bytes, read_limit)` for context collection.
    pub(crate) fn context_limits(&self) -> (usize, usize) {
        (
            self.config
                .context_settings
                .max_bytes
                .unwrap_or(MAX_READ_BYTES),
            self.config
                .context_settings
                .read_limit
                .unwrap_or(DEFAULT_READ_LIMIT),
        )
    }

    fn matches_dog_whistle(&self, text: &str) -> bool {
        text.trim().eq_ignore_ascii_case(&self.dog_whistle)
    }

    fn mutation_blocked_message(&self) -> String {
        format!(
            "I need you to say `{}` before I can modify files or run shell commands.",
            self.dog_whistle
        )
    }

    /// Display the unlock reminder and append it as an assistant message,
    /// unless the transcript already ends with that exact message.
    fn inform_mutation_blocked(&self, items: &mut Vec<Item>) {
        let message = self.mutation_blocked_message();
        self.renderer.display_assistant_message(&message);
        let already_last = items
            .last()
            .and_then(|item| item.as_assistant_text())
            .is_some_and(|text| text == message);
        if !already_last {
            items.push(Item::assistant(message));
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .schemas()
            .into_iter()
            .map(|s| ToolDefinition::function(s.name, s.description, s.parameters))
            .collect()
    }

    fn reasoning_params(&self) -> Option<ReasoningParams> {
        self.settings
            .show_reasoning
            .then(|| ReasoningParams::with_effort(self.settings.reasoning_effort.as_str()))
    }

    pub(crate) fn build_tool_runtime(
        &self,
        default_root: &Path,
        session: &ToolSession,
        latest_instruction: &str,
    ) -> ToolRuntime {
        let mut rt = ToolRuntime::new(
            Arc::clone(&self.renderer),
            self.workspace_root.clone(),
            default_root.to_path_buf(),
        );
        rt.plan = Arc::clone(&session.plan);
        rt.seen_writes = Arc::clone(&session.seen_writes);
        rt.latest_instruction = latest_instruction.to_string();
        rt.jfdi_enabled = self.jfdi_enabled;
        rt
    }

    fn system_prompt(&self, scope_label: &str) -> String {
        let scope_sentence = if scope_label == "repository root" {
            "Focus on the entire repository.".to_string()
        } else {
            format!("Scope: {scope_label}.")
        };
        let dog = &self.dog_whistle;
        format!(
            "You are a terminal coding assistant operating locally. You can call tools to read \
             files, write files, update plans, or execute sandboxed shell commands. IMPORTANT: \
             when you need to create or modify files you MUST call the `write` tool (alias: \
             `write_file`) with the full content (not apply_patch). Do not use shell globbing to \
             list files; prefer the dedicated `glob` tool for pattern-based listings, use \
             `search_content` instead of shell grep for searching text, and manage structured \
             task plans with `plan_update` (fallback to `update_plan` for quick notes).\n\
             Treat the user command `{dog}` as \"just fucking do it\"—the user believes you have \
             enough context, the plan looks good, and it is time to execute without further \
             hesitations.\n\
             File edits, deletions, renames, and shell commands are blocked until the user types \
             `{dog}` in this session. Purely read-only actions (reading files, globbing, \
             searching) are always allowed. If you hit the safeguard, tell the user exactly \
             which phrase unlocks execution.\n\
             Do not claim success unless the tool call succeeds. Maintain an explicit plan when \
             useful using `update_plan`. Always cite relevant files.\n\
             {scope_sentence}"
        )
    }

    fn resolve_scope(&self, scope: Option<&str>) -> Result<(PathBuf, String), ()> {
        let Some(scope) = scope.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok((self.workspace_root.clone(), "repository root".into()));
        };

        let expanded = shellexpand::tilde(scope).into_owned();
        let candidate = PathBuf::from(&expanded);
        let candidate = if candidate.is_absolute() {
            candidate
        } else {
            self.workspace_root.join(candidate)
        };
        let candidate = candidate.canonicalize().unwrap_or(candidate);

        let Ok(relative) = candidate.strip_prefix(&self.workspace_root) else {
            self.renderer
                .display_error("Scope path must be inside the repository");
            return Err(());
        };
        if !candidate.exists() {
            self.renderer
                .display_error(&format!("Scope path {} does not exist.", candidate.display()));
            return Err(());
        }

        if candidate.is_dir() {
            let label = if relative.as_os_str().is_empty() {
                ".".to_string()
            } else {
                relative.to_string_lossy().into_owned()
            };
            Ok((candidate.clone(), label))
        } else {
            let label = relative.to_string_lossy().into_owned();
            let parent = candidate
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.workspace_root.clone());
            Ok((parent, label))
        }
    }

    fn collect_prompt_context(&self, scope_root: &Path, include_listing: bool) -> String {
        let (max_bytes, read_limit) = self.context_limits();
        let collected = collect_context(scope_root, max_bytes, read_limit, include_listing, None);
        format_context_for_prompt(&collected)
    }

    fn persist(&self, items: &[Item], plan: &Arc<Mutex<PlanState>>) {
        if let Some(store) = &self.store {
            let plan = plan.lock().unwrap();
            if let Err(e) = store.save(items, Some(&plan)) {
                debug!(error = %e, "failed to persist conversation");
            }
        }
    }

    /// Run one streaming window: render deltas, watch hotkeys, collect the
    /// final response.  Cancellation drops the stream mid-flight.
    pub(crate) async fn stream_turn(&self, request: &ResponsesRequest) -> TurnOutcome {
        let mut outcome = TurnOutcome::default();
        let mut reasoning_buffers: HashMap<String, String> = HashMap::new();
        let mut assistant_buffers: HashMap<String, String> = HashMap::new();
        let show_reasoning = self.settings.show_reasoning;

        self.renderer.start_hotkey_listener();
        let mut loader_started = false;
        if !show_reasoning {
            self.renderer.start_loader();
            loader_started = true;
        }

        match self.client.stream(request).await {
            Err(e) => outcome.error = Some(format!("{e:#}")),
            Ok(mut stream) => {
                'events: while let Some(event) = stream.next().await {
                    if let Some(hotkey) = self.renderer.poll_hotkey_event() {
                        outcome.cancel = Some(match hotkey {
                            HotkeyEvent::Quit => CancelAction::Quit,
                            HotkeyEvent::Retry => CancelAction::Retry,
                            HotkeyEvent::Interrupt => CancelAction::Interrupt,
                        });
                        break 'events;
                    }

                    match event {
                        Err(e) => {
                            outcome.error = Some(format!("{e:#}"));
                            break 'events;
                        }
                        Ok(StreamEvent::ReasoningDelta { key, delta }) => {
                            if !show_reasoning {
                                continue;
                            }
                            if !reasoning_buffers.contains_key(&key) {
                                reasoning_buffers.insert(key.clone(), String::new());
                                self.renderer.start_reasoning(&key);
                            }
                            reasoning_buffers
                                .get_mut(&key)
                                .expect("buffer just inserted")
                                .push_str(&delta);
                            self.renderer.update_reasoning(&key, &delta);
                        }
                        Ok(StreamEvent::ReasoningDone { key, text }) => {
                            if !show_reasoning {
                                continue;
                            }
                            let buffered = reasoning_buffers.remove(&key).unwrap_or_default();
                            let final_text = if text.is_empty() { buffered } else { text };
                            let trimmed = final_text.trim();
                            self.renderer
                                .finish_reasoning(&key, (!trimmed.is_empty()).then_some(trimmed));
                        }
                        Ok(StreamEvent::OutputTextDelta { key, delta }) => {
                            if loader_started {
                                self.renderer.stop_loader();
                                loader_started = false;
                            }
                            if !assistant_buffers.contains_key(&key) {
                                assistant_buffers.insert(key.clone(), String::new());
                                self.renderer.start_assistant_stream(&key);
                            }
                            assistant_buffers
                                .get_mut(&key)
                                .expect("buffer just inserted")
                                .push_str(&delta);
                            self.renderer.update_assistant_stream(&key, &delta);
                        }
                        Ok(StreamEvent::OutputTextDone { key, item_id, text }) => {
                            let buffered = assistant_buffers.remove(&key).unwrap_or_default();
                            let stream_text = if text.is_empty() { buffered } else { text };
                            self.renderer.finish_assistant_stream(
                                &key,
                                (!stream_text.is_empty()).then_some(stream_text.as_str()),
                            );
                            let cache_key = item_id.unwrap_or_else(|| key.clone());
                            if !stream_text.is_empty() {
                                outcome.stream_cache.insert(cache_key.clone(), stream_text);
                            }
                            outcome.streamed_keys.insert(cache_key);
                        }
                        Ok(StreamEvent::Completed { response }) => {
                            outcome.response = Some(response);
                        }
                        Ok(StreamEvent::Error { message }) => {
                            outcome.error = Some(message);
                            break 'events;
                        }
                    }
                }
            }
        }

        // A cancelled stream may leave queued keystrokes; one cancellation
        // action per window, the rest are dropped.
        if outcome.cancel.is_some() {
            while self.renderer.poll_hotkey_event().is_some() {}
        }

        // Flush reasoning that never saw its .done event.
        for (key, text) in reasoning_buffers.drain() {
            let trimmed = text.trim();
            self.renderer
                .finish_reasoning(&key, (!trimmed.is_empty()).then_some(trimmed));
        }

        if loader_started {
            self.renderer.stop_loader();
        }
        self.renderer.stop_hotkey_listener();
        outcome
    }

    /// The multi-turn conversation loop.  Returns the process exit code.
    pub async fn run_conversation(
        &mut self,
        prompt: &str,
        scope: Option<&str>,
        display_prompt: bool,
    ) -> anyhow::Result<i32> {
        let raw_prompt = prompt.trim().to_string();
        if raw_prompt.is_empty() {
            self.renderer
                .display_info("Provide a question or instruction.");
            return Ok(1);
        }
        if display_prompt {
            self.renderer.display_user_prompt(&raw_prompt);
        }

        self.jfdi_enabled = false;
        if self.matches_dog_whistle(&raw_prompt) {
            self.jfdi_enabled = true;
            self.renderer
                .display_info("Mutating tools enabled. Ready when you are.");
            return Ok(0);
        }

        let Ok((scope_root, scope_label)) = self.resolve_scope(scope) else {
            return Ok(1);
        };
        let default_root = if scope.is_some() {
            scope_root.clone()
        } else {
            self.workspace_root.clone()
        };

        let include_listing = self
            .config
            .context_settings
            .include_listing
            .unwrap_or(false);
        let prompt_context = self.collect_prompt_context(&scope_root, include_listing);
        let model_id = resolve_model(&self.config, None);
        let system_prompt = self.system_prompt(&scope_label);
        let tool_definitions = self.tool_definitions();

        let mut conversation_items: Vec<Item> = Vec::new();
        let session = ToolSession::default();
        if let Some(store) = &self.store {
            let (cached_items, cached_plan) = store.load();
            if !cached_items.is_empty() {
                debug!(items = cached_items.len(), "restored cached transcript");
                conversation_items = cached_items;
            }
            if let Some(cached) = cached_plan {
                *session.plan.lock().unwrap() = cached;
            }
        }

        let mut latest_instruction = raw_prompt.clone();
        let mut pending_user_message: Option<String> = Some(format!(
            "Repository snapshot:\n{prompt_context}\n\nTask:\n{raw_prompt}\n\nIf files must \
             change, call `write` (or `write_file`) with the full content and wait for \
             confirmation."
        ));
        let mut pending_context_update: Option<String> = None;
        let mut context_dirty = false;
        let mut warned_no_write = false;
        let mut buffered_shell_messages: Vec<String> = Vec::new();
        let mut skip_model_request = false;
        let mut pending_user_is_repeat = false;
        let mut last_user_message_payload: Option<String> = pending_user_message.clone();
        let mut last_user_message_index: Option<usize> = None;
        let mut instruction_stack: Vec<String> = Vec::new();

        loop {
            if context_dirty {
                pending_context_update =
                    Some(self.collect_prompt_context(&scope_root, include_listing));
                context_dirty = false;
            }
            if let Some(update) = pending_context_update.take() {
                conversation_items.push(Item::user(format!(
                    "Updated repository snapshot:\n{update}"
                )));
            }
            if let Some(message) = pending_user_message.take() {
                conversation_items.push(Item::user(&message));
                last_user_message_payload = Some(message);
                last_user_message_index = Some(conversation_items.len() - 1);
                if !pending_user_is_repeat {
                    instruction_stack.push(latest_instruction.clone());
                }
                pending_user_is_repeat = false;
            }

            let mut tool_call_handled = false;
            // (text, provider item id, render key) per assistant message.
            let mut assistant_messages: Vec<(String, Option<String>, String)> = Vec::new();
            let mut stream_cache: HashMap<String, String> = HashMap::new();
            let mut streamed_render_keys: HashSet<String> = HashSet::new();

            if skip_model_request {
                skip_model_request = false;
            } else {
                let request = ResponsesRequest::new(
                    model_id.clone(),
                    system_prompt.clone(),
                    conversation_items.clone(),
                )
                .with_tools(tool_definitions.clone())
                .with_reasoning(self.reasoning_params())
                .streaming();

                debug!(items = request.input.len(), "opening model stream");
                let outcome = self.stream_turn(&request).await;
                stream_cache = outcome.stream_cache;
                streamed_render_keys = outcome.streamed_keys;

                if let Some(message) = outcome.error {
                    self.renderer.display_error(&format!("Error: {message}"));
                    return Ok(1);
                }

                if let Some(action) = outcome.cancel {
                    if action == CancelAction::Interrupt {
                        self.renderer.display_info("\nInterrupted by user.");
                        return Ok(130);
                    }
                    if let Some(index) = last_user_message_index {
                        if index <= conversation_items.len() {
                            conversation_items.truncate(index);
                        }
                    }
                    if action == CancelAction::Retry {
                        pending_user_message = last_user_message_payload.clone();
                        pending_user_is_repeat = true;
                        self.renderer.display_info("Retrying prompt…");
                        continue;
                    }
                    // Quit: roll back to the previous instruction and wait
                    // for follow-up input with the unlock re-latched.
                    instruction_stack.pop();
                    latest_instruction = instruction_stack.last().cloned().unwrap_or_default();
                    pending_user_message = None;
                    last_user_message_payload = None;
                    last_user_message_index = None;
                    warned_no_write = false;
                    self.jfdi_enabled = false;
                    self.renderer
                        .display_info("Prompt cancelled. You can continue the conversation.");
                    skip_model_request = true;
                    continue;
                }

                let Some(response) = outcome.response else {
                    self.renderer
                        .display_error("Error: stream ended without a final response");
                    return Ok(1);
                };

                let mut pending_reasoning: VecDeque<Value> = VecDeque::new();
                for output_item in response.output {
                    match output_item {
                        OutputItem::Message { id, text } => {
                            pending_reasoning.clear();
                            let text = text.trim().to_string();
                            if text.is_empty() {
                                continue;
                            }
                            let render_key = id
                                .clone()
                                .unwrap_or_else(|| format!("assistant:{}", assistant_messages.len()));
                            let cached = stream_cache.remove(&render_key);
                            if cached.is_some() {
                                streamed_render_keys.insert(render_key.clone());
                            }
                            let final_text = cached.unwrap_or(text);
                            conversation_items.push(Item::assistant(&final_text));
                            assistant_messages.push((final_text, id, render_key));
                        }
                        OutputItem::FunctionCall {
                            id,
                            call_id,
                            name,
                            arguments,
                        } => {
                            // A reasoning block preceding the call is echoed
                            // into the transcript immediately before it.
                            if let Some(reasoning) = pending_reasoning.pop_front() {
                                conversation_items.push(Item::reasoning_from_value(&reasoning));
                            }
                            conversation_items.push(Item::function_call(
                                &call_id, &name, &arguments, id,
                            ));

                            let rt = self.build_tool_runtime(
                                &default_root,
                                &session,
                                &latest_instruction,
                            );
                            let reply = self
                                .registry
                                .dispatch(&rt, &name, &Value::String(arguments))
                                .await;
                            conversation_items
                                .push(Item::function_call_output(&call_id, &reply.text));

                            if reply.text == JFDI_REQUIRED_MESSAGE {
                                self.inform_mutation_blocked(&mut conversation_items);
                                tool_call_handled = true;
                                continue;
                            }
                            if reply.mutated {
                                context_dirty = true;
                            }
                            tool_call_handled = true;
                        }
                        OutputItem::Reasoning(value) => {
                            pending_reasoning.push_back(value);
                        }
                    }
                }
            }

            if tool_call_handled {
                self.persist(&conversation_items, &session.plan);
                continue;
            }

            // Generated-file fallback: apply narrated file contents the
            // model failed to write through a tool.
            let mut manual_mutation = false;
            let mut displayed_current_cycle = false;
            for (text, _raw_id, render_key) in &assistant_messages {
                if !streamed_render_keys.contains(render_key) && !displayed_current_cycle {
                    self.renderer.display_assistant_message(text);
                    displayed_current_cycle = true;
                }
                for (filename, content) in detect_generated_files(text) {
                    let rt =
                        self.build_tool_runtime(&default_root, &session, &latest_instruction);
                    let status = apply_file_update(
                        &filename,
                        &content,
                        &rt,
                        instruction_implies_write(&latest_instruction),
                    )
                    .await;
                    if status == "applied" {
                        manual_mutation = true;
                    } else if status.starts_with("error") {
                        self.renderer.display_error(&status);
                    }
                }
            }
            if manual_mutation {
                context_dirty = true;
                warned_no_write = false;
            }

            // The model claimed a write happened but nothing changed: remind
            // it once to use the write tool, then re-invoke.
            if !assistant_messages.is_empty() && !manual_mutation && !warned_no_write {
                let claims_write = assistant_messages
                    .iter()
                    .any(|(text, _, _)| claims_write_pattern().is_match(text));
                if claims_write {
                    pending_user_message = Some(NO_WRITE_REMINDER.to_string());
                    warned_no_write = true;
                    continue;
                }
            }

            self.persist(&conversation_items, &session.plan);

            let Some(follow_up) = self.renderer.prompt_follow_up() else {
                return Ok(0);
            };
            let follow_up = follow_up.trim().to_string();

            if self.matches_dog_whistle(&follow_up) {
                self.jfdi_enabled = true;
                self.renderer
                    .display_info("Mutating tools enabled. Ready when you are.");
                pending_user_message = Some(format!(
                    "Follow-up instruction:\nUser typed `{}`, signaling approval to execute the \
                     existing plan. Proceed accordingly.",
                    self.dog_whistle
                ));
                latest_instruction = "jfdi approval".to_string();
                pending_user_is_repeat = false;
                skip_model_request = false;
                continue;
            }

            if follow_up == NEW_CONVERSATION_TOKEN {
                debug!("conversation reset requested");
                conversation_items.clear();
                buffered_shell_messages.clear();
                session.plan.lock().unwrap().clear();
                session.seen_writes.lock().unwrap().clear();
                latest_instruction.clear();
                pending_user_message = None;
                pending_context_update = Some(prompt_context.clone());
                warned_no_write = false;
                skip_model_request = true;
                instruction_stack.clear();
                last_user_message_payload = None;
                last_user_message_index = None;
                pending_user_is_repeat = false;
                self.jfdi_enabled = false;
                if let Some(store) = &self.store {
                    store.clear();
                }
                continue;
            }

            if follow_up.is_empty() {
                return Ok(0);
            }

            self.renderer.display_user_prompt(&follow_up);
            warned_no_write = false;

            if let Some(command_text) = follow_up.strip_prefix('!') {
                let command_text = command_text.trim();
                if command_text.is_empty() {
                    continue;
                }
                match run_sandboxed_bash(
                    command_text,
                    &default_root,
                    &self.workspace_root,
                    Duration::from_secs(30),
                    20_000,
                )
                .await
                {
                    Ok(result) => {
                        let formatted = format_command_result(&result);
                        if !formatted.trim().is_empty() {
                            self.renderer.display_shell_output(&formatted);
                        }
                        let preview = if formatted.trim().is_empty() {
                            format!("Executed shell command: `{command_text}`\nOutput: (no stdout)")
                        } else {
                            format!(
                                "Executed shell command: `{command_text}`\nOutput:\n```\n{formatted}\n```"
                            )
                        };
                        buffered_shell_messages.push(preview);
                        skip_model_request = true;
                    }
                    Err(e) => {
                        self.renderer.display_error(&format!("command rejected: {e}"));
                    }
                }
                continue;
            }

            latest_instruction = follow_up.clone();
            for message in buffered_shell_messages.drain(..) {
                conversation_items.push(Item::user(message));
            }
            for message in self.renderer.consume_completion_messages() {
                conversation_items.push(Item::user(message));
            }
            pending_user_message = Some(format!(
                "Follow-up instruction:\n{follow_up}{FOLLOW_UP_REMINDER}"
            ));
            pending_user_is_repeat = false;
        }
    }

    /// Single-turn file rewrite: send the file and instruction, strip
    /// fences, review, and apply (or delete on empty content).
    pub async fn run_edit(
        &mut self,
        path: &str,
        instruction: &str,
        model_override: Option<&str>,
    ) -> anyhow::Result<i32> {
        if !self.jfdi_enabled {
            self.renderer
                .display_assistant_message(&self.mutation_blocked_message());
            return Ok(1);
        }

        let expanded = shellexpand::tilde(path).into_owned();
        let target_path = PathBuf::from(expanded);
        if target_path.is_dir() {
            self.renderer.display_info(&format!(
                "{} is a directory, not a file. Try harder.",
                target_path.display()
            ));
            return Ok(1);
        }

        let current_text = if target_path.exists() {
            match std::fs::read(&target_path) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        self.renderer.display_info(&format!(
                            "{} isn't UTF-8 text.",
                            target_path.display()
                        ));
                        return Ok(1);
                    }
                },
                Err(e) => {
                    self.renderer.display_error(&format!(
                        "Couldn't read {}: {e}",
                        target_path.display()
                    ));
                    return Ok(1);
                }
            }
        } else {
            String::new()
        };

        let effective_model = resolve_model(&self.config, model_override);
        let system_message = "You rewrite files. Return only the complete updated file content. \
                              No explanations, no code fences, no commentary.";

        let mut instruction = instruction.to_string();
        let mut retried = false;

        loop {
            let user_message = format!(
                "File: {}\nInstruction:\n{instruction}\n\nOriginal file contents:\n{current_text}",
                target_path.display()
            );
            let request = ResponsesRequest::new(
                effective_model.clone(),
                system_message,
                vec![Item::user(user_message)],
            );

            self.renderer.start_loader();
            let result = self.client.create(&request).await;
            self.renderer.stop_loader();

            let content = match result {
                Ok(content) => content,
                Err(e) => {
                    self.renderer
                        .display_error(&format!("Error: {e:#}. The API tripped over itself."));
                    return Ok(1);
                }
            };
            if content.is_empty() {
                self.renderer
                    .display_info("Model returned no content. Aborting.");
                return Ok(1);
            }

            let proposed_text = strip_code_fence(&content);
            if proposed_text.is_empty() {
                self.renderer
                    .display_info("Model returned empty content. Not touching your file.");
                return Ok(1);
            }
            if proposed_text == current_text {
                self.renderer
                    .display_info("Model produced identical content. Nothing to do.");
                return Ok(0);
            }

            let display_path = target_path
                .strip_prefix(&self.workspace_root)
                .unwrap_or(&target_path)
                .to_path_buf();
            let outcome = self.renderer.review_file_update(
                &target_path,
                &display_path,
                &current_text,
                &proposed_text,
                instruction_implies_write(&instruction),
            );

            match outcome {
                ReviewOutcome::UserRejected if !retried => {
                    let Some(extra) = self
                        .renderer
                        .prompt_text("add_context >>> ")
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                    else {
                        return Ok(0);
                    };
                    instruction = format!(
                        "{instruction}\n\nAdditional context provided after review:\n{extra}"
                    );
                    retried = true;
                    continue;
                }
                ReviewOutcome::UserRejected => return Ok(0),
                ReviewOutcome::DeleteRequested => {
                    let session = ToolSession::default();
                    let rt =
                        self.build_tool_runtime(&self.workspace_root, &session, &instruction);
                    let status = delete_path_via_shell(&target_path, &rt).await;
                    if status.starts_with("error") {
                        self.renderer.display_error(&status);
                        return Ok(1);
                    }
                    return Ok(0);
                }
                ReviewOutcome::Error(message) => {
                    self.renderer.display_error(&message);
                    return Ok(1);
                }
                _ => return Ok(0),
            }
        }
    }
}
