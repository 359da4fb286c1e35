// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Inline one-shot mode: a read-only question across one or more scopes,
//! answered once with no follow-up loop and no mutating tools.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use ai_context::{
    collect_context, format_context_for_prompt, format_file_slice_for_prompt, read_file_slice,
};
use ai_model::{Item, OutputItem, ResponsesRequest, ToolDefinition};

use crate::engine::{Engine, ToolSession};
use crate::settings::resolve_model;

/// Tools available to inline mode; everything mutating is absent.
const INLINE_TOOLS: &[&str] = &["read_file", "glob", "search_content"];

/// One tool-free answer is expected within this many rounds.
const MAX_TOOL_ROUNDS: usize = 6;

const INLINE_SYSTEM_PROMPT: &str =
    "You are a terminal coding assistant in inline mode. Provide a single, self-contained \
     answer. You may use read-only tools (read_file, glob, search_content) to inspect the \
     repository. Do not ask follow-up questions, do not claim to have edited files or run \
     shell commands, and do not output patch or write instructions as if they were applied.";

/// A parsed inline invocation: leading existing paths become scopes, the
/// remaining words the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinePromptRequest {
    pub prompt: String,
    pub scopes: Vec<PathBuf>,
}

/// Split `argv` into leading existing paths and the trailing prompt.
///
/// Returns `None` when the form does not apply (empty argv or any flag-like
/// argument); `Some(Err(_))` when paths were given but no prompt followed.
pub fn parse_inline_prompt(
    argv: &[String],
    cwd: &Path,
) -> Option<Result<InlinePromptRequest, String>> {
    if argv.is_empty() || argv.iter().any(|a| a.starts_with('-')) {
        return None;
    }

    let mut scopes: Vec<PathBuf> = Vec::new();
    let mut index = 0;
    while index < argv.len() {
        let expanded = shellexpand::tilde(&argv[index]).into_owned();
        let candidate = PathBuf::from(&expanded);
        let candidate = if candidate.is_absolute() {
            candidate
        } else {
            cwd.join(candidate)
        };
        if !candidate.exists() {
            break;
        }
        scopes.push(candidate.canonicalize().unwrap_or(candidate));
        index += 1;
    }

    let prompt = argv[index..].join(" ").trim().to_string();
    if prompt.is_empty() {
        if scopes.is_empty() {
            return Some(Err("Inline prompt cannot be empty.".into()));
        }
        return Some(Err(
            "Inline prompt cannot be empty. Provide a question after the paths.".into(),
        ));
    }
    Some(Ok(InlinePromptRequest { prompt, scopes }))
}

impl Engine {
    /// Answer a read-only one-shot question, optionally scoped to a set of
    /// files and directories.  Returns the process exit code.
    pub async fn run_inline(
        &mut self,
        prompt: &str,
        scopes: &[PathBuf],
    ) -> anyhow::Result<i32> {
        let raw_prompt = prompt.trim().to_string();
        if raw_prompt.is_empty() {
            self.renderer().display_error("Inline prompt cannot be empty.");
            return Ok(1);
        }
        self.renderer().display_user_prompt(&raw_prompt);

        let prompt_context = match self.build_inline_context(scopes) {
            Ok(context) => context,
            Err(message) => {
                self.renderer().display_error(&message);
                return Ok(1);
            }
        };

        let model_id = resolve_model(self.config(), None);
        let tools: Vec<ToolDefinition> = self
            .registry()
            .schemas()
            .into_iter()
            .filter(|s| INLINE_TOOLS.contains(&s.name.as_str()))
            .map(|s| ToolDefinition::function(s.name, s.description, s.parameters))
            .collect();

        let context_block = if prompt_context.is_empty() {
            "(no context collected)".to_string()
        } else {
            prompt_context
        };
        let mut conversation_items = vec![Item::user(format!(
            "Repository snapshot:\n{context_block}\n\nTask:\n{raw_prompt}\n\nInline mode: \
             read-only; answer once and exit."
        ))];

        let session = ToolSession::default();
        let workspace_root = self.workspace_root().to_path_buf();

        for round in 0..MAX_TOOL_ROUNDS {
            let request = ResponsesRequest::new(
                model_id.clone(),
                INLINE_SYSTEM_PROMPT,
                conversation_items.clone(),
            )
            .with_tools(tools.clone())
            .streaming();

            debug!(round, items = request.input.len(), "inline model request");
            let outcome = self.stream_turn(&request).await;

            if let Some(message) = outcome.error {
                self.renderer().display_error(&format!("Error: {message}"));
                return Ok(1);
            }
            if outcome.cancel.is_some() {
                self.renderer().display_info("\nInterrupted by user.");
                return Ok(130);
            }
            let Some(response) = outcome.response else {
                self.renderer()
                    .display_error("Error: stream ended without a final response");
                return Ok(1);
            };

            let mut tool_calls = 0usize;
            // (text, already streamed to the terminal)
            let mut assistant_messages: Vec<(String, bool)> = Vec::new();

            for output_item in response.output {
                match output_item {
                    OutputItem::Message { id, text } => {
                        let text = text.trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        let streamed = id
                            .as_deref()
                            .is_some_and(|key| outcome.streamed_keys.contains(key));
                        conversation_items.push(Item::assistant(&text));
                        assistant_messages.push((text, streamed));
                    }
                    OutputItem::FunctionCall {
                        id,
                        call_id,
                        name,
                        arguments,
                    } => {
                        conversation_items.push(Item::function_call(
                            &call_id, &name, &arguments, id,
                        ));
                        let rt =
                            self.build_tool_runtime(&workspace_root, &session, &raw_prompt);
                        let reply = self
                            .registry()
                            .dispatch(&rt, &name, &Value::String(arguments))
                            .await;
                        conversation_items.push(Item::function_call_output(&call_id, &reply.text));
                        tool_calls += 1;
                    }
                    OutputItem::Reasoning(_) => {}
                }
            }

            if tool_calls > 0 {
                continue;
            }

            if let Some((text, streamed)) = assistant_messages.last() {
                if !streamed {
                    self.renderer().display_assistant_message(text);
                }
                return Ok(0);
            }
            self.renderer().display_error("Model returned no content.");
            return Ok(1);
        }

        self.renderer()
            .display_error("Inline mode exceeded tool call limit.");
        Ok(1)
    }

    /// Context for inline mode: the whole workspace when no scopes were
    /// given, otherwise one `## Scope:` section per path.
    fn build_inline_context(&self, scopes: &[PathBuf]) -> Result<String, String> {
        let repo_root = self.workspace_root().to_path_buf();
        let (max_bytes, read_limit) = self.context_limits();

        if scopes.is_empty() {
            let collected = collect_context(&repo_root, max_bytes, read_limit, false, None);
            return Ok(format_context_for_prompt(&collected));
        }

        let mut sections: Vec<String> = Vec::new();
        for scope in scopes {
            let resolved = scope.canonicalize().unwrap_or_else(|_| scope.clone());
            let Ok(relative) = resolved.strip_prefix(&repo_root) else {
                return Err("Inline scope must be inside the repository.".into());
            };
            if !resolved.exists() {
                return Err(format!("Inline scope not found: {}", resolved.display()));
            }

            let label = if relative.as_os_str().is_empty() {
                ".".to_string()
            } else {
                relative.to_string_lossy().into_owned()
            };
            sections.push(format!("## Scope: {label}"));

            if resolved.is_dir() {
                let collected = collect_context(&resolved, max_bytes, read_limit, true, None);
                sections.push(format_context_for_prompt(&collected));
            } else {
                let file_slice = read_file_slice(&resolved, 0, read_limit, max_bytes);
                sections.push(format_file_slice_for_prompt(&file_slice, Some(&repo_root)));
            }
        }
        Ok(sections
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
