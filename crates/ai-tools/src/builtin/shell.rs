// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use ai_sandbox::{format_command_result, run_sandboxed_bash};

use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

pub struct ShellTool;

/// Accepts the command as either a string or a list of argv words; a list is
/// quoted and joined so it survives the `bash -lc` round trip.
fn command_string(value: Option<&Value>) -> Result<String, String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(parts)) => {
            let words: Vec<String> = parts
                .iter()
                .map(|part| {
                    let raw = match part {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    shlex::try_quote(&raw)
                        .map(|q| q.into_owned())
                        .unwrap_or(raw)
                })
                .collect();
            Ok(words.join(" "))
        }
        _ => Err("error: invalid command; expected string or list".into()),
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a sandboxed shell command within the project scope."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": ["array", "string"],
                    "description": "Command to execute (string or list of strings)",
                    "items": {"type": "string"}
                },
                "workdir": {
                    "type": "string",
                    "description": "Optional working directory"
                },
                "timeout_ms": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Optional timeout in milliseconds"
                }
            },
            "required": ["command"]
        })
    }

    fn requires_unlock(&self) -> bool {
        true
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let command = match command_string(args.get("command")) {
            Ok(command) => command,
            Err(message) => return ToolReply::text(message),
        };

        let workdir = match args.get("workdir").and_then(|v| v.as_str()) {
            Some(dir) if !dir.is_empty() => rt.resolve(dir),
            _ => rt.default_root.clone(),
        };
        if rt.jail(&workdir).is_err() {
            return ToolReply::text(format!(
                "error: workdir outside project root ({})",
                workdir.display()
            ));
        }

        let (mut timeout, max_output_bytes) = rt.shell_limits();
        if let Some(ms) = args.get("timeout_ms").and_then(|v| v.as_u64()) {
            timeout = Duration::from_secs((ms / 1000).max(1));
        }

        debug!(cmd = %command, workdir = %workdir.display(), "shell tool");

        match run_sandboxed_bash(&command, &workdir, &rt.base_root, timeout, max_output_bytes)
            .await
        {
            Ok(result) => {
                let formatted = format_command_result(&result);
                let body = if formatted.trim().is_empty() {
                    "(no output)".to_string()
                } else {
                    formatted
                };
                let rendered = format!("$ {command}\n\n{body}");
                rt.renderer.display_shell_output(&rendered);
                ToolReply::text(rendered)
            }
            Err(e) => {
                let message = format!("command rejected: {e}");
                rt.renderer.display_error(&message);
                ToolReply::text(message)
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
