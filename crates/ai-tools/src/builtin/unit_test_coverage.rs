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

/// Output cap for coverage reports; these run long and the tail matters.
const COVERAGE_MAX_OUTPUT: usize = 50_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct UnitTestCoverageTool;

#[async_trait]
impl Tool for UnitTestCoverageTool {
    fn name(&self) -> &str {
        "unit_test_coverage"
    }

    fn description(&self) -> &str {
        "Run Python pytest with coverage (term-missing report) and return the formatted output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Optional test target path or pattern"
                },
                "extraArgs": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Additional pytest arguments"
                },
                "timeout_ms": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Optional timeout in milliseconds"
                }
            },
            "required": []
        })
    }

    fn requires_unlock(&self) -> bool {
        true
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let target = match args.get("target") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(_) => return ToolReply::text("error: target must be a string"),
        };

        let extra_args = match args.get("extraArgs").or_else(|| args.get("extra_args")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => {
                            return ToolReply::text("error: extraArgs must be a list of strings")
                        }
                    }
                }
                out
            }
            Some(_) => return ToolReply::text("error: extraArgs must be a list of strings"),
        };

        let timeout = match args.get("timeout_ms") {
            None | Some(Value::Null) => DEFAULT_TIMEOUT,
            Some(value) => match value.as_u64() {
                Some(ms) => Duration::from_secs((ms / 1000).max(1)),
                None => return ToolReply::text("error: invalid timeout_ms"),
            },
        };

        let mut command_parts: Vec<String> = vec![
            "pytest".into(),
            "--cov".into(),
            "--cov-report=term-missing".into(),
        ];
        if let Some(target) = target {
            command_parts.push(target);
        }
        command_parts.extend(extra_args);

        let command = command_parts
            .iter()
            .map(|part| {
                shlex::try_quote(part)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| part.clone())
            })
            .collect::<Vec<_>>()
            .join(" ");

        debug!(cmd = %command, "unit_test_coverage");

        match run_sandboxed_bash(
            &command,
            &rt.default_root,
            &rt.base_root,
            timeout,
            COVERAGE_MAX_OUTPUT,
        )
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
