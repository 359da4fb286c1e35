// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::builtin::require_str;
use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

pub struct ApplyPatchTool;

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff patch to files (prefer write/write_file when possible)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patch": {"type": "string", "description": "Unified diff patch"}
            },
            "required": ["patch"]
        })
    }

    fn requires_unlock(&self) -> bool {
        true
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let patch_text = match require_str(args, "patch", "error: missing patch")
            .or_else(|_| require_str(args, "input", "error: missing patch"))
        {
            Ok(text) => text.to_string(),
            Err(message) => return ToolReply::text(message),
        };

        rt.renderer
            .display_info(&format!("# apply_patch proposal\n{patch_text}"));
        if !rt.renderer.prompt_confirm("Apply patch? [y/N]: ", true) {
            return ToolReply::text("user_rejected");
        }

        debug!(bytes = patch_text.len(), "piping patch to patch(1)");

        let spawned = tokio::process::Command::new("patch")
            .args(["-p0", "--batch", "--forward"])
            .current_dir(&rt.base_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolReply::text("error: 'patch' command not available");
            }
            Err(e) => return ToolReply::text(format!("error: failed to run patch: {e}")),
        };

        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(patch_text.as_bytes()).await {
                return ToolReply::text(format!("error: failed to feed patch: {e}"));
            }
        }
        drop(child.stdin.take());

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => return ToolReply::text(format!("error: failed to run patch: {e}")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if !stdout.is_empty() {
                rt.renderer.display_info(&stdout);
            }
            if !stderr.is_empty() {
                rt.renderer.display_error(&stderr);
            }
            return ToolReply::text(format!(
                "error: patch failed (status {})",
                output.status.code().unwrap_or(-1)
            ));
        }
        if !stdout.is_empty() {
            rt.renderer.display_info(&stdout);
        }
        ToolReply::mutating("applied")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
