// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

/// Default byte window returned when the model omits `limit`.
const DEFAULT_LIMIT: usize = 8000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the repository."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file"},
                "offset": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Optional byte offset"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Optional byte limit"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let Some(path_arg) = args.get("path").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
        else {
            return ToolReply::text("error: missing path");
        };

        let path = rt.resolve(path_arg);
        let Ok(relative) = rt.jail(&path) else {
            return ToolReply::text(format!(
                "error: path outside project root ({})",
                path.display()
            ));
        };

        let offset = args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_LIMIT as u64) as usize;

        debug!(path = %relative.display(), offset, limit, "read_file");

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                return ToolReply::text(format!("error: failed to read {}: {e}", path.display()));
            }
        };

        let snippet: String = data.chars().skip(offset).take(limit).collect();
        ToolReply::text(format!(
            "Contents of {}\n```\n{snippet}\n```",
            relative.display()
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
