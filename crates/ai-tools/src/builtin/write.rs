// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::runtime::{apply_file_update, instruction_implies_write, ToolRuntime};
use crate::tool::{Tool, ToolReply};

/// Full-content file write.  One implementation serves both wire names:
/// `write` takes `filePath`/`content`, `write_file` takes `path`/`contents`;
/// either spelling is accepted under either name.
pub struct WriteTool {
    name: &'static str,
    description: &'static str,
}

impl WriteTool {
    pub fn write() -> Self {
        Self {
            name: "write",
            description: "Write new contents to a file. Accepts absolute or repository-relative paths.",
        }
    }

    pub fn write_file() -> Self {
        Self {
            name: "write_file",
            description: "Write new contents to a file, replacing the existing text.",
        }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        if self.name == "write" {
            json!({
                "type": "object",
                "properties": {
                    "filePath": {
                        "type": "string",
                        "description": "Absolute path to the file (or a path relative to the project root)"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full replacement file contents"
                    }
                },
                "required": ["filePath", "content"]
            })
        } else {
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to the file"},
                    "contents": {
                        "type": "string",
                        "description": "Full replacement file contents"
                    }
                },
                "required": ["path", "contents"]
            })
        }
    }

    fn requires_unlock(&self) -> bool {
        true
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let path_arg = args
            .get("filePath")
            .or_else(|| args.get("path"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        let contents = args
            .get("content")
            .or_else(|| args.get("contents"))
            .and_then(|v| v.as_str());
        let (Some(path_arg), Some(contents)) = (path_arg, contents) else {
            return ToolReply::text("error: missing file path or contents");
        };

        let auto_apply = instruction_implies_write(&rt.latest_instruction);
        let status = apply_file_update(path_arg, contents, rt, auto_apply).await;
        let mutated = status == "applied";
        debug!(tool = self.name, mutated, bytes = contents.len(), "write finished");
        ToolReply {
            text: status,
            mutated,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
