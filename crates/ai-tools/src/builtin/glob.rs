// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

const DEFAULT_LIMIT: usize = 200;
const HARD_MAX_LIMIT: usize = 1000;

pub struct GlobTool;

/// Parse a positive integer limit argument with the shared clamp rules.
pub(crate) fn parse_limit(
    args: &Map<String, Value>,
    key: &str,
) -> Result<usize, String> {
    let Some(raw) = args.get(key) else {
        return Ok(DEFAULT_LIMIT);
    };
    let value = raw
        .as_i64()
        .ok_or_else(|| format!("error: {key} must be an integer"))?;
    if value < 1 {
        return Err(format!("error: {key} must be at least 1"));
    }
    Ok((value as usize).min(HARD_MAX_LIMIT))
}

/// Resolve the optional `cwd` argument against the runtime jail.
pub(crate) fn resolve_cwd(
    rt: &ToolRuntime,
    args: &Map<String, Value>,
) -> Result<std::path::PathBuf, String> {
    match args.get("cwd") {
        None | Some(Value::Null) => Ok(rt.default_root.clone()),
        Some(Value::String(raw)) if !raw.trim().is_empty() => {
            let path = rt.resolve(raw.trim());
            if rt.jail(&path).is_err() {
                return Err(format!("error: cwd outside project root ({})", path.display()));
            }
            if !path.exists() {
                return Err(format!("error: cwd does not exist ({})", path.display()));
            }
            Ok(path)
        }
        Some(_) => Err("error: cwd must be a non-empty string".into()),
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "List repository paths matching a glob pattern (relative to the project root unless cwd provided)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g., **/*.py)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional directory to treat as current working directory"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of matches to return (default 200)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let pattern = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => return ToolReply::text("error: pattern must be a non-empty string"),
        };
        let limit = match parse_limit(args, "limit") {
            Ok(limit) => limit,
            Err(message) => return ToolReply::text(message),
        };
        let search_root = match resolve_cwd(rt, args) {
            Ok(root) => root,
            Err(message) => return ToolReply::text(message),
        };

        debug!(pattern = %pattern, root = %search_root.display(), limit, "glob");

        let full_pattern = search_root.join(&pattern);
        let walker = match glob::glob(&full_pattern.to_string_lossy()) {
            Ok(walker) => walker,
            Err(e) => return ToolReply::text(format!("error: invalid glob pattern ({e})")),
        };

        let mut matches: Vec<String> = Vec::new();
        for entry in walker.flatten() {
            let resolved = entry.canonicalize().unwrap_or(entry);
            let Ok(relative) = rt.jail(&resolved) else {
                continue;
            };
            matches.push(relative.to_string_lossy().into_owned());
            if matches.len() >= limit {
                break;
            }
        }

        if matches.is_empty() {
            let message = format!("Glob pattern '{pattern}' returned no matches.");
            rt.renderer.display_info(&message);
            return ToolReply::text(message);
        }

        let mut lines = vec![format!(
            "Glob matches for '{pattern}' (showing {}):",
            matches.len()
        )];
        lines.extend(matches);
        let rendered = lines.join("\n");
        rt.renderer.display_info(&rendered);
        ToolReply::text(rendered)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
