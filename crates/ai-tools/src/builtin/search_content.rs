// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Regex content search: ripgrep's JSON output when available, an
//! in-process walk when the sandbox refuses or `rg` is missing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use ai_sandbox::run_sandboxed_bash;

use crate::builtin::glob::{parse_limit, resolve_cwd};
use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

pub struct SearchContentTool;

#[derive(Debug, Clone, PartialEq)]
struct Match {
    path: String,
    line: usize,
    text: String,
}

fn normalize_patterns(value: Option<&Value>, key: &str) -> Result<Vec<String>, String> {
    let patterns = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return Err(format!("error: {key} must be a string or list of strings"))
                    }
                }
            }
            out
        }
        Some(_) => return Err(format!("error: {key} must be a string or list of strings")),
    };
    Ok(patterns
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

/// Decode `rg --json` stdout into matches jailed to `base_root`.
fn parse_rg_json(
    stdout: &str,
    search_root: &Path,
    base_root: &Path,
    max_results: usize,
) -> (Vec<Match>, bool) {
    let mut matches = Vec::new();
    let mut truncated = false;
    for line in stdout.lines() {
        let Ok(payload) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if payload.get("type").and_then(|t| t.as_str()) != Some("match") {
            continue;
        }
        let data = &payload["data"];
        let Some(path_text) = data["path"]["text"].as_str() else {
            continue;
        };
        let absolute = crate::runtime::normalize_lexically(&search_root.join(path_text));
        let Ok(relative) = absolute.strip_prefix(base_root) else {
            continue;
        };
        let Some(line_number) = data["line_number"].as_u64() else {
            continue;
        };
        let text = data["lines"]["text"]
            .as_str()
            .unwrap_or("")
            .trim_end_matches('\n')
            .to_string();
        matches.push(Match {
            path: relative.to_string_lossy().into_owned(),
            line: line_number as usize,
            text,
        });
        if matches.len() >= max_results {
            truncated = true;
            break;
        }
    }
    (matches, truncated)
}

/// In-process fallback: walk the tree and regex every text line.
fn fallback_search(
    pattern: &str,
    case_sensitive: bool,
    include: &[String],
    exclude: &[String],
    search_root: &Path,
    base_root: &Path,
    max_results: usize,
) -> Result<(Vec<Match>, bool), String> {
    let compiled = regex::RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .multi_line(true)
        .build()
        .map_err(|e| format!("error: invalid regex ({e})"))?;

    let include_globs: Vec<glob::Pattern> = include
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();
    let exclude_globs: Vec<glob::Pattern> = exclude
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let within_patterns = |path_str: &str| -> bool {
        if !include_globs.is_empty() && !include_globs.iter().any(|g| g.matches(path_str)) {
            return false;
        }
        if exclude_globs.iter().any(|g| g.matches(path_str)) {
            return false;
        }
        true
    };

    let mut matches = Vec::new();
    let mut truncated = false;
    'files: for entry in WalkDir::new(search_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Ok(relative) = entry.path().strip_prefix(base_root) else {
            continue;
        };
        let relative_str = relative.to_string_lossy().into_owned();
        if !within_patterns(&relative_str) {
            continue;
        }
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        for (idx, line) in content.lines().enumerate() {
            if compiled.is_match(line) {
                matches.push(Match {
                    path: relative_str.clone(),
                    line: idx + 1,
                    text: line.trim_end_matches('\n').to_string(),
                });
                if matches.len() >= max_results {
                    truncated = true;
                    break 'files;
                }
            }
        }
    }
    Ok((matches, truncated))
}

fn format_results(
    pattern: &str,
    matches: &[Match],
    truncated: bool,
    max_results: usize,
    search_root: &Path,
    base_root: &Path,
) -> String {
    let count_label = if matches.len() == 1 { "match" } else { "matches" };
    let mut header = format!(
        "Search results for '{pattern}' – {} {count_label}",
        matches.len()
    );
    if truncated {
        header.push_str(&format!(" (truncated at {max_results})"));
    }
    if search_root != base_root {
        if let Ok(scope) = search_root.strip_prefix(base_root) {
            header.push_str(&format!(" in {}", scope.display()));
        }
    }

    let mut lines = vec![header];
    for m in matches {
        lines.push(format!("{}:{}: {}", m.path, m.line, m.text));
    }
    lines.join("\n")
}

fn no_match_message(pattern: &str, search_root: &Path, base_root: &Path) -> String {
    if search_root != base_root {
        if let Ok(scope) = search_root.strip_prefix(base_root) {
            return format!(
                "Search pattern '{pattern}' returned no matches in {}",
                scope.display()
            );
        }
    }
    format!("Search pattern '{pattern}' returned no matches.")
}

fn rg_command(
    pattern: &str,
    case_sensitive: bool,
    include: &[String],
    exclude: &[String],
    max_results: usize,
) -> String {
    let mut parts: Vec<String> = vec![
        "rg".into(),
        "--json".into(),
        "--line-number".into(),
        "--color".into(),
        "never".into(),
    ];
    if !case_sensitive {
        parts.push("-i".into());
    }
    for p in include {
        parts.push("-g".into());
        parts.push(p.clone());
    }
    for p in exclude {
        parts.push("-g".into());
        parts.push(format!("!{p}"));
    }
    parts.push("-m".into());
    parts.push(max_results.to_string());
    parts.push(pattern.to_string());
    parts.push(".".into());

    parts
        .iter()
        .map(|part| {
            shlex::try_quote(part)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| part.clone())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Tool for SearchContentTool {
    fn name(&self) -> &str {
        "search_content"
    }

    fn description(&self) -> &str {
        "Search file contents using a regex (prefer this over shell grep). Returns path:line:text snippets."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional directory within the repo to search"
                },
                "include": {
                    "type": ["string", "array"],
                    "items": {"type": "string"},
                    "description": "Glob pattern(s) to include"
                },
                "exclude": {
                    "type": ["string", "array"],
                    "items": {"type": "string"},
                    "description": "Glob pattern(s) to exclude"
                },
                "maxResults": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of matches to return (default 200)"
                },
                "caseSensitive": {
                    "type": "boolean",
                    "description": "Set false for case-insensitive search"
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
        let case_sensitive = match args.get("caseSensitive") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => return ToolReply::text("error: caseSensitive must be a boolean"),
        };
        let max_results = match parse_limit(args, "maxResults") {
            Ok(limit) => limit,
            Err(message) => return ToolReply::text(message),
        };
        let include = match normalize_patterns(args.get("include"), "include") {
            Ok(p) => p,
            Err(message) => return ToolReply::text(message),
        };
        let exclude = match normalize_patterns(args.get("exclude"), "exclude") {
            Ok(p) => p,
            Err(message) => return ToolReply::text(message),
        };
        let search_root: PathBuf = match resolve_cwd(rt, args) {
            Ok(root) => root,
            Err(message) => return ToolReply::text(message),
        };

        debug!(pattern = %pattern, root = %search_root.display(), "search_content");

        // First choice: ripgrep through the sandbox.  Exit 1 is "no
        // matches"; anything above falls through to the in-process walk.
        let command = rg_command(&pattern, case_sensitive, &include, &exclude, max_results);
        let mut matches: Vec<Match> = Vec::new();
        let mut truncated = false;
        let mut rg_conclusive = false;
        if let Ok(result) = run_sandboxed_bash(
            &command,
            &search_root,
            &rt.base_root,
            Duration::from_secs(30),
            60_000,
        )
        .await
        {
            if result.exit_code == 0 || result.exit_code == 1 {
                let (found, cut) =
                    parse_rg_json(&result.stdout, &search_root, &rt.base_root, max_results);
                matches = found;
                truncated = cut;
                rg_conclusive = true;
            }
        }

        if !rg_conclusive {
            rt.renderer
                .display_info("rg unavailable or failed; falling back to in-process search");
            match fallback_search(
                &pattern,
                case_sensitive,
                &include,
                &exclude,
                &search_root,
                &rt.base_root,
                max_results,
            ) {
                Ok((found, cut)) => {
                    matches = found;
                    truncated = cut;
                }
                Err(message) => return ToolReply::text(message),
            }
        }

        if matches.is_empty() {
            let message = no_match_message(&pattern, &search_root, &rt.base_root);
            rt.renderer.display_info(&message);
            return ToolReply::text(message);
        }

        let rendered = format_results(
            &pattern,
            &matches,
            truncated,
            max_results,
            &search_root,
            &rt.base_root,
        );
        rt.renderer.display_info(&rendered);
        ToolReply::text(rendered)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
