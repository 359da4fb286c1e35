// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Recovery of file contents the model narrated instead of writing: a
//! "save/write … as/to/in <name>" sentence followed by a fenced block.

use std::sync::OnceLock;

use regex::Regex;

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(?:save|write|create|add|generate|produce)[^\n]{0,160}?\b(?:as|to|in)\s+`?([A-Za-z0-9._\-/]+)`?(?::)?",
        )
        .expect("generated-file pattern is valid")
    })
}

/// Find `(filename, content)` pairs: an announcement line matched by the
/// filename pattern, followed by the next fenced code block.
pub fn detect_generated_files(message: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = message.lines().collect();
    let mut results: Vec<(String, String)> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(captures) = filename_pattern().captures(lines[i]) else {
            i += 1;
            continue;
        };
        let filename = captures[1].trim().trim_end_matches(':').trim().to_string();

        // Seek the opening fence.
        let mut j = i + 1;
        while j < lines.len() && !lines[j].starts_with("```") {
            j += 1;
        }
        if j >= lines.len() {
            i += 1;
            continue;
        }
        j += 1;
        let start = j;
        while j < lines.len() && !lines[j].starts_with("```") {
            j += 1;
        }
        if j >= lines.len() {
            break;
        }
        let content = lines[start..j].join("\n").trim_end().to_string();
        results.push((filename, content));
        i = j + 1;
    }
    results
}

/// Peel one outer code fence (with optional language tag) off a model
/// response, normalising CRLF on the way.
pub fn strip_code_fence(raw: &str) -> String {
    let text = raw.trim();
    let text = if let Some(rest) = text.strip_prefix("```") {
        match rest.find('\n') {
            Some(newline) => {
                let body = &rest[newline + 1..];
                body.rsplit_once("```").map(|(head, _)| head).unwrap_or(body)
            }
            None => "",
        }
    } else {
        text
    };
    text.replace("\r\n", "\n").trim_matches('\n').to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
