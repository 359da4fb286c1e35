// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod apply_patch;
pub mod glob;
pub mod plan_update;
pub mod read_file;
pub mod search_content;
pub mod shell;
pub mod unit_test_coverage;
pub mod update_plan;
pub mod write;

use serde_json::{Map, Value};

/// Fetch a required string argument or produce the standard error text.
pub(crate) fn require_str<'a>(
    args: &'a Map<String, Value>,
    key: &str,
    error: &str,
) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| error.to_string())
}
