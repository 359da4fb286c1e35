// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Context-collection knobs.
///
/// All fields optional in the file; resolved against the collector's
/// built-in constants when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContextSettings {
    /// Maximum bytes of file content per snapshot slice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<usize>,
    /// Default number of lines read per file slice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_limit: Option<usize>,
    /// Include a one-line-per-entry directory listing in snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_listing: Option<bool>,
}

/// The persisted configuration.
///
/// Unknown keys in the file are ignored on load and dropped on save; the
/// recognized option set is deliberately closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub model: String,
    /// The approval phrase that unlocks mutating tools for a session.
    #[serde(default)]
    pub dog_whistle: String,
    /// Stream model reasoning to the terminal.  `show_thinking` is the
    /// legacy spelling and is honoured when this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_reasoning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_thinking: Option<bool>,
    /// One of "low" | "medium" | "high".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "is_default_context")]
    pub context_settings: ContextSettings,
}

fn is_default_context(c: &ContextSettings) -> bool {
    *c == ContextSettings::default()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
