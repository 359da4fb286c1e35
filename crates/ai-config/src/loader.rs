// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::paths::config_path;
use crate::schema::Config;

pub const DEFAULT_MODEL: &str = "gpt-5-codex";
pub const DEFAULT_DOG_WHISTLE: &str = "jfdi";

/// Load the configuration: file (if readable) layered under environment
/// overrides.  Precedence is env > file > defaults; an unreadable or
/// malformed file degrades to defaults rather than failing startup.
pub fn load_config() -> Config {
    let mut cfg = load_config_from(&config_path());
    apply_env_overrides_with(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Load just the file layer from an explicit path.
pub fn load_config_from(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Config::default(),
    };
    match serde_json::from_str(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "config file unparseable; using defaults");
            Config::default()
        }
    }
}

/// Apply the recognized environment overrides using `lookup` as the
/// variable source.  Split out so tests can inject variables without
/// touching the process environment.
pub fn apply_env_overrides_with(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
        cfg.openai_api_key = key;
    }
    if let Some(model) = lookup("AI_MODEL").filter(|v| !v.is_empty()) {
        cfg.model = model;
    }
    if let Some(phrase) = lookup("DOG_WHISTLE").filter(|v| !v.is_empty()) {
        cfg.dog_whistle = phrase;
    }
    if let Some(limit) = lookup("AI_CONTEXT_READ_LIMIT").and_then(|v| v.parse().ok()) {
        cfg.context_settings.read_limit = Some(limit);
    }
    if let Some(bytes) = lookup("AI_CONTEXT_MAX_BYTES").and_then(|v| v.parse().ok()) {
        cfg.context_settings.max_bytes = Some(bytes);
    }
    if let Some(listing) = lookup("AI_CONTEXT_INCLUDE_LISTING") {
        cfg.context_settings.include_listing =
            Some(!matches!(listing.to_lowercase().as_str(), "" | "0" | "false" | "no"));
    }
}

/// Persist `cfg` to the default config path, creating parent directories.
/// Returns the path written.
pub fn save_config(cfg: &Config) -> anyhow::Result<PathBuf> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

/// Persist `cfg` to an explicit path.
///
/// Atomic: the JSON is written to a sibling temp file and renamed into
/// place, so a concurrent `load_config` never observes a truncated file.
pub fn save_config_to(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(cfg).context("serializing config")?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, text)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
