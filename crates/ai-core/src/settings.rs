// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::bail;

use ai_config::{Config, DEFAULT_MODEL};

/// Reasoning effort forwarded to the provider when reasoning is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Resolved engine settings; env > config > defaults.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub api_key: String,
    pub default_model: String,
    pub show_reasoning: bool,
    pub reasoning_effort: ReasoningEffort,
    pub debug_api: bool,
}

/// Reasoning-toggle semantics: a present variable enables the display
/// unless it spells an explicit "off".  A set-but-empty variable counts as
/// enabled; only an absent one falls back to the config value.
fn env_toggle_enabled(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "0" | "false" | "no")
}

/// Debug-flag semantics: any non-empty value enables it.
fn truthy(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "" | "0" | "false" | "no")
}

/// Resolve the effective model: explicit override > config > default.
pub fn resolve_model(config: &Config, override_model: Option<&str>) -> String {
    if let Some(model) = override_model.map(str::trim).filter(|m| !m.is_empty()) {
        return model.to_string();
    }
    let configured = config.model.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }
    DEFAULT_MODEL.to_string()
}

/// Build [`EngineSettings`] from config plus the process environment.
pub fn build_engine_settings(config: &Config) -> anyhow::Result<EngineSettings> {
    build_engine_settings_with(config, |key| std::env::var(key).ok())
}

/// Same as [`build_engine_settings`] with an injectable variable source.
pub fn build_engine_settings_with(
    config: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<EngineSettings> {
    let api_key = if !config.openai_api_key.trim().is_empty() {
        config.openai_api_key.trim().to_string()
    } else if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
        key
    } else {
        bail!("OpenAI API key not configured");
    };

    // `show_thinking` is the legacy spelling in both the env and the file.
    let env_toggle = lookup("AI_SHOW_REASONING").or_else(|| lookup("AI_SHOW_THINKING"));
    let show_reasoning = match env_toggle {
        Some(value) => env_toggle_enabled(&value),
        None => config
            .show_reasoning
            .or(config.show_thinking)
            .unwrap_or(true),
    };

    let reasoning_effort = lookup("AI_REASONING_EFFORT")
        .as_deref()
        .and_then(ReasoningEffort::parse)
        .or_else(|| {
            config
                .reasoning_effort
                .as_deref()
                .and_then(ReasoningEffort::parse)
        })
        .unwrap_or_default();

    let debug_api = lookup("AI_DEBUG_REASONING")
        .filter(|v| !v.is_empty())
        .or_else(|| lookup("AI_DEBUG_API"))
        .map(|v| truthy(&v))
        .unwrap_or(false);

    Ok(EngineSettings {
        api_key,
        default_model: resolve_model(config, None),
        show_reasoning,
        reasoning_effort,
        debug_api,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
