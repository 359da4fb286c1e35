// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

pub const APP_NAME: &str = "ai";
pub const CONFIG_BASENAME: &str = "config.json";

/// XDG-aware location of the configuration file.
///
/// `$XDG_CONFIG_HOME/ai/config.json` when the variable is set, otherwise
/// `~/.config/ai/config.json`.
pub fn config_path() -> PathBuf {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config"),
    };
    base.join(APP_NAME).join(CONFIG_BASENAME)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_ends_with_app_and_basename() {
        let p = config_path();
        assert!(p.ends_with("ai/config.json"), "unexpected path: {p:?}");
    }
}
