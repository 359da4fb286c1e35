// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod paths;
mod schema;

pub use loader::{load_config, save_config, DEFAULT_DOG_WHISTLE, DEFAULT_MODEL};
pub use paths::{config_path, APP_NAME, CONFIG_BASENAME};
pub use schema::{Config, ContextSettings};
