// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::builtin;
use crate::runtime::{ToolRuntime, JFDI_REQUIRED_MESSAGE};
use crate::tool::{Tool, ToolReply};

/// A tool schema for the provider request.  Mirrors the model crate's
/// definition shape but keeps this crate independent of it.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry holding all callable tools, in wire order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.push(Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Schemas in registration order (the order is part of the wire
    /// contract with the provider and kept stable across turns).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// The single dispatch choke point: argument parsing, unknown-tool
    /// handling, and the mutation gate all live here so every tool —
    /// current and future — inherits them.
    pub async fn dispatch(&self, rt: &ToolRuntime, name: &str, raw_args: &Value) -> ToolReply {
        let args = match parse_arguments(raw_args, name) {
            Ok(args) => args,
            Err(message) => return ToolReply::text(message),
        };

        let Some(tool) = self.get(name) else {
            return ToolReply::text(format!("error: unknown tool '{name}'"));
        };

        if tool.requires_unlock() && !rt.jfdi_enabled {
            debug!(tool = name, "mutation gate blocked tool call");
            return ToolReply::text(JFDI_REQUIRED_MESSAGE);
        }

        debug!(tool = name, "dispatching tool call");
        tool.execute(rt, &args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool arguments arrive as either a JSON object or a JSON-encoded string.
/// Anything else degrades to an empty object; a string that fails to parse
/// is reported back to the model verbatim.
pub fn parse_arguments(raw: &Value, tool_name: &str) -> Result<Map<String, Value>, String> {
    match raw {
        Value::String(text) => {
            if text.is_empty() {
                return Ok(Map::new());
            }
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Ok(Map::new()),
                Err(e) => Err(format!("error: invalid arguments JSON ({tool_name}: {e})")),
            }
        }
        Value::Object(map) => Ok(map.clone()),
        _ => Ok(Map::new()),
    }
}

/// The standard registry with every tool of the wire contract, in wire
/// order.  `write` and `write_file` are one implementation under two names.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(builtin::read_file::ReadFileTool);
    registry.register(builtin::write::WriteTool::write());
    registry.register(builtin::write::WriteTool::write_file());
    registry.register(builtin::apply_patch::ApplyPatchTool);
    registry.register(builtin::shell::ShellTool);
    registry.register(builtin::update_plan::UpdatePlanTool);
    registry.register(builtin::plan_update::PlanUpdateTool);
    registry.register(builtin::glob::GlobTool);
    registry.register(builtin::search_content::SearchContentTool);
    registry.register(builtin::unit_test_coverage::UnitTestCoverageTool);
    registry
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
