// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::items::Item;

/// A tool schema advertised to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".into(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The `reasoning` request block, sent only when reasoning display is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningParams {
    /// "low" | "medium" | "high".
    pub effort: String,
    pub summary: String,
}

impl ReasoningParams {
    pub fn with_effort(effort: impl Into<String>) -> Self {
        Self {
            effort: effort.into(),
            summary: "auto".into(),
        }
    }
}

/// A full request to the Responses endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<Item>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningParams>,
}

impl ResponsesRequest {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>, input: Vec<Item>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            input,
            tools: Vec::new(),
            tool_choice: "auto".into(),
            stream: false,
            reasoning: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Option<ReasoningParams>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
