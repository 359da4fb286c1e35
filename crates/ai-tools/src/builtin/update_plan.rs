// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

/// Freeform plan notes.  The structured counterpart is `plan_update`.
pub struct UpdatePlanTool;

#[async_trait]
impl Tool for UpdatePlanTool {
    fn name(&self) -> &str {
        "update_plan"
    }

    fn description(&self) -> &str {
        "Update the running task plan that the assistant is following."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": {"type": "string", "description": "New plan outline"},
                "explanation": {
                    "type": "string",
                    "description": "Optional reasoning or notes"
                }
            },
            "required": ["plan"]
        })
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let plan = args
            .get("plan")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let explanation = args
            .get("explanation")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        rt.plan.lock().unwrap().summary = Some(plan.clone());
        rt.renderer
            .display_plan_update(&plan, explanation.as_deref());

        let mut response = String::from("plan updated");
        if let Some(notes) = &explanation {
            response.push_str(&format!("; notes: {notes}"));
        }
        ToolReply::text(response)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
