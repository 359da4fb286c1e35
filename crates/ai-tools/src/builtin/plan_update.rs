// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::plan::{TodoItem, TodoStatus};
use crate::runtime::ToolRuntime;
use crate::tool::{Tool, ToolReply};

/// Structured todo management with replace-or-merge semantics.
pub struct PlanUpdateTool;

fn parse_todo(raw: &Value) -> Result<TodoItem, String> {
    let id = raw
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("error: todo id must be a non-empty string")?;
    let content = raw
        .get("content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("error: todo '{id}' missing content"))?;
    let status_raw = raw
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("error: todo '{id}' missing status"))?;
    let status = TodoStatus::parse(status_raw)
        .ok_or_else(|| format!("error: invalid status '{status_raw}' for todo '{id}'"))?;
    let priority = raw
        .get("priority")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(TodoItem {
        id: id.to_string(),
        content: content.to_string(),
        status,
        priority,
    })
}

#[async_trait]
impl Tool for PlanUpdateTool {
    fn name(&self) -> &str {
        "plan_update"
    }

    fn description(&self) -> &str {
        "Replace or merge the structured todo list tracking the current task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "Todo items; with replace=false, merged into the existing list by id",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            },
                            "priority": {"type": "string"}
                        },
                        "required": ["id", "content", "status"]
                    }
                },
                "summary": {"type": "string", "description": "Optional plan summary"},
                "replace": {
                    "type": "boolean",
                    "description": "Overwrite the list (default true) instead of merging by id"
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, rt: &ToolRuntime, args: &Map<String, Value>) -> ToolReply {
        let Some(raw_todos) = args.get("todos").and_then(|v| v.as_array()) else {
            return ToolReply::text("error: missing todos array");
        };

        let mut todos: Vec<TodoItem> = Vec::with_capacity(raw_todos.len());
        let mut seen: HashSet<String> = HashSet::new();
        for raw in raw_todos {
            let todo = match parse_todo(raw) {
                Ok(todo) => todo,
                Err(message) => return ToolReply::text(message),
            };
            if !seen.insert(todo.id.clone()) {
                return ToolReply::text(format!("error: duplicate todo id '{}'", todo.id));
            }
            todos.push(todo);
        }

        let replace = args
            .get("replace")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let count = todos.len();

        let rendered = {
            let mut plan = rt.plan.lock().unwrap();
            if replace {
                plan.replace_todos(todos);
            } else {
                plan.merge_todos(todos);
            }
            if let Some(summary) = args.get("summary").and_then(|v| v.as_str()) {
                plan.summary = Some(summary.to_string());
            }
            plan.render()
        };
        rt.renderer.display_plan_update(&rendered, None);

        ToolReply::text(format!(
            "plan updated: {count} todo(s) {}",
            if replace { "replaced" } else { "merged" }
        ))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
