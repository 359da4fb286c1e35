// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Lifecycle of one todo entry.  Unknown spellings are rejected at the tool
/// boundary, never silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// The running task plan.  Mutated only by the plan tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PlanState {
    /// Replace the todo list wholesale.
    pub fn replace_todos(&mut self, todos: Vec<TodoItem>) {
        self.todos = todos;
    }

    /// Merge `updates` by id: existing ids keep their position and take the
    /// update's content/status/priority; unseen ids append in update order.
    pub fn merge_todos(&mut self, updates: Vec<TodoItem>) {
        for update in updates {
            match self.todos.iter_mut().find(|t| t.id == update.id) {
                Some(existing) => *existing = update,
                None => self.todos.push(update),
            }
        }
    }

    pub fn clear(&mut self) {
        self.todos.clear();
        self.summary = None;
    }

    /// One-line-per-todo rendering for the terminal.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for todo in &self.todos {
            let mark = match todo.status {
                TodoStatus::Pending => "[ ]",
                TodoStatus::InProgress => "[~]",
                TodoStatus::Completed => "[x]",
            };
            lines.push(format!("{mark} {} — {}", todo.id, todo.content));
        }
        if let Some(summary) = &self.summary {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push(summary.clone());
        }
        lines.join("\n")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn todo(id: &str, content: &str, status: TodoStatus) -> TodoItem {
        TodoItem {
            id: id.into(),
            content: content.into(),
            status,
            priority: None,
        }
    }

    #[test]
    fn status_parse_accepts_only_known_values() {
        assert_eq!(TodoStatus::parse("pending"), Some(TodoStatus::Pending));
        assert_eq!(TodoStatus::parse("in_progress"), Some(TodoStatus::InProgress));
        assert_eq!(TodoStatus::parse("completed"), Some(TodoStatus::Completed));
        assert_eq!(TodoStatus::parse("done"), None);
        assert_eq!(TodoStatus::parse("Pending"), None);
    }

    #[test]
    fn merge_updates_existing_and_appends_new_in_order() {
        let mut plan = PlanState::default();
        plan.replace_todos(vec![
            todo("a", "A", TodoStatus::Pending),
            todo("b", "B", TodoStatus::Pending),
        ]);
        plan.merge_todos(vec![
            todo("b", "B2", TodoStatus::InProgress),
            todo("c", "C", TodoStatus::Pending),
        ]);

        let ids: Vec<&str> = plan.todos.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(plan.todos[0].status, TodoStatus::Pending);
        assert_eq!(plan.todos[1].content, "B2");
        assert_eq!(plan.todos[1].status, TodoStatus::InProgress);
        assert_eq!(plan.todos[2].status, TodoStatus::Pending);
    }

    #[test]
    fn replace_discards_previous_list() {
        let mut plan = PlanState::default();
        plan.replace_todos(vec![todo("a", "A", TodoStatus::Pending)]);
        plan.replace_todos(vec![todo("z", "Z", TodoStatus::Completed)]);
        assert_eq!(plan.todos.len(), 1);
        assert_eq!(plan.todos[0].id, "z");
    }

    #[test]
    fn render_shows_status_marks_and_summary() {
        let mut plan = PlanState::default();
        plan.replace_todos(vec![
            todo("1", "first", TodoStatus::Completed),
            todo("2", "second", TodoStatus::InProgress),
        ]);
        plan.summary = Some("halfway there".into());
        let text = plan.render();
        assert!(text.contains("[x] 1 — first"));
        assert!(text.contains("[~] 2 — second"));
        assert!(text.ends_with("halfway there"));
    }

    #[test]
    fn serde_round_trip_preserves_statuses() {
        let mut plan = PlanState::default();
        plan.replace_todos(vec![todo("a", "A", TodoStatus::InProgress)]);
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("in_progress"), "{json}");
        let back: PlanState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
