// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Transcript items ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block inside a message item's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    InputText { text: String },
    OutputText { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Serde tag pinning `"type": "function_call"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FunctionCallTag {
    #[serde(rename = "function_call")]
    FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallItem {
    #[serde(rename = "type")]
    pub tag: FunctionCallTag,
    pub call_id: String,
    pub name: String,
    /// JSON-encoded argument object, forwarded verbatim.
    pub arguments: String,
    /// Provider item id, echoed back when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FunctionCallOutputTag {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutputItem {
    #[serde(rename = "type")]
    pub tag: FunctionCallOutputTag,
    pub call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReasoningTag {
    #[serde(rename = "reasoning")]
    Reasoning,
}

/// An opaque reasoning block.  Only `{type, id, summary, content}` are
/// preserved; everything else the provider sent is dropped before the item
/// is echoed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    #[serde(rename = "type")]
    pub tag: ReasoningTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// One record in the conversation transcript.
///
/// Untagged: message items are recognized by their `role` field, the other
/// variants by their pinned `type` tags, so round-tripping through JSON is
/// unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Message(MessageItem),
    FunctionCall(FunctionCallItem),
    FunctionCallOutput(FunctionCallOutputItem),
    Reasoning(ReasoningItem),
}

impl Item {
    pub fn user(text: impl Into<String>) -> Self {
        Item::Message(MessageItem {
            role: Role::User,
            content: vec![ContentBlock::InputText { text: text.into() }],
        })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Item::Message(MessageItem {
            role: Role::Assistant,
            content: vec![ContentBlock::OutputText { text: text.into() }],
        })
    }

    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
        raw_id: Option<String>,
    ) -> Self {
        Item::FunctionCall(FunctionCallItem {
            tag: FunctionCallTag::FunctionCall,
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            id: raw_id,
        })
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Item::FunctionCallOutput(FunctionCallOutputItem {
            tag: FunctionCallOutputTag::FunctionCallOutput,
            call_id: call_id.into(),
            output: output.into(),
        })
    }

    /// Build a reasoning item from a raw provider payload, keeping only the
    /// preserved fields.
    pub fn reasoning_from_value(value: &Value) -> Self {
        Item::Reasoning(ReasoningItem {
            tag: ReasoningTag::Reasoning,
            id: value.get("id").and_then(|v| v.as_str()).map(str::to_string),
            summary: value.get("summary").filter(|v| !v.is_null()).cloned(),
            content: value.get("content").filter(|v| !v.is_null()).cloned(),
        })
    }

    /// Text of a message item with the given role, if that is what this is.
    fn message_text(&self, role: Role) -> Option<String> {
        match self {
            Item::Message(m) if m.role == role => Some(
                m.content
                    .iter()
                    .map(|b| match b {
                        ContentBlock::InputText { text } | ContentBlock::OutputText { text } => {
                            text.as_str()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(""),
            ),
            _ => None,
        }
    }

    pub fn as_user_text(&self) -> Option<String> {
        self.message_text(Role::User)
    }

    pub fn as_assistant_text(&self) -> Option<String> {
        self.message_text(Role::Assistant)
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, Item::Message(m) if m.role == Role::User)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_item_serializes_to_wire_shape() {
        let item = Item::user("hello");
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            json!({"role": "user", "content": [{"type": "input_text", "text": "hello"}]})
        );
    }

    #[test]
    fn assistant_item_serializes_to_wire_shape() {
        let item = Item::assistant("hi");
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            json!({"role": "assistant", "content": [{"type": "output_text", "text": "hi"}]})
        );
    }

    #[test]
    fn function_call_serializes_with_type_tag() {
        let item = Item::function_call("c1", "shell", "{}", Some("item_9".into()));
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["type"], "function_call");
        assert_eq!(v["call_id"], "c1");
        assert_eq!(v["name"], "shell");
        assert_eq!(v["arguments"], "{}");
        assert_eq!(v["id"], "item_9");
    }

    #[test]
    fn function_call_omits_missing_raw_id() {
        let item = Item::function_call("c1", "shell", "{}", None);
        let v = serde_json::to_value(&item).unwrap();
        assert!(v.get("id").is_none());
    }

    #[test]
    fn function_call_output_serializes_to_wire_shape() {
        let item = Item::function_call_output("c1", "done");
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(
            v,
            json!({"type": "function_call_output", "call_id": "c1", "output": "done"})
        );
    }

    #[test]
    fn reasoning_from_value_keeps_only_preserved_fields() {
        let raw = json!({
            "type": "reasoning",
            "id": "rs_1",
            "summary": [{"type": "summary_text", "text": "thinking"}],
            "encrypted_content": "SECRET",
            "status": "completed"
        });
        let item = Item::reasoning_from_value(&raw);
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["type"], "reasoning");
        assert_eq!(v["id"], "rs_1");
        assert!(v.get("summary").is_some());
        assert!(v.get("encrypted_content").is_none());
        assert!(v.get("status").is_none());
        assert!(v.get("content").is_none());
    }

    #[test]
    fn items_round_trip_through_json() {
        let items = vec![
            Item::user("u"),
            Item::reasoning_from_value(&json!({"id": "r1", "summary": []})),
            Item::function_call("c1", "read_file", r#"{"path":"x"}"#, None),
            Item::function_call_output("c1", "contents"),
            Item::assistant("a"),
        ];
        let text = serde_json::to_string(&items).unwrap();
        let back: Vec<Item> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, items);
    }

    #[test]
    fn text_accessors_distinguish_roles() {
        let user = Item::user("question");
        let assistant = Item::assistant("answer");
        assert_eq!(user.as_user_text().as_deref(), Some("question"));
        assert!(user.as_assistant_text().is_none());
        assert_eq!(assistant.as_assistant_text().as_deref(), Some("answer"));
        assert!(assistant.as_user_text().is_none());
        assert!(user.is_user_message());
        assert!(!assistant.is_user_message());
    }
}
