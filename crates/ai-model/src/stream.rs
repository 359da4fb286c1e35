// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Translation of the provider's SSE event family into the internal
//! [`StreamEvent`] vocabulary.
//!
//! Reasoning and assistant text interleave and may arrive in arbitrary order
//! by `(item_id, index)`; every delta carries a stream key of the form
//! `<item_id>:<index>` (assistant) or `<item_id>:summary|text:<index>`
//! (reasoning) so consumers can demultiplex without per-provider knowledge.

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;
use tracing::debug;

/// A stream of adapter events; dropping it aborts the underlying transfer.
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamEvent>> + Send>>;

/// One item of the final `response.output` array, provider order preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    Message {
        id: Option<String>,
        text: String,
    },
    FunctionCall {
        id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    },
    /// Raw reasoning payload; sanitized by the loop before transcript insertion.
    Reasoning(Value),
}

/// The terminal `response` object of a completed stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalResponse {
    pub output: Vec<OutputItem>,
}

impl FinalResponse {
    /// Parse the `response` payload of a `response.completed` event.
    ///
    /// Unknown output item types are skipped; item order is preserved.
    pub fn from_value(v: &Value) -> Self {
        let mut output = Vec::new();
        for item in v.get("output").and_then(|o| o.as_array()).into_iter().flatten() {
            match item.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                "message" => {
                    let text: String = item
                        .get("content")
                        .and_then(|c| c.as_array())
                        .into_iter()
                        .flatten()
                        .filter(|block| {
                            block
                                .get("type")
                                .and_then(|t| t.as_str())
                                .is_some_and(|t| t.ends_with("text"))
                        })
                        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                        .collect();
                    output.push(OutputItem::Message {
                        id: item.get("id").and_then(|i| i.as_str()).map(str::to_string),
                        text,
                    });
                }
                "tool_call" | "function_call" => {
                    let id = item.get("id").and_then(|i| i.as_str()).map(str::to_string);
                    let call_id = item
                        .get("call_id")
                        .and_then(|c| c.as_str())
                        .map(str::to_string)
                        .or_else(|| id.clone());
                    let name = item
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let call_id = call_id.unwrap_or_else(|| format!("tool-{name}"));
                    let arguments = match item.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => "{}".to_string(),
                    };
                    output.push(OutputItem::FunctionCall {
                        id,
                        call_id,
                        name,
                        arguments,
                    });
                }
                "reasoning" => output.push(OutputItem::Reasoning(item.clone())),
                other => debug!(item_type = other, "skipping unknown output item"),
            }
        }
        Self { output }
    }
}

/// The internal event vocabulary the agent loop consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ReasoningDelta { key: String, delta: String },
    ReasoningDone { key: String, text: String },
    OutputTextDelta { key: String, delta: String },
    OutputTextDone {
        key: String,
        item_id: Option<String>,
        text: String,
    },
    Completed { response: FinalResponse },
    Error { message: String },
}

// ─── Stream key assembly ──────────────────────────────────────────────────────

fn index_of(v: &Value, primary: &str) -> u64 {
    v.get(primary)
        .and_then(|i| i.as_u64())
        .or_else(|| v.get("output_index").and_then(|i| i.as_u64()))
        .unwrap_or(0)
}

fn item_id_of(v: &Value, fallback: &str) -> String {
    v.get("item_id")
        .and_then(|i| i.as_str())
        .unwrap_or(fallback)
        .to_string()
}

/// `<item_id>:summary:<summary_index>` or `<item_id>:text:<content_index>`.
pub fn reasoning_key(v: &Value, summary: bool) -> String {
    if summary {
        format!("{}:summary:{}", item_id_of(v, "reasoning"), index_of(v, "summary_index"))
    } else {
        format!("{}:text:{}", item_id_of(v, "reasoning"), index_of(v, "content_index"))
    }
}

/// `<item_id>:<content_index>`.
pub fn assistant_key(v: &Value) -> String {
    format!("{}:{}", item_id_of(v, "assistant"), index_of(v, "content_index"))
}

// ─── SSE parsing ──────────────────────────────────────────────────────────────

/// Parse one complete SSE `data:` line into a [`StreamEvent`].
///
/// Returns `None` for blank lines, `event:` framing lines, unknown event
/// types, and payloads the loop does not need (`function_call_arguments`
/// deltas — the final arguments arrive with `response.completed`).
pub fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<StreamEvent>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let v: Value = serde_json::from_str(data).ok()?;
    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "response.reasoning_text.delta" | "response.reasoning_summary_text.delta" => {
            let delta = v.get("delta").and_then(|d| d.as_str()).unwrap_or("");
            if delta.is_empty() {
                return None;
            }
            let summary = event_type.contains("summary");
            Some(Ok(StreamEvent::ReasoningDelta {
                key: reasoning_key(&v, summary),
                delta: delta.to_string(),
            }))
        }
        "response.reasoning_text.done" | "response.reasoning_summary_text.done" => {
            let summary = event_type.contains("summary");
            Some(Ok(StreamEvent::ReasoningDone {
                key: reasoning_key(&v, summary),
                text: v
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }))
        }
        "response.output_text.delta" => {
            let delta = v.get("delta").and_then(|d| d.as_str()).unwrap_or("");
            if delta.is_empty() {
                return None;
            }
            Some(Ok(StreamEvent::OutputTextDelta {
                key: assistant_key(&v),
                delta: delta.to_string(),
            }))
        }
        "response.output_text.done" => Some(Ok(StreamEvent::OutputTextDone {
            key: assistant_key(&v),
            item_id: v.get("item_id").and_then(|i| i.as_str()).map(str::to_string),
            text: v
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        })),
        "response.completed" => {
            let response = v
                .get("response")
                .map(FinalResponse::from_value)
                .unwrap_or_default();
            Some(Ok(StreamEvent::Completed { response }))
        }
        "response.error" | "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    v.get("error")
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "provider error".into())
                });
            Some(Ok(StreamEvent::Error { message }))
        }
        other => {
            debug!(event_type = other, "ignoring stream event");
            None
        }
    }
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// A single SSE event may be split across TCP chunks; the trailing
/// incomplete line stays in `buf` until the next chunk extends it.
pub fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<StreamEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
