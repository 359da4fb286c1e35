// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::request::ResponsesRequest;
use crate::stream::{drain_complete_sse_lines, EventStream};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The narrow surface the agent loop needs from the provider.
#[async_trait]
pub trait ResponsesApi: Send + Sync {
    /// Open a streaming request.  The returned stream is cancelled by
    /// dropping it.
    async fn stream(&self, req: &ResponsesRequest) -> anyhow::Result<EventStream>;

    /// Single-shot request returning the coalesced output text (edit mode).
    async fn create(&self, req: &ResponsesRequest) -> anyhow::Result<String>;
}

/// HTTP client for the Responses endpoint.
pub struct ResponsesClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl ResponsesClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    async fn post(&self, req: &ResponsesRequest, stream: bool) -> anyhow::Result<reqwest::Response> {
        let mut body = serde_json::to_value(req).context("serializing request")?;
        body["stream"] = Value::Bool(stream);

        debug!(
            model = %req.model,
            items = req.input.len(),
            tools = req.tools.len(),
            stream,
            "sending responses request"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("responses request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("provider error {status}: {text}");
        }
        Ok(resp)
    }
}

#[async_trait]
impl ResponsesApi for ResponsesClient {
    async fn stream(&self, req: &ResponsesRequest) -> anyhow::Result<EventStream> {
        let resp = self.post(req, true).await?;
        let byte_stream = resp.bytes_stream();
        // SSE events can split across TCP packets; keep a line buffer across
        // chunks and emit events only for complete lines.
        let event_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let events = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);
        Ok(Box::pin(event_stream))
    }

    async fn create(&self, req: &ResponsesRequest) -> anyhow::Result<String> {
        let resp = self.post(req, false).await?;
        let body: Value = resp.json().await.context("decoding response body")?;
        Ok(coalesce_output_text(&body))
    }
}

/// Pull every text fragment out of a non-streaming response body.
///
/// Prefers the flat `output_text` convenience field; otherwise walks
/// `output`/`choices`/`content` arrays collecting `text` values, which
/// tolerates both Responses and chat-completion shaped payloads.
pub fn coalesce_output_text(body: &Value) -> String {
    if let Some(text) = body.get("output_text").and_then(|t| t.as_str()) {
        if !text.trim().is_empty() {
            return text.to_string();
        }
    }

    fn walk(v: &Value, out: &mut String) {
        match v {
            Value::String(s) => out.push_str(s),
            Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            Value::Object(map) => {
                for key in ["output", "choices", "content"] {
                    if let Some(nested) = map.get(key) {
                        walk(nested, out);
                    }
                }
                if let Some(Value::String(text)) = map.get("text") {
                    out.push_str(text);
                }
            }
            _ => {}
        }
    }

    let mut out = String::new();
    walk(body, &mut out);
    out.trim().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
