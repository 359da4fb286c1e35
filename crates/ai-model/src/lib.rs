// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire types and streaming adapter for the Responses provider.
//!
//! The transcript [`Item`] sum type serializes to the exact shapes the
//! provider expects; the adapter turns the provider's SSE event stream into
//! the small [`StreamEvent`] vocabulary the agent loop consumes.

mod client;
mod items;
mod mock;
mod request;
mod stream;

pub use client::{ResponsesApi, ResponsesClient, DEFAULT_BASE_URL};
pub use items::{ContentBlock, FunctionCallItem, FunctionCallOutputItem, Item, MessageItem, ReasoningItem, Role};
pub use mock::ScriptedClient;
pub use request::{ReasoningParams, ResponsesRequest, ToolDefinition};
pub use stream::{EventStream, FinalResponse, OutputItem, StreamEvent};
