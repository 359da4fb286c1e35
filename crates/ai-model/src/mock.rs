// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Scripted provider for tests: each call replays the next pre-recorded
//! event sequence and records the request it was given.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::ResponsesApi;
use crate::request::ResponsesRequest;
use crate::stream::{EventStream, FinalResponse, StreamEvent};

#[derive(Default)]
pub struct ScriptedClient {
    turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    create_texts: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ResponsesRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full streaming turn.  Turns are consumed in FIFO order; a
    /// call past the end of the script yields a single empty `Completed`.
    pub fn push_turn(&self, events: Vec<StreamEvent>) {
        self.turns.lock().unwrap().push_back(events);
    }

    /// Convenience: a turn whose only event is `Completed { response }`.
    pub fn push_completed(&self, response: FinalResponse) {
        self.push_turn(vec![StreamEvent::Completed { response }]);
    }

    /// Queue a `create` (non-streaming) reply.
    pub fn push_create_text(&self, text: impl Into<String>) {
        self.create_texts.lock().unwrap().push_back(text.into());
    }

    /// Every request this client has received, in call order.
    pub fn requests(&self) -> Vec<ResponsesRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of streaming + create calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponsesApi for ScriptedClient {
    async fn stream(&self, req: &ResponsesRequest) -> anyhow::Result<EventStream> {
        self.requests.lock().unwrap().push(req.clone());
        let events = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                vec![StreamEvent::Completed {
                    response: FinalResponse::default(),
                }]
            });
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }

    async fn create(&self, req: &ResponsesRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(req.clone());
        Ok(self
            .create_texts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
