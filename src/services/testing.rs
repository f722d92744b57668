// Test doubles shared by the service tests

use crate::models::Message;
use crate::services::providers::{ChunkStream, CompletionBackend, ProviderError};
use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub streaming: bool,
}

/// Backend that replays queued replies and records every call.
/// With an empty queue it echoes the last message content.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<&str>) -> Self {
        let backend = Self::default();
        for r in replies {
            backend.push_reply(Ok(r.to_string()));
        }
        backend
    }

    pub fn push_reply(&self, reply: Result<String, ProviderError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    fn record(&self, messages: &[Message], temperature: f32, streaming: bool) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            temperature,
            streaming,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default()))
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        self.record(messages, temperature, false)
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<ChunkStream, ProviderError> {
        let reply = self.record(messages, temperature, true)?;
        // Two chunks so callers see more than one item.
        let mid = reply
            .char_indices()
            .nth(reply.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(reply.len());
        let (a, b) = reply.split_at(mid);
        let chunks: Vec<Result<String, ProviderError>> = vec![Ok(a.to_string()), Ok(b.to_string())];
        Ok(Box::pin(stream::iter(chunks)))
    }
}
