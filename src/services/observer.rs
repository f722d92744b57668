// Completion Observer
// Structured event sink injected into the completion client and composer

use crate::models::{Message, Stage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug)]
pub enum CompletionEvent<'a> {
    Request {
        model: &'a str,
        base_url: &'a str,
        temperature: f32,
        max_tokens: Option<u32>,
        messages: &'a [Message],
        stream: bool,
    },
    Retry {
        model: &'a str,
        attempt: u32,
        error: &'a str,
    },
    Response {
        id: Option<&'a str>,
        model: &'a str,
        created: Option<i64>,
        latency_ms: u64,
        usage: Option<&'a Usage>,
        raw_chars: usize,
        filtered_chars: usize,
    },
    StreamFinished {
        model: &'a str,
        chunks: usize,
        filtered_chars: usize,
        latency_ms: u64,
    },
    Failure {
        model: &'a str,
        stream: bool,
        error: &'a str,
    },
    PassThrough {
        stage: Stage,
        chars: usize,
        streaming: bool,
    },
}

pub trait CompletionObserver: Send + Sync {
    fn on_event(&self, event: &CompletionEvent<'_>);
}

/// Default sink: one `tracing` event per completion event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CompletionObserver for NoopObserver {
    fn on_event(&self, _event: &CompletionEvent<'_>) {}
}

pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

impl CompletionObserver for TracingObserver {
    fn on_event(&self, event: &CompletionEvent<'_>) {
        match event {
            CompletionEvent::Request {
                model,
                base_url,
                temperature,
                max_tokens,
                messages,
                stream,
            } => {
                info!(
                    model = %model,
                    base_url = %base_url,
                    temperature = *temperature,
                    max_tokens = ?max_tokens,
                    messages = messages.len(),
                    stream = *stream,
                    "completion.request"
                );
                for (idx, msg) in messages.iter().enumerate() {
                    debug!(
                        idx,
                        role = msg.role.as_str(),
                        content = %preview(&msg.content, PREVIEW_CHARS),
                        "completion.request.message"
                    );
                }
            }
            CompletionEvent::Retry { model, attempt, error } => {
                warn!(model = %model, attempt = *attempt, error = %error, "completion.retry");
            }
            CompletionEvent::Response {
                id,
                model,
                created,
                latency_ms,
                usage,
                raw_chars,
                filtered_chars,
            } => {
                info!(
                    id = id.unwrap_or("-"),
                    model = %model,
                    created = ?created,
                    latency_ms = *latency_ms,
                    prompt_tokens = usage.map(|u| u.prompt_tokens),
                    completion_tokens = usage.map(|u| u.completion_tokens),
                    total_tokens = usage.map(|u| u.total_tokens),
                    raw_chars = *raw_chars,
                    filtered_chars = *filtered_chars,
                    "completion.response"
                );
                if raw_chars != filtered_chars {
                    info!(model = %model, "completion.thinking_tags_removed");
                }
            }
            CompletionEvent::StreamFinished {
                model,
                chunks,
                filtered_chars,
                latency_ms,
            } => {
                info!(
                    model = %model,
                    chunks = *chunks,
                    filtered_chars = *filtered_chars,
                    latency_ms = *latency_ms,
                    "completion.stream_finished"
                );
            }
            CompletionEvent::Failure { model, stream, error } => {
                warn!(model = %model, stream = *stream, error = %error, "completion.failed");
            }
            CompletionEvent::PassThrough { stage, chars, streaming } => {
                info!(stage = %stage, chars = *chars, streaming = *streaming, "stage.pass_through");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records a short tag per event for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<String>>,
    }

    impl CompletionObserver for RecordingObserver {
        fn on_event(&self, event: &CompletionEvent<'_>) {
            let tag = match event {
                CompletionEvent::Request { stream, .. } => format!("request(stream={})", stream),
                CompletionEvent::Retry { attempt, .. } => format!("retry({})", attempt),
                CompletionEvent::Response { .. } => "response".to_string(),
                CompletionEvent::StreamFinished { chunks, .. } => format!("stream_finished({})", chunks),
                CompletionEvent::Failure { .. } => "failure".to_string(),
                CompletionEvent::PassThrough { stage, .. } => format!("pass_through({})", stage),
            };
            self.events.lock().unwrap().push(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_and_flattens() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("line one\nline two", 8), "line one...");
        assert_eq!(preview("汉字汉字", 2), "汉字...");
    }

    #[test]
    fn test_usage_defaults_missing_fields() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens": 12}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.total_tokens, 0);
    }
}
