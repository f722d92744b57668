// AI Provider Service
// Chat-completion client with blocking and streaming calls

use crate::models::{Message, ModelConfig};
use crate::services::observer::{CompletionEvent, CompletionObserver, TracingObserver, Usage};
use crate::services::think_filter::{filter_thinking, strip_thinking_tags};
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MAX_RETRIES: u32 = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Unreadable or unsupported input document.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Missing content in response")]
    MissingContent,
    #[error("Stream terminated: {0}")]
    StreamTerminated(String),
}

impl ProviderError {
    /// Upstream call failures the session layer may choose to retry.
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_)
                | ProviderError::Api { .. }
                | ProviderError::InvalidResponse(_)
                | ProviderError::MissingContent
        )
    }
}

/// Filtered output chunks of one streaming call. Single consumer; dropping it
/// closes the underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Full response text with thinking spans removed.
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError>;

    async fn stream_complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChunkStream, ProviderError>;
}

// ============ Wire Types ============

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Done,
    Skip,
    Invalid(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        // event:/id:/retry: fields carry nothing we use
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                let message = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| err.to_string());
                return SseLine::Invalid(format!("upstream error: {}", message));
            }
            match chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta)
                .and_then(|d| d.content)
            {
                Some(text) if !text.is_empty() => SseLine::Content(text),
                _ => SseLine::Skip,
            }
        }
        Err(e) => SseLine::Invalid(format!("malformed stream event: {} data={}", e, data)),
    }
}

/// Turn a raw SSE byte stream into the sequence of delta contents.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
pub(crate) fn sse_content_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let next = match tokio::time::timeout(STREAM_IDLE_TIMEOUT, bytes.next()).await {
                Ok(next) => next,
                Err(_) => {
                    yield Err(ProviderError::StreamTerminated(format!(
                        "no data for {}s",
                        STREAM_IDLE_TIMEOUT.as_secs()
                    )));
                    return;
                }
            };

            let Some(item) = next else { break };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(ProviderError::StreamTerminated(e.to_string()));
                    return;
                }
            };

            pending.extend_from_slice(chunk.as_ref());
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Content(text) => yield Ok(text),
                    SseLine::Done => return,
                    SseLine::Skip => {}
                    SseLine::Invalid(msg) => {
                        yield Err(ProviderError::StreamTerminated(msg));
                        return;
                    }
                }
            }
        }

        // Final line without a trailing newline.
        if !pending.is_empty() {
            match parse_sse_line(&String::from_utf8_lossy(&pending)) {
                SseLine::Content(text) => yield Ok(text),
                SseLine::Invalid(msg) => yield Err(ProviderError::StreamTerminated(msg)),
                SseLine::Done | SseLine::Skip => {}
            }
        }
    }
}

fn is_connection_level(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

// ============ Client ============

/// HTTP chat-completion client bound to one stage's [`ModelConfig`].
pub struct CompletionClient {
    client: Client,
    config: ModelConfig,
    observer: Arc<dyn CompletionObserver>,
}

impl CompletionClient {
    pub fn new(config: ModelConfig) -> Result<Self, ProviderError> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        config: ModelConfig,
        observer: Arc<dyn CompletionObserver>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            model = %config.model(),
            base_url = %config.base_url(),
            "completion_client.initialized"
        );

        Ok(Self {
            client,
            config,
            observer,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        temperature: f32,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> ChatRequest<'a> {
        self.observer.on_event(&CompletionEvent::Request {
            model: self.config.model(),
            base_url: self.config.base_url(),
            temperature,
            max_tokens,
            messages,
            stream,
        });

        ChatRequest {
            model: self.config.model(),
            messages,
            temperature,
            max_tokens,
            stream,
        }
    }

    /// Send with bounded retries for connection-level failures. Non-2xx
    /// statuses are returned as `Api` errors and never retried.
    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let url = self.config.chat_completions_url();
        let mut attempt: u32 = 0;

        let response = loop {
            let mut builder = self
                .client
                .post(&url)
                .bearer_auth(self.config.api_key())
                .json(request);
            if !request.stream {
                builder = builder.timeout(REQUEST_TIMEOUT);
            }

            match builder.send().await {
                Ok(response) => break response,
                Err(e) if attempt < MAX_RETRIES && is_connection_level(&e) => {
                    attempt += 1;
                    self.observer.on_event(&CompletionEvent::Retry {
                        model: self.config.model(),
                        attempt,
                        error: &e.to_string(),
                    });
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(ProviderError::Http(e)),
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response)
    }

    async fn complete_inner(
        &self,
        request: &ChatRequest<'_>,
        start: Instant,
    ) -> Result<String, ProviderError> {
        let response = self.send(request).await?;
        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let raw = data
            .choices
            .first()
            .ok_or(ProviderError::MissingContent)?
            .message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        let filtered = strip_thinking_tags(&raw);

        self.observer.on_event(&CompletionEvent::Response {
            id: data.id.as_deref(),
            model: data.model.as_deref().unwrap_or(self.config.model()),
            created: data.created,
            latency_ms: start.elapsed().as_millis() as u64,
            usage: data.usage.as_ref(),
            raw_chars: raw.chars().count(),
            filtered_chars: filtered.chars().count(),
        });

        Ok(filtered)
    }

    fn report_failure(&self, stream: bool, error: &ProviderError) {
        self.observer.on_event(&CompletionEvent::Failure {
            model: self.config.model(),
            stream,
            error: &error.to_string(),
        });
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(messages, temperature, max_tokens, false);
        let start = Instant::now();

        match self.complete_inner(&request, start).await {
            Ok(text) => Ok(text),
            Err(e) => {
                self.report_failure(false, &e);
                Err(e)
            }
        }
    }

    async fn stream_complete(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChunkStream, ProviderError> {
        let request = self.build_request(messages, temperature, max_tokens, true);
        let start = Instant::now();

        let response = match self.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.report_failure(true, &e);
                return Err(e);
            }
        };

        let filtered = filter_thinking(sse_content_stream(response.bytes_stream()));
        let observer = Arc::clone(&self.observer);
        let model = self.config.model().to_string();

        let stream = async_stream::stream! {
            let mut filtered = Box::pin(filtered);
            let mut chunks = 0usize;
            let mut filtered_chars = 0usize;

            while let Some(item) = filtered.next().await {
                match item {
                    Ok(chunk) => {
                        chunks += 1;
                        filtered_chars += chunk.chars().count();
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        observer.on_event(&CompletionEvent::Failure {
                            model: &model,
                            stream: true,
                            error: &e.to_string(),
                        });
                        yield Err(e);
                        return;
                    }
                }
            }

            observer.on_event(&CompletionEvent::StreamFinished {
                model: &model,
                chunks,
                filtered_chars,
                latency_ms: start.elapsed().as_millis() as u64,
            });
        };

        Ok(Box::pin(stream))
    }
}

/// Drain a chunk stream into one string. Fails on the first stream error.
pub async fn collect_stream(mut stream: ChunkStream) -> Result<String, ProviderError> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}
