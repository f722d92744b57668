// Prompt Composer
// Builds stage message lists and applies the language pass-through policy

use crate::models::{Message, ModelConfig, Stage};
use crate::services::observer::{CompletionEvent, CompletionObserver, TracingObserver};
use crate::services::prompts::{instruction_suffix, wrap_segment, StagePrompts};
use crate::services::providers::{
    collect_stream, ChunkStream, CompletionBackend, CompletionClient, ProviderError, DEFAULT_TEMPERATURE,
};
use crate::services::text_processor::is_dominant_chinese;
use futures_util::stream;
use std::sync::Arc;

/// Result of processing one segment: a complete string for blocking calls,
/// a chunk stream for streaming ones.
pub enum StageOutput {
    Text(String),
    Stream(ChunkStream),
}

impl StageOutput {
    pub async fn into_text(self) -> Result<String, ProviderError> {
        match self {
            StageOutput::Text(text) => Ok(text),
            StageOutput::Stream(stream) => collect_stream(stream).await,
        }
    }
}

impl std::fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            StageOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Whether the stage should skip the model and return the segment as-is.
///
/// `polish` is tuned for English and skips Chinese-dominant text; `enhance`
/// is tuned for Chinese and skips everything else. `emotion_polish` handles
/// both languages and never skips.
pub fn should_pass_through(stage: Stage, text: &str) -> bool {
    match stage {
        Stage::Polish => is_dominant_chinese(text),
        Stage::Enhance => !is_dominant_chinese(text),
        Stage::EmotionPolish => false,
    }
}

/// `history ++ [system: base prompt + stage suffix, user: wrapped segment]`
pub fn compose_messages(stage: Stage, base_prompt: &str, text: &str, history: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.extend_from_slice(history);
    messages.push(Message::system(format!("{}{}", base_prompt, instruction_suffix(stage))));
    messages.push(Message::user(wrap_segment(stage, text)));
    messages
}

pub struct PromptComposer {
    prompts: StagePrompts,
    temperature: f32,
    max_tokens: Option<u32>,
    observer: Arc<dyn CompletionObserver>,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(StagePrompts::default())
    }
}

impl PromptComposer {
    pub fn new(prompts: StagePrompts) -> Self {
        Self {
            prompts,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn prompts(&self) -> &StagePrompts {
        &self.prompts
    }

    pub fn compose(&self, stage: Stage, text: &str, history: &[Message]) -> Vec<Message> {
        compose_messages(stage, self.prompts.base(stage), text, history)
    }

    /// Run one segment through a stage.
    ///
    /// A pass-through segment makes no backend call: blocking mode returns
    /// the original string, streaming mode a single chunk holding it.
    pub async fn process<B>(
        &self,
        backend: &B,
        stage: Stage,
        text: &str,
        history: &[Message],
        streaming: bool,
    ) -> Result<StageOutput, ProviderError>
    where
        B: CompletionBackend + ?Sized,
    {
        if should_pass_through(stage, text) {
            self.observer.on_event(&CompletionEvent::PassThrough {
                stage,
                chars: text.chars().count(),
                streaming,
            });
            return Ok(if streaming {
                let chunks: Vec<Result<String, ProviderError>> = vec![Ok(text.to_string())];
                StageOutput::Stream(Box::pin(stream::iter(chunks)))
            } else {
                StageOutput::Text(text.to_string())
            });
        }

        let messages = self.compose(stage, text, history);
        if streaming {
            let stream = backend
                .stream_complete(&messages, self.temperature, self.max_tokens)
                .await?;
            Ok(StageOutput::Stream(stream))
        } else {
            let text = backend
                .complete(&messages, self.temperature, self.max_tokens)
                .await?;
            Ok(StageOutput::Text(text))
        }
    }
}

/// Process one segment against an HTTP endpoint described by `model_config`,
/// using the built-in prompts.
pub async fn process(
    stage: Stage,
    segment_text: &str,
    history: &[Message],
    model_config: &ModelConfig,
    streaming: bool,
) -> Result<StageOutput, ProviderError> {
    let client = CompletionClient::new(model_config.clone())?;
    PromptComposer::default()
        .process(&client, stage, segment_text, history, streaming)
        .await
}
