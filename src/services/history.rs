// History Compressor
// Summarizes accumulated session history into a single system record

use crate::models::{Message, Role};
use crate::services::prompts::wrap_compression_corpus;
use crate::services::providers::{CompletionBackend, ProviderError};
use crate::services::text_processor::effective_length;
use tracing::info;

pub const COMPRESSION_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 3000;

const SEGMENT_SEPARATOR: &str = "\n\n---段落分隔---\n\n";

/// When the runner should compress history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub threshold_chars: usize,
    pub enabled: bool,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            threshold_chars: DEFAULT_COMPRESSION_THRESHOLD,
            enabled: true,
        }
    }
}

impl CompressionPolicy {
    pub fn should_compress(&self, history: &[Message]) -> bool {
        self.enabled && !history.is_empty() && history_length(history) > self.threshold_chars
    }
}

/// Sum of effective lengths over all message contents.
pub fn history_length(history: &[Message]) -> usize {
    history.iter().map(|m| effective_length(&m.content)).sum()
}

/// Build the compression request.
///
/// System records (earlier summaries) go first, then assistant outputs.
/// User records hold the original source text and never reach the corpus.
pub fn build_compression_messages(history: &[Message], compression_prompt: &str) -> Vec<Message> {
    let pick = |role: Role| {
        history
            .iter()
            .filter(move |m| m.role == role && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    };
    let parts: Vec<&str> = pick(Role::System).chain(pick(Role::Assistant)).collect();
    let corpus = parts.join(SEGMENT_SEPARATOR);

    vec![
        Message::system(compression_prompt),
        Message::user(wrap_compression_corpus(&corpus)),
    ]
}

/// Ask the model for a compact summary of `history`. Makes exactly one
/// blocking call at the compression temperature.
pub async fn compress<B>(backend: &B, history: &[Message], compression_prompt: &str) -> Result<String, ProviderError>
where
    B: CompletionBackend + ?Sized,
{
    let messages = build_compression_messages(history, compression_prompt);
    let before = history_length(history);
    let summary = backend.complete(&messages, COMPRESSION_TEMPERATURE, None).await?;
    info!(
        records = history.len(),
        before_chars = before,
        after_chars = effective_length(&summary),
        "history.compressed"
    );
    Ok(summary)
}

/// History that replaces the compressed records.
pub fn compact_history(summary: impl Into<String>) -> Vec<Message> {
    vec![Message::system(summary)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeBackend;

    fn sample_history() -> Vec<Message> {
        vec![
            Message::user("SOURCE TEXT ONE"),
            Message::assistant("rewritten one"),
            Message::system("earlier summary"),
            Message::assistant("   "),
            Message::user("SOURCE TEXT TWO"),
            Message::assistant("rewritten two"),
        ]
    }

    #[test]
    fn test_corpus_orders_system_then_assistant() {
        let messages = build_compression_messages(&sample_history(), "compress please");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system("compress please"));

        let expected = wrap_compression_corpus(&format!(
            "earlier summary{sep}rewritten one{sep}rewritten two",
            sep = SEGMENT_SEPARATOR
        ));
        assert_eq!(messages[1], Message::user(expected));
    }

    #[test]
    fn test_user_content_never_reaches_corpus() {
        let messages = build_compression_messages(&sample_history(), "p");
        for m in &messages {
            assert!(!m.content.contains("SOURCE TEXT"));
        }
    }

    #[test]
    fn test_policy_threshold() {
        let history = vec![Message::assistant("a".repeat(10))];
        let policy = CompressionPolicy {
            threshold_chars: 10,
            enabled: true,
        };
        assert!(!policy.should_compress(&history));
        assert!(policy.should_compress(&[Message::assistant("a".repeat(11))]));
        assert!(!CompressionPolicy {
            enabled: false,
            ..policy
        }
        .should_compress(&[Message::assistant("a".repeat(11))]));
        assert!(!policy.should_compress(&[]));
    }

    #[test]
    fn test_history_length_uses_effective_length() {
        let history = vec![Message::assistant("汉字 AI"), Message::system("abc, 1")];
        assert_eq!(history_length(&history), 5);
    }

    #[tokio::test]
    async fn test_compress_single_low_temperature_call() {
        let backend = FakeBackend::with_replies(vec!["summary text"]);
        let summary = compress(&backend, &sample_history(), "p").await.unwrap();

        assert_eq!(summary, "summary text");
        assert_eq!(backend.call_count(), 1);
        let call = backend.last_call().unwrap();
        assert!(!call.streaming);
        assert_eq!(call.temperature, COMPRESSION_TEMPERATURE);
        assert_eq!(compact_history(summary), vec![Message::system("summary text")]);
    }
}
