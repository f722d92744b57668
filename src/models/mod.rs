// StyleShift Data Models
// Conversation turns, document segments, stages and per-stage model settings

use crate::services::providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============ Conversation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn. History is an ordered `Vec<Message>`; turns are
/// never edited after being appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ============ Segments ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub index: usize,
    pub source_text: String,
    pub effective_length: usize,
}

// ============ Stages & Modes ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// English-oriented style polish
    Polish,
    /// Chinese-oriented originality enhancement
    Enhance,
    /// Conversational tone rewrite for either language
    EmotionPolish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Polish => "polish",
            Stage::Enhance => "enhance",
            Stage::EmotionPolish => "emotion_polish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    PaperPolish,
    #[default]
    PaperPolishEnhance,
    EmotionPolish,
}

impl ProcessingMode {
    /// Stages run, in order, for this mode.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            ProcessingMode::PaperPolish => &[Stage::Polish],
            ProcessingMode::PaperPolishEnhance => &[Stage::Polish, Stage::Enhance],
            ProcessingMode::EmotionPolish => &[Stage::EmotionPolish],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::PaperPolish => "paper_polish",
            ProcessingMode::PaperPolishEnhance => "paper_polish_enhance",
            ProcessingMode::EmotionPolish => "emotion_polish",
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "paper_polish" => Ok(ProcessingMode::PaperPolish),
            "paper_polish_enhance" => Ok(ProcessingMode::PaperPolishEnhance),
            "emotion_polish" => Ok(ProcessingMode::EmotionPolish),
            other => Err(ProviderError::Configuration(format!(
                "unknown processing mode: {}",
                other
            ))),
        }
    }
}

// ============ Model Configuration ============

/// Endpoint settings for one stage. Built once, then shared read-only.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelConfig {
    model: String,
    api_key: String,
    base_url: String,
}

impl ModelConfig {
    /// Fails when the API key or base URL is missing or blank.
    /// Exactly one trailing `/` is removed from the base URL; any path prefix
    /// such as `/v1` is kept.
    pub fn new(
        model: impl Into<String>,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Configuration("API key is not configured".to_string()))?;
        let base_url = base_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::Configuration("base URL is not configured".to_string()))?;

        Ok(Self {
            model: model.into(),
            api_key: api_key.to_string(),
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

// Keep the key out of logs.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn normalize_base_url(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_strips_single_trailing_slash() {
        let cfg = ModelConfig::new("gpt-4o", Some("sk-test"), Some("https://api.example.com/v1/")).unwrap();
        assert_eq!(cfg.base_url(), "https://api.example.com/v1");
        assert_eq!(cfg.chat_completions_url(), "https://api.example.com/v1/chat/completions");

        let cfg = ModelConfig::new("gpt-4o", Some("sk-test"), Some("https://api.example.com/v1//")).unwrap();
        assert_eq!(cfg.base_url(), "https://api.example.com/v1/");
    }

    #[test]
    fn test_model_config_requires_key_and_url() {
        let err = ModelConfig::new("m", None, Some("https://x")).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        let err = ModelConfig::new("m", Some("  "), Some("https://x")).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        let err = ModelConfig::new("m", Some("k"), None).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_model_config_debug_hides_key() {
        let cfg = ModelConfig::new("m", Some("sk-secret"), Some("https://x")).unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn test_processing_mode_stages() {
        assert_eq!(ProcessingMode::PaperPolish.stages(), &[Stage::Polish]);
        assert_eq!(
            "paper_polish_enhance".parse::<ProcessingMode>().unwrap().stages(),
            &[Stage::Polish, Stage::Enhance]
        );
        assert_eq!(ProcessingMode::EmotionPolish.stages(), &[Stage::EmotionPolish]);
        assert!("translate".parse::<ProcessingMode>().is_err());
    }
}
