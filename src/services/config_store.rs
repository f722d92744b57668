// Configuration Storage Service
// Handles config file read/write, version backup and per-stage model resolution

use crate::models::{ModelConfig, Stage};
use crate::services::history::{CompressionPolicy, DEFAULT_COMPRESSION_THRESHOLD};
use crate::services::prompts::StagePrompts;
use crate::services::providers::{ProviderError, DEFAULT_TEMPERATURE};
use crate::services::text_processor::DEFAULT_MAX_SEGMENT_CHARS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
const BACKUPS_TO_KEEP: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionConfig {
    #[serde(default = "default_threshold")]
    pub threshold_chars: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_chars: DEFAULT_COMPRESSION_THRESHOLD,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StagesConfig {
    #[serde(default)]
    pub polish: StageConfig,
    #[serde(default)]
    pub enhance: StageConfig,
    #[serde(default)]
    pub emotion: StageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            prompt: None,
        }
    }
}

fn default_max_chars() -> usize { DEFAULT_MAX_SEGMENT_CHARS }
fn default_threshold() -> usize { DEFAULT_COMPRESSION_THRESHOLD }
fn default_true() -> bool { true }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }

impl AppConfig {
    pub fn stage(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Polish => &self.stages.polish,
            Stage::Enhance => &self.stages.enhance,
            Stage::EmotionPolish => &self.stages.emotion,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageConfig {
        match stage {
            Stage::Polish => &mut self.stages.polish,
            Stage::Enhance => &mut self.stages.enhance,
            Stage::EmotionPolish => &mut self.stages.emotion,
        }
    }

    /// Model config for a stage, reading `OPENAI_API_KEY` / `OPENAI_BASE_URL`
    /// for whatever the stage leaves unset.
    pub fn resolve_model_config(&self, stage: Stage) -> Result<ModelConfig, ProviderError> {
        self.resolve_model_config_with(stage, |key| std::env::var(key).ok())
    }

    pub fn resolve_model_config_with<F>(&self, stage: Stage, env: F) -> Result<ModelConfig, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = self.stage(stage);
        let pick = |own: &Option<String>, key: &str| {
            own.clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(key))
        };
        let api_key = pick(&cfg.api_key, API_KEY_ENV);
        let base_url = pick(&cfg.base_url, BASE_URL_ENV);

        ModelConfig::new(cfg.model.as_str(), api_key.as_deref(), base_url.as_deref())
            .map_err(|e| match e {
                ProviderError::Configuration(msg) => {
                    ProviderError::Configuration(format!("stage {}: {}", stage, msg))
                }
                other => other,
            })
    }

    pub fn stage_prompts(&self) -> StagePrompts {
        StagePrompts {
            polish: self.stages.polish.prompt.clone(),
            enhance: self.stages.enhance.prompt.clone(),
            emotion: self.stages.emotion.prompt.clone(),
            compression: self.compression_prompt.clone(),
        }
    }

    pub fn compression_policy(&self) -> CompressionPolicy {
        CompressionPolicy {
            threshold_chars: self.compression.threshold_chars,
            enabled: self.compression.enabled,
        }
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store rooted at an explicit config file path.
    pub fn at_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("styleshift"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ProviderError> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| ProviderError::Configuration(format!("Failed to create config dir: {}", e)))
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<AppConfig, ProviderError> {
        if !self.config_file.exists() {
            info!(path = %self.config_file.display(), "config.defaults_used");
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| ProviderError::Configuration(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ProviderError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| ProviderError::Configuration(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_file, content)
            .map_err(|e| ProviderError::Configuration(format!("Failed to write config: {}", e)))?;
        info!(path = %self.config_file.display(), "config.saved");
        Ok(())
    }

    fn backup_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    fn create_backup(&self) -> Result<(), ProviderError> {
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir)
            .map_err(|e| ProviderError::Configuration(format!("Failed to create backup dir: {}", e)))?;

        // Millisecond suffix keeps saves within the same second apart.
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| ProviderError::Configuration(format!("Failed to create backup: {}", e)))?;

        self.cleanup_old_backups(&backup_dir, BACKUPS_TO_KEEP);
        Ok(())
    }

    /// Remove old backups, keeping only the most recent `keep`.
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) {
        let mut entries: Vec<_> = match fs::read_dir(backup_dir) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
                .collect(),
            Err(e) => {
                warn!(error = %e, "config.backup_scan_failed");
                return;
            }
        };

        if entries.len() <= keep {
            return;
        }

        // File names embed the timestamp, so name order is age order.
        entries.sort_by_key(|e| e.file_name());

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }
    }
}
