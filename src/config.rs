use crate::defaults;
use crate::error::{Result, VoxchainError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

/// Frame pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of the bounded queues between concurrently running pipelines.
    pub queue_capacity: usize,
    /// Maximum payload of one audio frame emitted by the TTS stage.
    pub audio_chunk_bytes: usize,
    /// Hold TTS text until a sentence is complete.
    pub aggregate_sentences: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Conversation setup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    pub system_prompt: String,
    /// Transcriptions from this participant are never treated as user input.
    pub bot_participant_id: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `voxchain=debug`.
    pub filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            audio_chunk_bytes: defaults::AUDIO_CHUNK_BYTES,
            aggregate_sentences: true,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            bot_participant_id: defaults::BOT_PARTICIPANT_ID.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoxchainError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXCHAIN_QUEUE_CAPACITY → pipeline.queue_capacity
    /// - VOXCHAIN_SYSTEM_PROMPT → conversation.system_prompt
    /// - VOXCHAIN_LOG → logging.filter
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(capacity) = std::env::var("VOXCHAIN_QUEUE_CAPACITY")
            && !capacity.is_empty()
        {
            match capacity.parse() {
                Ok(value) => self.pipeline.queue_capacity = value,
                Err(_) => tracing::warn!(
                    value = %capacity,
                    "ignoring VOXCHAIN_QUEUE_CAPACITY: not a number"
                ),
            }
        }

        if let Ok(prompt) = std::env::var("VOXCHAIN_SYSTEM_PROMPT")
            && !prompt.is_empty()
        {
            self.conversation.system_prompt = prompt;
        }

        if let Ok(filter) = std::env::var("VOXCHAIN_LOG")
            && !filter.is_empty()
        {
            self.logging.filter = filter;
        }

        self
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| VoxchainError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.pipeline.queue_capacity == 0 {
            return Err(invalid("pipeline.queue_capacity", "must be at least 1"));
        }
        if self.pipeline.queue_capacity > defaults::MAX_QUEUE_CAPACITY {
            return Err(invalid(
                "pipeline.queue_capacity",
                &format!("must be at most {}", defaults::MAX_QUEUE_CAPACITY),
            ));
        }
        if self.pipeline.audio_chunk_bytes == 0 {
            return Err(invalid("pipeline.audio_chunk_bytes", "must be at least 1"));
        }
        if !self.pipeline.audio_chunk_bytes.is_multiple_of(2) {
            return Err(invalid(
                "pipeline.audio_chunk_bytes",
                "must be even (16-bit samples)",
            ));
        }
        if self.pipeline.sample_rate == 0 {
            return Err(invalid("pipeline.sample_rate", "must be positive"));
        }
        if self.pipeline.channels == 0 {
            return Err(invalid("pipeline.channels", "must be at least 1"));
        }
        Ok(())
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxchainError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxchain/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("voxchain")
            .join("config.toml")
    }
}
