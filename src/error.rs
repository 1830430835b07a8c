//! Error types for voxchain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxchainError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // External service errors
    #[error("Language model failed: {message}")]
    Llm { message: String },

    #[error("Speech synthesis failed: {message}")]
    Tts { message: String },

    #[error("Speech recognition failed: {message}")]
    Stt { message: String },

    #[error("Image generation failed: {message}")]
    ImageGeneration { message: String },

    // Queue errors
    #[error("Frame queue closed: {message}")]
    QueueClosed { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxchainError>;
