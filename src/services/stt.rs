use crate::error::{Result, VoxchainError};
use crate::services::lock_log;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Trait for speech-to-text recognition.
#[async_trait]
pub trait SttService: Send + Sync {
    /// Recognizes speech in a complete WAV file.
    ///
    /// # Arguments
    /// * `wav` - WAV container bytes (RIFF header + 16-bit PCM)
    /// * `sample_rate` - sample rate written in the header, in Hz
    async fn recognize(&self, wav: &[u8], sample_rate: u32) -> Result<String>;
}

#[async_trait]
impl<T: SttService + ?Sized> SttService for Arc<T> {
    async fn recognize(&self, wav: &[u8], sample_rate: u32) -> Result<String> {
        (**self).recognize(wav, sample_rate).await
    }
}

/// Mock speech recognizer for testing.
#[derive(Debug, Clone)]
pub struct MockStt {
    response: String,
    should_fail: bool,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Default for MockStt {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStt {
    pub fn new() -> Self {
        Self {
            response: "mock transcription".to_string(),
            should_fail: false,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on recognize
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Returns every WAV payload received, oldest first.
    pub fn received(&self) -> Vec<Vec<u8>> {
        lock_log(&self.received).clone()
    }
}

#[async_trait]
impl SttService for MockStt {
    async fn recognize(&self, wav: &[u8], _sample_rate: u32) -> Result<String> {
        lock_log(&self.received).push(wav.to_vec());
        if self.should_fail {
            Err(VoxchainError::Stt {
                message: "mock recognition failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }
}
