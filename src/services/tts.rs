use crate::defaults;
use crate::error::{Result, VoxchainError};
use crate::services::lock_log;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};

/// Streamed raw PCM bytes from a synthesis call.
pub type AudioStream = BoxStream<'static, Result<Vec<u8>>>;

/// Trait for streaming text-to-speech.
///
/// Dropping the returned stream cancels the synthesis.
pub trait TtsService: Send + Sync {
    /// Synthesizes `text` into 16-bit PCM, streamed in service-sized chunks.
    fn synthesize(&self, text: &str) -> AudioStream;

    /// Sample rate of the produced audio.
    fn sample_rate(&self) -> u32 {
        defaults::SAMPLE_RATE
    }
}

impl<T: TtsService + ?Sized> TtsService for Arc<T> {
    fn synthesize(&self, text: &str) -> AudioStream {
        (**self).synthesize(text)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Mock speech synthesizer for testing.
///
/// Produces silence: by default 320 bytes (10ms at 16kHz) per input
/// character, or a fixed length set with [`MockTts::with_output_len`].
#[derive(Debug, Clone)]
pub struct MockTts {
    bytes_per_char: usize,
    fixed_len: Option<usize>,
    service_chunk: Option<usize>,
    sample_rate: u32,
    should_fail: bool,
    synthesized: Arc<Mutex<Vec<String>>>,
}

impl Default for MockTts {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTts {
    pub fn new() -> Self {
        Self {
            bytes_per_char: 320,
            fixed_len: None,
            service_chunk: None,
            sample_rate: defaults::SAMPLE_RATE,
            should_fail: false,
            synthesized: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Produces exactly `len` bytes per call regardless of the text.
    pub fn with_output_len(mut self, len: usize) -> Self {
        self.fixed_len = Some(len);
        self
    }

    /// Streams the output in chunks of `size` bytes instead of one chunk.
    pub fn with_service_chunk(mut self, size: usize) -> Self {
        self.service_chunk = Some(size.max(1));
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Fails every call before producing audio.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Returns every text passed to `synthesize`, oldest first.
    pub fn synthesized(&self) -> Vec<String> {
        lock_log(&self.synthesized).clone()
    }
}

impl TtsService for MockTts {
    fn synthesize(&self, text: &str) -> AudioStream {
        lock_log(&self.synthesized).push(text.to_string());

        if self.should_fail {
            return stream::iter([Err(VoxchainError::Tts {
                message: "mock synthesis failure".to_string(),
            })])
            .boxed();
        }

        let len = self
            .fixed_len
            .unwrap_or(text.chars().count() * self.bytes_per_char);
        let audio = vec![0u8; len];
        let chunks: Vec<Vec<u8>> = match self.service_chunk {
            Some(size) => audio.chunks(size).map(<[u8]>::to_vec).collect(),
            None => vec![audio],
        };
        stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
