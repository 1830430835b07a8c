//! Speech-to-text stage.

use crate::defaults;
use crate::error::{Result, VoxchainError};
use crate::frame::Frame;
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{FrameStream, Stage, forward};
use crate::services::stt::SttService;
use async_stream::stream;
use std::io::Cursor;
use std::sync::Arc;

/// Wraps raw 16-bit little-endian PCM in a WAV container.
///
/// A trailing odd byte is dropped.
pub fn encode_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: defaults::BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_error = |e: hound::Error| VoxchainError::Stt {
        message: format!("Failed to build WAV container: {}", e),
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for sample in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    Ok(cursor.into_inner())
}

/// Transcribes each `Audio` frame into a `Transcription` frame.
///
/// Every audio frame is one recognition request; the WAV buffer is built per
/// call. Other frames pass through. Recognition failures are fatal.
pub struct SttStage {
    service: Arc<dyn SttService>,
    participant_id: String,
}

impl SttStage {
    pub fn new(service: Arc<dyn SttService>) -> Self {
        Self {
            service,
            participant_id: String::new(),
        }
    }

    /// Participant id stamped on emitted transcriptions. Empty by default.
    pub fn with_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.participant_id = participant_id.into();
        self
    }
}

impl Stage for SttStage {
    fn name(&self) -> &'static str {
        "SttStage"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        let (data, sample_rate, channels) = match frame {
            Frame::Audio {
                data,
                sample_rate,
                channels,
            } => (data, sample_rate, channels),
            other => return forward(other),
        };

        let service = self.service.clone();
        let participant_id = self.participant_id.clone();
        Box::pin(stream! {
            let wav = match encode_wav(&data, sample_rate, channels) {
                Ok(wav) => wav,
                Err(error) => {
                    yield Err(StageError::fatal(error));
                    return;
                }
            };

            match service.recognize(&wav, sample_rate).await {
                Ok(text) => yield Ok(Frame::transcription(text, participant_id)),
                Err(error) => yield Err(StageError::fatal(error)),
            }
        })
    }
}
