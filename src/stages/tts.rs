//! Text-to-speech stage.

use crate::defaults;
use crate::frame::{Frame, ServiceKind};
use crate::pipeline::error::StageError;
use crate::pipeline::sink::FrameSink;
use crate::pipeline::source::IterSource;
use crate::pipeline::stage::{FrameStream, Stage, forward, nothing, run_to_sink};
use crate::services::tts::TtsService;
use crate::stages::sentence::SentenceBuffer;
use async_stream::stream;
use futures_util::StreamExt;
use std::sync::Arc;

/// Speaks text frames.
///
/// With sentence aggregation (the default) text is buffered until it ends in
/// `.`, `?` or `!`; otherwise each text frame is spoken as-is. Every
/// synthesized chunk is sliced into `Audio` frames of at most
/// `chunk_bytes`, followed by a `ServiceCompleted` marker with the spoken
/// text and the out-of-band flag of the frame that completed it.
/// Transcriptions are never spoken. Finalize speaks any leftover text.
pub struct TtsStage {
    service: Arc<dyn TtsService>,
    aggregate_sentences: bool,
    chunk_bytes: usize,
    channels: u16,
    buffer: SentenceBuffer,
    pending_out_of_band: bool,
}

impl TtsStage {
    pub fn new(service: Arc<dyn TtsService>) -> Self {
        Self {
            service,
            aggregate_sentences: true,
            chunk_bytes: defaults::AUDIO_CHUNK_BYTES,
            channels: defaults::CHANNELS,
            buffer: SentenceBuffer::new(),
            pending_out_of_band: false,
        }
    }

    pub fn with_aggregate_sentences(mut self, aggregate: bool) -> Self {
        self.aggregate_sentences = aggregate;
        self
    }

    /// Maximum payload of one emitted audio frame. Zero is treated as one.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    /// Synthesizes one sentence straight into `sink`, without an end marker.
    ///
    /// Returns the number of frames delivered.
    pub async fn say<K>(&mut self, sentence: &str, sink: &mut K) -> Result<usize, StageError>
    where
        K: FrameSink + ?Sized,
    {
        run_to_sink(self, IterSource::new([Frame::text(sentence)]), sink, false).await
    }

    fn speak(&self, text: String, out_of_band: bool) -> FrameStream<'static> {
        let service = self.service.clone();
        let chunk_bytes = self.chunk_bytes;
        let channels = self.channels;

        Box::pin(stream! {
            let sample_rate = service.sample_rate();
            tracing::debug!(chars = text.len(), "synthesizing");
            let mut audio = service.synthesize(&text);

            while let Some(chunk) = audio.next().await {
                match chunk {
                    Ok(bytes) => {
                        for piece in bytes.chunks(chunk_bytes) {
                            yield Ok(Frame::audio(piece, sample_rate, channels));
                        }
                    }
                    Err(error) => {
                        yield Err(StageError::recoverable(error));
                        return;
                    }
                }
            }

            yield Ok(Frame::ServiceCompleted {
                service: ServiceKind::Tts,
                text: Some(text),
                out_of_band,
            });
        })
    }
}

impl Stage for TtsStage {
    fn name(&self) -> &'static str {
        "TtsStage"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        let (text, out_of_band) = match frame {
            Frame::Text { text, out_of_band } => (text, out_of_band),
            other => return forward(other),
        };

        if !self.aggregate_sentences {
            if text.is_empty() {
                return nothing();
            }
            return self.speak(text, out_of_band);
        }

        self.pending_out_of_band = out_of_band;
        match self.buffer.push(&text) {
            Some(sentence) => self.speak(sentence, out_of_band),
            None => nothing(),
        }
    }

    fn finalize(&mut self) -> FrameStream<'_> {
        match self.buffer.take() {
            Some(text) => self.speak(text, self.pending_out_of_band),
            None => nothing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ControlSignal;
    use crate::pipeline::sink::CollectorSink;
    use crate::services::tts::MockTts;

    fn audio_lengths(frames: &[Frame]) -> Vec<usize> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::Audio { data, .. } => Some(data.len()),
                _ => None,
            })
            .collect()
    }

    fn completed(text: &str, out_of_band: bool) -> Frame {
        Frame::ServiceCompleted {
            service: ServiceKind::Tts,
            text: Some(text.to_string()),
            out_of_band,
        }
    }

    async fn run(stage: &mut TtsStage, frames: Vec<Frame>) -> Vec<Frame> {
        stage
            .run(Box::new(IterSource::new(frames)))
            .map(Result::unwrap)
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_aggregated_sentence_sliced_into_chunks() {
        let tts = MockTts::new().with_output_len(20000);
        let mut stage = TtsStage::new(Arc::new(tts.clone()));

        let out = run(&mut stage, vec![Frame::text("Hi"), Frame::text(" there!")]).await;

        assert_eq!(tts.synthesized(), vec!["Hi there!"]);
        assert_eq!(audio_lengths(&out), vec![8000, 8000, 4000]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[3], completed("Hi there!", false));
    }

    #[tokio::test]
    async fn test_each_service_chunk_sliced_separately() {
        let tts = MockTts::new().with_output_len(20000).with_service_chunk(12000);
        let mut stage = TtsStage::new(Arc::new(tts));

        let out = run(&mut stage, vec![Frame::text("Go.")]).await;

        assert_eq!(audio_lengths(&out), vec![8000, 4000, 8000]);
    }

    #[tokio::test]
    async fn test_audio_frames_carry_service_format() {
        let tts = MockTts::new().with_output_len(10).with_sample_rate(24000);
        let mut stage = TtsStage::new(Arc::new(tts)).with_channels(2);

        let out = run(&mut stage, vec![Frame::text("Ok.")]).await;

        assert!(matches!(
            out[0],
            Frame::Audio {
                sample_rate: 24000,
                channels: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transcriptions_are_not_spoken() {
        let tts = MockTts::new();
        let mut stage = TtsStage::new(Arc::new(tts.clone()));
        let heard = Frame::transcription("Do not repeat me.", "user");

        let out = run(&mut stage, vec![heard.clone()]).await;

        assert_eq!(out, vec![heard]);
        assert!(tts.synthesized().is_empty());
    }

    #[tokio::test]
    async fn test_without_aggregation_every_text_is_spoken() {
        let tts = MockTts::new().with_output_len(100);
        let mut stage = TtsStage::new(Arc::new(tts.clone())).with_aggregate_sentences(false);

        let out = run(
            &mut stage,
            vec![Frame::text("one"), Frame::text(""), Frame::text("two")],
        )
        .await;

        assert_eq!(tts.synthesized(), vec!["one", "two"]);
        assert_eq!(audio_lengths(&out), vec![100, 100]);
    }

    #[tokio::test]
    async fn test_out_of_band_flag_echoed_on_marker() {
        let tts = MockTts::new().with_output_len(1);
        let mut stage = TtsStage::new(Arc::new(tts));

        let out = run(&mut stage, vec![Frame::out_of_band_text("Hi, I'm listening!")]).await;

        assert_eq!(out.last(), Some(&completed("Hi, I'm listening!", true)));
    }

    #[tokio::test]
    async fn test_end_marker_mid_sentence_flushes_once() {
        let tts = MockTts::new().with_output_len(10);
        let mut stage = TtsStage::new(Arc::new(tts.clone()));

        let out = run(
            &mut stage,
            vec![Frame::text("unfinished"), Frame::EndOfStream, Frame::text("late.")],
        )
        .await;

        assert_eq!(tts.synthesized(), vec!["unfinished"]);
        assert_eq!(
            out,
            vec![
                Frame::audio(vec![0u8; 10], 16000, 1),
                completed("unfinished", false),
                Frame::EndOfStream,
            ]
        );

        let again: Vec<_> = stage.finalize().collect().await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_failure_yields_error_frame_without_marker() {
        let tts = MockTts::new().with_failure();
        let mut stage = TtsStage::new(Arc::new(tts.clone()));

        let out = run(
            &mut stage,
            vec![Frame::text("Fail."), Frame::Control(ControlSignal::StreamStarted)],
        )
        .await;

        assert_eq!(
            out,
            vec![
                Frame::error("Speech synthesis failed: mock synthesis failure"),
                Frame::Control(ControlSignal::StreamStarted),
            ]
        );
        assert_eq!(tts.synthesized(), vec!["Fail."]);
    }

    #[tokio::test]
    async fn test_say_delivers_to_sink() {
        let tts = MockTts::new().with_output_len(9000);
        let mut stage = TtsStage::new(Arc::new(tts.clone()));
        let mut sink = CollectorSink::new();

        let delivered = stage.say("Hello there", &mut sink).await.unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(audio_lengths(sink.frames()), vec![8000, 1000]);
        assert_eq!(sink.frames()[2], completed("Hello there", false));
        assert_eq!(tts.synthesized(), vec!["Hello there"]);
    }
}
