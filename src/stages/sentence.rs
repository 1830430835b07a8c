//! Sentence boundary detection and the sentence aggregator stage.

use crate::defaults::SENTENCE_TERMINATORS;
use crate::frame::Frame;
use crate::pipeline::stage::{FrameStream, Stage, emit, forward, nothing};

/// Returns true if `text` ends with a sentence terminator (`.`, `?`, `!`).
pub fn ends_sentence(text: &str) -> bool {
    text.ends_with(SENTENCE_TERMINATORS)
}

/// Pending text of an aggregator. Emptied on every flush.
#[derive(Debug, Clone, Default)]
pub struct SentenceBuffer {
    pending: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text`. Returns the whole buffered sentence, leaving the
    /// buffer empty, once it ends with a terminator.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.pending.push_str(text);
        if ends_sentence(&self.pending) {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Takes whatever is buffered, complete or not.
    pub fn take(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Joins streamed text chunks into one `Text` frame per sentence.
///
/// Useful in front of processors that need whole sentences (translation,
/// image prompts). Other frames pass through unchanged; an incomplete
/// sentence is flushed on finalize.
#[derive(Debug, Default)]
pub struct SentenceAggregator {
    buffer: SentenceBuffer,
    out_of_band: bool,
}

impl SentenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn sentence_frame(&self, text: String) -> Frame {
        Frame::Text {
            text,
            out_of_band: self.out_of_band,
        }
    }
}

impl Stage for SentenceAggregator {
    fn name(&self) -> &'static str {
        "SentenceAggregator"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        match frame {
            Frame::Text { text, out_of_band } => {
                self.out_of_band |= out_of_band;
                match self.buffer.push(&text) {
                    Some(sentence) => {
                        let frame = self.sentence_frame(sentence);
                        self.out_of_band = false;
                        forward(frame)
                    }
                    None => nothing(),
                }
            }
            other => forward(other),
        }
    }

    fn finalize(&mut self) -> FrameStream<'_> {
        let flushed = self.buffer.take().map(|text| self.sentence_frame(text));
        self.out_of_band = false;
        emit(flushed.into_iter().collect())
    }
}
