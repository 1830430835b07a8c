//! Pass-through stage that logs every frame.

use crate::defaults;
use crate::frame::Frame;
use crate::pipeline::stage::{FrameStream, Stage, forward};

/// Logs a one-line summary of every frame, then forwards it unchanged.
///
/// Payload bytes are never logged.
pub struct FrameLogger {
    prefix: String,
    seen: u64,
}

impl Default for FrameLogger {
    fn default() -> Self {
        Self::new(defaults::LOGGER_PREFIX)
    }
}

impl FrameLogger {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            seen: 0,
        }
    }

    /// Number of frames logged so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl Stage for FrameLogger {
    fn name(&self) -> &'static str {
        "FrameLogger"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        self.seen += 1;
        match &frame {
            Frame::Error { message } => {
                tracing::warn!(prefix = %self.prefix, seq = self.seen, "{}", message)
            }
            _ => tracing::info!(prefix = %self.prefix, seq = self.seen, "{}", frame.summary()),
        }
        forward(frame)
    }
}
