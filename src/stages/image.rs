//! Image generation stage.

use crate::frame::Frame;
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{FrameStream, Stage, forward};
use crate::services::image::ImageService;
use async_stream::stream;
use std::sync::Arc;

/// Renders each `Text` frame into an `Image` frame.
///
/// The text frame is consumed. Generation failures become `Error` frames.
/// Other frames pass through.
pub struct ImageStage {
    service: Arc<dyn ImageService>,
}

impl ImageStage {
    pub fn new(service: Arc<dyn ImageService>) -> Self {
        Self { service }
    }
}

impl Stage for ImageStage {
    fn name(&self) -> &'static str {
        "ImageStage"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        let prompt = match frame {
            Frame::Text { text, .. } => text,
            other => return forward(other),
        };

        let service = self.service.clone();
        Box::pin(stream! {
            match service.generate(&prompt).await {
                Ok(image) => yield Ok(Frame::image(image.url, image.data)),
                Err(error) => yield Err(StageError::recoverable(error)),
            }
        })
    }
}
