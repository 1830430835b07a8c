//! Concrete stages for voice pipelines.

pub mod context;
pub mod image;
pub mod llm;
pub mod logger;
pub mod sentence;
pub mod stt;
pub mod tts;

pub use context::{ConversationContext, LlmContextAggregator};
pub use image::ImageStage;
pub use llm::LlmStage;
pub use logger::FrameLogger;
pub use sentence::{SentenceAggregator, SentenceBuffer, ends_sentence};
pub use stt::{SttStage, encode_wav};
pub use tts::TtsStage;
