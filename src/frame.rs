//! Frame types that flow between pipeline stages.
//!
//! A [`Frame`] is an immutable unit of pipeline data. Stages never mutate a
//! frame they received; they build new ones. Byte payloads and context
//! snapshots are reference-counted so that fan-out clones stay cheap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Speaker role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Structural signals carried by [`Frame::Control`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// A new stream of frames is starting.
    StreamStarted,
    /// A participant started speaking. Used as the interruption trigger.
    UserStartedSpeaking,
    /// A participant finished speaking. Triggers a language-model turn.
    UserStoppedSpeaking,
    /// Application-defined marker.
    Custom(String),
}

/// External service that produced a [`Frame::ServiceCompleted`] marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Llm,
    Tts,
    Stt,
    ImageGeneration,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Llm => write!(f, "llm"),
            ServiceKind::Tts => write!(f, "tts"),
            ServiceKind::Stt => write!(f, "stt"),
            ServiceKind::ImageGeneration => write!(f, "image"),
        }
    }
}

/// Discriminant of a [`Frame`], used for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Text,
    Audio,
    Image,
    Transcription,
    LlmMessages,
    Control,
    EndOfStream,
    ServiceCompleted,
    Error,
}

/// A unit of pipeline data.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A chunk of text or a complete utterance.
    Text {
        text: String,
        /// Text that should be spoken but kept out of the conversation flow
        /// (e.g. a scripted greeting). Echoed on the TTS completion marker.
        out_of_band: bool,
    },
    /// Raw PCM audio.
    Audio {
        data: Arc<[u8]>,
        sample_rate: u32,
        channels: u16,
    },
    /// A rendered image.
    Image { url: String, data: Arc<[u8]> },
    /// Recognized speech. Distinct from `Text`: never spoken by TTS.
    Transcription {
        text: String,
        participant_id: String,
        timestamp: SystemTime,
    },
    /// Snapshot of a conversation context.
    LlmMessages(Arc<[Message]>),
    /// Structural signal.
    Control(ControlSignal),
    /// Terminal marker: no more frames will follow on this input.
    EndOfStream,
    /// End of one generated unit (a spoken sentence, an LLM response).
    ServiceCompleted {
        service: ServiceKind,
        text: Option<String>,
        out_of_band: bool,
    },
    /// Non-fatal, stream-local failure notice.
    Error { message: String },
}

impl Frame {
    /// Creates a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text {
            text: text.into(),
            out_of_band: false,
        }
    }

    /// Creates a text frame flagged as out-of-band.
    pub fn out_of_band_text(text: impl Into<String>) -> Self {
        Frame::Text {
            text: text.into(),
            out_of_band: true,
        }
    }

    /// Creates an audio frame from PCM bytes.
    pub fn audio(data: impl Into<Arc<[u8]>>, sample_rate: u32, channels: u16) -> Self {
        Frame::Audio {
            data: data.into(),
            sample_rate,
            channels,
        }
    }

    /// Creates an image frame.
    pub fn image(url: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Frame::Image {
            url: url.into(),
            data: data.into(),
        }
    }

    /// Creates a transcription frame stamped with the current time.
    pub fn transcription(text: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Frame::Transcription {
            text: text.into(),
            participant_id: participant_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a context snapshot frame.
    pub fn llm_messages(messages: impl Into<Arc<[Message]>>) -> Self {
        Frame::LlmMessages(messages.into())
    }

    /// Creates an error notice frame.
    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text { .. } => FrameKind::Text,
            Frame::Audio { .. } => FrameKind::Audio,
            Frame::Image { .. } => FrameKind::Image,
            Frame::Transcription { .. } => FrameKind::Transcription,
            Frame::LlmMessages(_) => FrameKind::LlmMessages,
            Frame::Control(_) => FrameKind::Control,
            Frame::EndOfStream => FrameKind::EndOfStream,
            Frame::ServiceCompleted { .. } => FrameKind::ServiceCompleted,
            Frame::Error { .. } => FrameKind::Error,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Frame::EndOfStream)
    }

    /// Returns the text of a `Text` frame. Transcriptions are not included.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Short human-readable description without payload bytes.
    pub fn summary(&self) -> String {
        match self {
            Frame::Text { text, out_of_band } => {
                if *out_of_band {
                    format!("Text(out-of-band) {:?}", text)
                } else {
                    format!("Text {:?}", text)
                }
            }
            Frame::Audio {
                data,
                sample_rate,
                channels,
            } => format!("Audio {} bytes @ {}Hz x{}", data.len(), sample_rate, channels),
            Frame::Image { url, data } => format!("Image {} ({} bytes)", url, data.len()),
            Frame::Transcription {
                text,
                participant_id,
                ..
            } => format!("Transcription [{}] {:?}", participant_id, text),
            Frame::LlmMessages(messages) => format!("LlmMessages ({} entries)", messages.len()),
            Frame::Control(signal) => format!("Control {:?}", signal),
            Frame::EndOfStream => "EndOfStream".to_string(),
            Frame::ServiceCompleted { service, text, .. } => match text {
                Some(text) => format!("ServiceCompleted({}) {:?}", service, text),
                None => format!("ServiceCompleted({})", service),
            },
            Frame::Error { message } => format!("Error {}", message),
        }
    }
}
