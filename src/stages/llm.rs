//! Language-model stage: one trigger frame fans out into a streamed response.

use crate::frame::{ControlSignal, Frame, Message, ServiceKind};
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{FrameStream, Stage, forward};
use crate::services::llm::{LlmChunk, LlmService};
use crate::stages::context::ConversationContext;
use async_stream::stream;
use futures_util::StreamExt;
use std::sync::Arc;

/// Calls the language model and streams its answer downstream.
///
/// Triggers:
/// - `Control(UserStoppedSpeaking)` generates from the shared conversation
///   context; the control frame is forwarded first.
/// - `LlmMessages` generates from the snapshot it carries. The snapshot is
///   consumed as the request.
///
/// Text chunks become `Text` frames, frames from the service are forwarded
/// verbatim, and every response ends with a `ServiceCompleted` marker carrying
/// the full response text. A service failure becomes an `Error` frame
/// followed by the marker. All other frames pass through.
pub struct LlmStage {
    service: Arc<dyn LlmService>,
    context: ConversationContext,
}

impl LlmStage {
    pub fn new(service: Arc<dyn LlmService>, context: ConversationContext) -> Self {
        Self { service, context }
    }

    fn respond(&self, messages: Vec<Message>, lead: Option<Frame>) -> FrameStream<'static> {
        let service = self.service.clone();
        Box::pin(stream! {
            if let Some(frame) = lead {
                yield Ok(frame);
            }

            tracing::debug!(model = service.model_name(), messages = messages.len(), "requesting completion");
            let mut chunks = service.generate(messages);
            let mut response = String::new();

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(LlmChunk::Text(text)) => {
                        response.push_str(&text);
                        yield Ok(Frame::text(text));
                    }
                    Ok(LlmChunk::Frame(frame)) => yield Ok(frame),
                    Err(error) => {
                        yield Err(StageError::recoverable(error));
                        break;
                    }
                }
            }

            yield Ok(Frame::ServiceCompleted {
                service: ServiceKind::Llm,
                text: Some(response),
                out_of_band: false,
            });
        })
    }
}

impl Stage for LlmStage {
    fn name(&self) -> &'static str {
        "LlmStage"
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        match frame {
            Frame::Control(ControlSignal::UserStoppedSpeaking) => {
                let messages = self.context.messages();
                self.respond(messages, Some(frame))
            }
            Frame::LlmMessages(messages) => self.respond(messages.to_vec(), None),
            other => forward(other),
        }
    }
}
