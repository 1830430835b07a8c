//! Shared conversation context and the aggregator that grows it.

use crate::frame::{Frame, Message, Role};
use crate::pipeline::stage::{FrameStream, Stage, emit, forward, nothing};
use crate::stages::sentence::SentenceBuffer;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ordered conversation history shared between aggregators and the LLM
/// stage. Entries are only ever appended.
///
/// Cloning shares the same history.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self::from_messages(vec![Message::system(prompt)])
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(Mutex::new(messages)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, message: Message) {
        self.lock().push(message);
    }

    /// Copies the current history into an immutable snapshot.
    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::from(self.lock().as_slice())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Appends completed turns of one role to a [`ConversationContext`].
///
/// Text and Transcription frames are accumulated; when a turn is complete a
/// `{role, content}` entry is appended and an `LlmMessages` snapshot of the
/// whole history is emitted ahead of the frame that completed it. Every input
/// frame is forwarded. Transcriptions are heard speech, so an assistant
/// aggregator only records `Text`.
pub struct LlmContextAggregator {
    context: ConversationContext,
    role: Role,
    complete_sentences: bool,
    bot_participant_id: Option<String>,
    buffer: SentenceBuffer,
}

impl LlmContextAggregator {
    pub fn new(context: ConversationContext, role: Role) -> Self {
        Self {
            context,
            role,
            complete_sentences: true,
            bot_participant_id: None,
            buffer: SentenceBuffer::new(),
        }
    }

    /// Aggregator for what the user says.
    pub fn user(context: ConversationContext) -> Self {
        Self::new(context, Role::User)
    }

    /// Aggregator for what the assistant answers.
    pub fn assistant(context: ConversationContext) -> Self {
        Self::new(context, Role::Assistant)
    }

    /// When false, every text frame is a complete turn.
    pub fn with_complete_sentences(mut self, complete_sentences: bool) -> Self {
        self.complete_sentences = complete_sentences;
        self
    }

    /// Transcriptions from this participant are forwarded but not recorded.
    pub fn with_bot_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.bot_participant_id = Some(participant_id.into());
        self
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    fn aggregated_text<'f>(&self, frame: &'f Frame) -> Option<&'f str> {
        match frame {
            Frame::Text { text, .. } => Some(text),
            Frame::Transcription {
                text,
                participant_id,
                ..
            } => {
                if self.role == Role::Assistant
                    || self.bot_participant_id.as_deref() == Some(participant_id.as_str())
                {
                    None
                } else {
                    Some(text)
                }
            }
            _ => None,
        }
    }

    /// Records a finished turn and returns the snapshot frame.
    fn commit(&self, content: String) -> Frame {
        self.context.push(Message::new(self.role, content));
        Frame::llm_messages(self.context.snapshot())
    }
}

impl Stage for LlmContextAggregator {
    fn name(&self) -> &'static str {
        match self.role {
            Role::User => "UserContextAggregator",
            Role::Assistant => "AssistantContextAggregator",
            Role::System => "SystemContextAggregator",
        }
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        let Some(text) = self.aggregated_text(&frame) else {
            return forward(frame);
        };

        let completed = if self.complete_sentences {
            self.buffer.push(text)
        } else {
            Some(text.to_string())
        };

        match completed {
            Some(content) => {
                let snapshot = self.commit(content);
                emit(vec![snapshot, frame])
            }
            None => forward(frame),
        }
    }

    fn finalize(&mut self) -> FrameStream<'_> {
        match self.buffer.take() {
            Some(content) => {
                tracing::debug!(stage = self.name(), "flushing incomplete turn");
                forward(self.commit(content))
            }
            None => nothing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ControlSignal;
    use crate::pipeline::source::IterSource;
    use futures_util::StreamExt;

    async fn run(stage: &mut LlmContextAggregator, frames: Vec<Frame>) -> Vec<Frame> {
        stage
            .run(Box::new(IterSource::new(frames)))
            .map(Result::unwrap)
            .collect()
            .await
    }

    fn snapshots(frames: &[Frame]) -> Vec<Arc<[Message]>> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Frame::LlmMessages(messages) => Some(messages.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_hello_world_produces_one_snapshot() {
        let context = ConversationContext::new();
        let mut stage = LlmContextAggregator::user(context.clone());

        let out = run(&mut stage, vec![Frame::text("Hello"), Frame::text(" world.")]).await;

        assert_eq!(
            out,
            vec![
                Frame::text("Hello"),
                Frame::llm_messages(vec![Message::user("Hello world.")]),
                Frame::text(" world."),
            ]
        );
        assert_eq!(context.messages(), vec![Message::user("Hello world.")]);
    }

    #[tokio::test]
    async fn test_snapshots_carry_full_history() {
        let context = ConversationContext::with_system_prompt("be brief");
        let mut stage = LlmContextAggregator::assistant(context.clone());

        let out = run(&mut stage, vec![Frame::text("One."), Frame::text("Two!")]).await;
        let snaps = snapshots(&out);

        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].len(), 2);
        assert_eq!(snaps[1].len(), 3);
        // Earlier snapshots are not mutated by later turns.
        assert_eq!(snaps[0][1], Message::assistant("One."));
        assert_eq!(snaps[1][2], Message::assistant("Two!"));
    }

    #[tokio::test]
    async fn test_without_sentence_completion_every_frame_is_a_turn() {
        let context = ConversationContext::new();
        let mut stage =
            LlmContextAggregator::user(context.clone()).with_complete_sentences(false);

        let out = run(&mut stage, vec![Frame::text("no punctuation"), Frame::text("   ")]).await;

        assert_eq!(snapshots(&out).len(), 2);
        assert_eq!(
            context.messages(),
            vec![Message::user("no punctuation"), Message::user("   ")]
        );
        assert_eq!(out.len(), 4);
    }

    #[tokio::test]
    async fn test_transcriptions_aggregate_but_bot_is_skipped() {
        let context = ConversationContext::new();
        let mut stage = LlmContextAggregator::user(context.clone())
            .with_complete_sentences(false)
            .with_bot_participant("bot-1");

        let out = run(
            &mut stage,
            vec![
                Frame::transcription("what time is it", "user-7"),
                Frame::transcription("it is noon", "bot-1"),
            ],
        )
        .await;

        assert_eq!(snapshots(&out).len(), 1);
        assert_eq!(context.messages(), vec![Message::user("what time is it")]);
        assert_eq!(out.len(), 3, "both transcriptions are forwarded");
    }

    #[tokio::test]
    async fn test_assistant_aggregator_ignores_transcriptions() {
        let context = ConversationContext::new();
        let mut stage = LlmContextAggregator::assistant(context.clone());
        let frames = vec![
            Frame::transcription("What time is it?", "user-1"),
            Frame::text("It is noon."),
        ];

        let out = run(&mut stage, frames).await;

        assert_eq!(snapshots(&out).len(), 1);
        assert_eq!(context.messages(), vec![Message::assistant("It is noon.")]);
    }

    #[tokio::test]
    async fn test_other_frames_forwarded_unchanged() {
        let mut stage = LlmContextAggregator::user(ConversationContext::new());
        let frames = vec![
            Frame::Control(ControlSignal::UserStoppedSpeaking),
            Frame::audio(vec![1u8, 2], 16000, 1),
        ];
        assert_eq!(run(&mut stage, frames.clone()).await, frames);
    }

    #[tokio::test]
    async fn test_finalize_flushes_incomplete_turn_once() {
        let context = ConversationContext::new();
        let mut stage = LlmContextAggregator::user(context.clone());

        let out = run(&mut stage, vec![Frame::text("trailing"), Frame::EndOfStream]).await;

        assert_eq!(
            out,
            vec![
                Frame::text("trailing"),
                Frame::llm_messages(vec![Message::user("trailing")]),
                Frame::EndOfStream,
            ]
        );
        let again: Vec<_> = stage.finalize().collect().await;
        assert!(again.is_empty());
    }

    #[test]
    fn test_context_clones_share_history() {
        let context = ConversationContext::new();
        let other = context.clone();
        context.push(Message::user("hi"));
        assert_eq!(other.len(), 1);
        assert!(!other.is_empty());
    }
}
