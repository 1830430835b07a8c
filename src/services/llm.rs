use crate::error::{Result, VoxchainError};
use crate::frame::{Frame, Message, Role};
use crate::services::lock_log;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};

/// One item of a streamed language-model response.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmChunk {
    /// Partial response text. Wrapped into a `Text` frame by the LLM stage.
    Text(String),
    /// A ready-made frame, forwarded verbatim.
    Frame(Frame),
}

impl From<&str> for LlmChunk {
    fn from(text: &str) -> Self {
        LlmChunk::Text(text.to_string())
    }
}

/// Streamed response of a language model.
pub type LlmStream = BoxStream<'static, Result<LlmChunk>>;

/// Trait for streaming language-model generation.
///
/// Dropping the returned stream abandons the request.
pub trait LlmService: Send + Sync {
    /// Generates a response to `messages`, streaming partial output.
    fn generate(&self, messages: Vec<Message>) -> LlmStream;

    /// Name of the underlying model.
    fn model_name(&self) -> &str;
}

impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    fn generate(&self, messages: Vec<Message>) -> LlmStream {
        (**self).generate(messages)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock language model for testing.
///
/// Replies with a fixed list of chunks, or echoes the last user message when
/// configured with [`MockLlm::with_echo`]. Every request is recorded.
#[derive(Debug, Clone)]
pub struct MockLlm {
    chunks: Vec<LlmChunk>,
    echo: bool,
    should_fail: bool,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            chunks: vec!["Hello".into(), " world.".into()],
            echo: false,
            should_fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replies with `response`, streamed word by word.
    pub fn with_response(mut self, response: &str) -> Self {
        self.chunks = split_words(response);
        self
    }

    /// Replies with exactly these chunks.
    pub fn with_chunks(mut self, chunks: Vec<LlmChunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Replies "You said: <last user message>".
    pub fn with_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Fails every request before producing output.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Returns every message list passed to `generate`, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock_log(&self.requests).clone()
    }
}

fn split_words(text: &str) -> Vec<LlmChunk> {
    text.split_inclusive(' ').map(LlmChunk::from).collect()
}

impl LlmService for MockLlm {
    fn generate(&self, messages: Vec<Message>) -> LlmStream {
        if self.should_fail {
            lock_log(&self.requests).push(messages);
            return stream::iter([Err(VoxchainError::Llm {
                message: "mock language model failure".to_string(),
            })])
            .boxed();
        }

        let chunks = if self.echo {
            let heard = messages
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.trim().to_string())
                .unwrap_or_default();
            split_words(&format!("You said: {}", heard))
        } else {
            self.chunks.clone()
        };

        lock_log(&self.requests).push(messages);
        stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}
