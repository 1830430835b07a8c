//! Pullable frame sources.
//!
//! The stage driver only knows [`FrameSource`]. The three input shapes a
//! stage accepts (a finite sequence, an async push stream, a shared queue)
//! each get an adapter here.

use crate::frame::Frame;
use crate::pipeline::error::StageError;
use crate::pipeline::sink::FrameReceiver;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::borrow::BorrowMut;

/// A source the stage driver pulls frames from, one at a time.
#[async_trait]
pub trait FrameSource: Send {
    /// Returns the next frame in arrival order.
    ///
    /// - `Ok(Some(frame))` - the next frame
    /// - `Ok(None)` - the source is exhausted
    /// - `Err(StageError)` - an upstream stage failed
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError>;
}

#[async_trait]
impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError> {
        (**self).next_frame().await
    }
}

/// Source over a finite, already-known sequence of frames.
pub struct IterSource<I> {
    frames: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Frame> + Send,
{
    pub fn new(frames: impl IntoIterator<Item = Frame, IntoIter = I>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

#[async_trait]
impl<I> FrameSource for IterSource<I>
where
    I: Iterator<Item = Frame> + Send,
{
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError> {
        Ok(self.frames.next())
    }
}

/// Source over an asynchronous push stream.
///
/// Also the glue between pipeline stages: stage *i*'s output stream is
/// wrapped with [`StreamSource::fallible`] and handed to stage *i+1*.
pub struct StreamSource<'a> {
    stream: BoxStream<'a, Result<Frame, StageError>>,
}

impl<'a> StreamSource<'a> {
    /// Wraps an infallible stream of frames.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Frame> + Send + 'a,
    {
        Self {
            stream: stream.map(Ok::<Frame, StageError>).boxed(),
        }
    }

    /// Wraps a stream that may carry upstream failures.
    pub fn fallible<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Frame, StageError>> + Send + 'a,
    {
        Self {
            stream: stream.boxed(),
        }
    }
}

#[async_trait]
impl FrameSource for StreamSource<'_> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError> {
        self.stream.next().await.transpose()
    }
}

/// Source over a shared frame queue.
///
/// The driver stops pulling as soon as it sees `EndOfStream`, so frames
/// queued behind the marker stay in the queue for the next reader. A queue
/// whose senders are all dropped counts as exhausted.
pub struct QueueSource<R> {
    receiver: R,
}

impl<R> QueueSource<R>
where
    R: BorrowMut<FrameReceiver> + Send,
{
    /// Accepts either an owned receiver or `&mut FrameReceiver`.
    pub fn new(receiver: R) -> Self {
        Self { receiver }
    }

    pub fn into_inner(self) -> R {
        self.receiver
    }
}

#[async_trait]
impl<R> FrameSource for QueueSource<R>
where
    R: BorrowMut<FrameReceiver> + Send,
{
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError> {
        Ok(self.receiver.borrow_mut().recv().await)
    }
}
