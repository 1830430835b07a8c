//! Frame queues and sinks.
//!
//! Queues are bounded tokio channels: a full queue suspends the producer,
//! which is how backpressure travels upstream through a chain of stages.

use crate::error::{Result, VoxchainError};
use crate::frame::Frame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Producer half of a frame queue.
pub type FrameSender = mpsc::Sender<Frame>;

/// Consumer half of a frame queue.
pub type FrameReceiver = mpsc::Receiver<Frame>;

/// Creates a bounded frame queue.
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    mpsc::channel(capacity)
}

/// Anything that accepts frames for further delivery (a queue, a transport,
/// a playback device).
#[async_trait]
pub trait FrameSink: Send {
    /// Accepts one frame, waiting while the sink applies backpressure.
    async fn accept(&mut self, frame: Frame) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

#[async_trait]
impl FrameSink for FrameSender {
    async fn accept(&mut self, frame: Frame) -> Result<()> {
        self.send(frame)
            .await
            .map_err(|_| VoxchainError::QueueClosed {
                message: "receiver dropped".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "queue"
    }
}

#[async_trait]
impl<K: FrameSink + ?Sized> FrameSink for &mut K {
    async fn accept(&mut self, frame: Frame) -> Result<()> {
        (**self).accept(frame).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<K: FrameSink + ?Sized> FrameSink for Box<K> {
    async fn accept(&mut self, frame: Frame) -> Result<()> {
        (**self).accept(frame).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Sink that collects every frame in memory.
#[derive(Debug, Default)]
pub struct CollectorSink {
    frames: Vec<Frame>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

#[async_trait]
impl FrameSink for CollectorSink {
    async fn accept(&mut self, frame: Frame) -> Result<()> {
        self.frames.push(frame);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collector_sink_keeps_order() {
        let mut sink = CollectorSink::new();
        sink.accept(Frame::text("one")).await.unwrap();
        sink.accept(Frame::text("two")).await.unwrap();

        assert_eq!(sink.frames(), &[Frame::text("one"), Frame::text("two")]);
        assert_eq!(sink.name(), "collector");
    }

    #[tokio::test]
    async fn test_sender_sink_delivers_to_queue() {
        let (mut tx, mut rx) = frame_queue(4);
        tx.accept(Frame::EndOfStream).await.unwrap();
        assert_eq!(rx.recv().await, Some(Frame::EndOfStream));
    }

    #[tokio::test]
    async fn test_sender_sink_reports_closed_queue() {
        let (mut tx, rx) = frame_queue(1);
        drop(rx);
        let err = tx.accept(Frame::text("lost")).await.unwrap_err();
        assert!(matches!(err, VoxchainError::QueueClosed { .. }));
    }

    #[tokio::test]
    async fn test_bounded_queue_applies_backpressure() {
        let (mut tx, mut rx) = frame_queue(1);
        tx.accept(Frame::text("fills the slot")).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tx.accept(Frame::text("waits")),
        )
        .await;
        assert!(blocked.is_err(), "second send should wait for capacity");

        assert_eq!(rx.recv().await, Some(Frame::text("fills the slot")));
    }
}
