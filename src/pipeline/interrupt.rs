//! Interruption coordinator: at most one live generation chain at a time.
//!
//! Each chain (for example LLM → aggregator → TTS) runs as its own tokio task
//! and delivers into a shared sink. When the user starts speaking the live
//! task is aborted and awaited before anything else happens, so once a new
//! chain starts nothing from the old one can reach the sink. Aborting drops
//! the chain's futures, which abandons any in-flight service call.

use crate::frame::{ControlSignal, Frame};
use crate::pipeline::error::StageError;
use crate::pipeline::orchestrator::Pipeline;
use crate::pipeline::sink::{FrameReceiver, FrameSender};
use crate::pipeline::source::IterSource;
use tokio::task::{JoinError, JoinHandle};

/// Builds the pipeline that answers one trigger frame.
pub trait ChainFactory: Send + Sync {
    fn build(&self, trigger: &Frame) -> Pipeline;
}

impl<F> ChainFactory for F
where
    F: Fn(&Frame) -> Pipeline + Send + Sync,
{
    fn build(&self, trigger: &Frame) -> Pipeline {
        self(trigger)
    }
}

/// Counters for one coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptStats {
    /// Chains started.
    pub started: usize,
    /// Chains cancelled before they finished.
    pub interrupted: usize,
    /// Chains that ended with a fatal error or panicked.
    pub failed: usize,
}

type ChainTask = JoinHandle<Result<usize, StageError>>;

/// Runs generation chains against a shared sink, cancelling the live one on
/// interruption.
pub struct InterruptCoordinator {
    factory: Box<dyn ChainFactory>,
    sink: FrameSender,
    bot_participant_id: Option<String>,
    on_interrupt: Option<Box<dyn Fn() + Send + Sync>>,
    live: Option<ChainTask>,
    stats: InterruptStats,
}

impl InterruptCoordinator {
    pub fn new(factory: impl ChainFactory + 'static, sink: FrameSender) -> Self {
        Self {
            factory: Box::new(factory),
            sink,
            bot_participant_id: None,
            on_interrupt: None,
            live: None,
            stats: InterruptStats::default(),
        }
    }

    /// Ignores transcriptions from the bot's own participant id.
    pub fn with_bot_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.bot_participant_id = Some(participant_id.into());
        self
    }

    /// Sets a hook called each time a live chain is cancelled, e.g. to flush
    /// audio already queued for playback.
    pub fn with_on_interrupt(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_interrupt = Some(Box::new(hook));
        self
    }

    pub fn stats(&self) -> InterruptStats {
        self.stats
    }

    /// Returns true while a chain task is running.
    pub fn has_live_chain(&self) -> bool {
        self.live.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancels the live chain, if any, and starts a new one for `trigger`.
    pub async fn start_chain(&mut self, trigger: Frame) {
        self.interrupt().await;

        let mut pipeline = self.factory.build(&trigger);
        let mut sink = self.sink.clone();
        self.stats.started += 1;
        tracing::debug!(trigger = %trigger.summary(), "starting chain");

        self.live = Some(tokio::spawn(async move {
            pipeline
                .run_to_sink(IterSource::new([trigger]), &mut sink, false)
                .await
        }));
    }

    /// Cancels the live chain. Returns true if a running chain was cancelled.
    pub async fn interrupt(&mut self) -> bool {
        let Some(task) = self.live.take() else {
            return false;
        };

        if task.is_finished() {
            self.reap(task).await;
            return false;
        }

        task.abort();
        // Wait for the task to actually stop so its pending sends are dropped.
        match task.await {
            Err(join_error) if join_error.is_cancelled() => {}
            finished => {
                // The chain ended on its own before the abort landed.
                self.record(finished);
                return false;
            }
        }
        self.stats.interrupted += 1;
        tracing::debug!("live chain interrupted");

        if let Some(hook) = &self.on_interrupt {
            hook();
        }
        true
    }

    /// Waits for the live chain, if any, to finish on its own.
    pub async fn finish(&mut self) -> InterruptStats {
        if let Some(task) = self.live.take() {
            self.reap(task).await;
        }
        self.stats
    }

    /// Consumes a signal queue until `EndOfStream` or until it closes, then
    /// waits for the last chain.
    ///
    /// - `Control(UserStartedSpeaking)` cancels the live chain.
    /// - `Transcription` from a participant other than the bot, or `Text`,
    ///   starts a new chain (cancelling the live one).
    /// - Everything else is ignored.
    pub async fn run(&mut self, mut signals: FrameReceiver) -> InterruptStats {
        while let Some(frame) = signals.recv().await {
            match &frame {
                Frame::EndOfStream => break,
                Frame::Control(ControlSignal::UserStartedSpeaking) => {
                    self.interrupt().await;
                }
                Frame::Transcription { participant_id, .. } => {
                    if self.is_bot(participant_id) {
                        tracing::trace!(participant_id = %participant_id, "ignoring bot transcription");
                    } else {
                        self.start_chain(frame).await;
                    }
                }
                Frame::Text { .. } => self.start_chain(frame).await,
                other => tracing::trace!(signal = %other.summary(), "ignoring signal"),
            }
        }
        self.finish().await
    }

    fn is_bot(&self, participant_id: &str) -> bool {
        self.bot_participant_id.as_deref() == Some(participant_id)
    }

    async fn reap(&mut self, task: ChainTask) {
        let outcome = task.await;
        self.record(outcome);
    }

    fn record(&mut self, outcome: Result<Result<usize, StageError>, JoinError>) {
        match outcome {
            Ok(Ok(delivered)) => tracing::debug!(delivered, "chain finished"),
            Ok(Err(error)) => {
                // Already reported by the chain's own reporter.
                tracing::debug!(%error, "chain failed");
                self.stats.failed += 1;
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "chain task panicked");
                self.stats.failed += 1;
            }
        }
    }
}

impl Drop for InterruptCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.live.take() {
            task.abort();
        }
    }
}
