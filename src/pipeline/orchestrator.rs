//! Pipeline: an ordered chain of stages that is itself a stage.

use crate::frame::Frame;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::source::{FrameSource, StreamSource};
use crate::pipeline::stage::{FrameStream, Stage};
use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one pipeline run.
///
/// `Idle → Running → Draining → Finalizing → Completed`, or `Failed` from any
/// non-terminal state. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PipelineState {
    /// Not started.
    Idle = 0,
    /// Frames are flowing.
    Running = 1,
    /// The pipeline's own input has ended; in-flight frames and upstream
    /// finalize passes are still propagating.
    Draining = 2,
    /// Every stage except the last has finished; only the last stage's
    /// finalize output remains.
    Finalizing = 3,
    /// All output delivered.
    Completed = 4,
    /// A stage failed fatally. Output delivered before the failure stands.
    Failed = 5,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            3 => PipelineState::Finalizing,
            4 => PipelineState::Completed,
            _ => PipelineState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Finalizing => "finalizing",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Read-only view of a pipeline's state, usable while the pipeline's output
/// stream holds the pipeline borrowed.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    state: Arc<AtomicU8>,
}

impl PipelineHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PipelineState::Idle as u8)),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Returns true while frames may still be produced.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            PipelineState::Running | PipelineState::Draining | PipelineState::Finalizing
        )
    }

    fn advance(&self, to: PipelineState) {
        self.state.fetch_max(to as u8, Ordering::SeqCst);
    }
}

/// Source wrapper that advances the pipeline state when its input ends.
struct WatchedSource<'a> {
    inner: Box<dyn FrameSource + 'a>,
    handle: PipelineHandle,
    on_end: PipelineState,
}

#[async_trait]
impl FrameSource for WatchedSource<'_> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, StageError> {
        let next = self.inner.next_frame().await;
        match &next {
            Ok(None) => self.handle.advance(self.on_end),
            Ok(Some(frame)) if frame.is_end_of_stream() => self.handle.advance(self.on_end),
            _ => {}
        }
        next
    }
}

/// Ordered chain of stages: stage *i*'s output stream is stage *i+1*'s input.
///
/// No buffering is inserted between stages. A pipeline runs once; running a
/// completed or failed pipeline yields a fatal error.
pub struct Pipeline {
    name: &'static str,
    stages: Vec<Box<dyn Stage>>,
    error_reporter: Arc<dyn ErrorReporter>,
    handle: PipelineHandle,
}

impl Pipeline {
    /// Creates a pipeline with the default error reporter.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            name: "Pipeline",
            stages,
            error_reporter: Arc::new(LogReporter),
            handle: PipelineHandle::new(),
        }
    }

    /// Appends a stage to the end of the chain.
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Sets a custom error reporter, used for every inner stage.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Sets the name used in logs and error reports.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Returns an observer for this pipeline's state.
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.handle.state()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Drains the pipeline's output into `sink`. See [`crate::pipeline::stage::run_to_sink`].
    pub async fn run_to_sink<Src, K>(
        &mut self,
        source: Src,
        sink: &mut K,
        append_end_marker: bool,
    ) -> Result<usize, StageError>
    where
        Src: FrameSource,
        K: crate::pipeline::sink::FrameSink + ?Sized,
    {
        crate::pipeline::stage::run_to_sink(self, source, sink, append_end_marker).await
    }
}

/// Drains one stage output into `into`. Recoverable errors become `Error`
/// frames; a fatal error is returned for the caller to propagate.
async fn drain_into(
    stage_name: &'static str,
    mut output: FrameStream<'_>,
    into: &mut Vec<Frame>,
    reporter: &dyn ErrorReporter,
) -> Result<(), StageError> {
    while let Some(item) = output.next().await {
        match item {
            Ok(frame) => into.push(frame),
            Err(StageError::Recoverable(message)) => {
                reporter.report(stage_name, &StageError::Recoverable(message.clone()));
                into.push(Frame::error(message));
            }
            Err(fatal) => return Err(fatal),
        }
    }
    Ok(())
}

/// Streams frames straight from a source, stopping after `EndOfStream`.
fn passthrough<'a>(mut source: Box<dyn FrameSource + 'a>) -> FrameStream<'a> {
    Box::pin(stream! {
        loop {
            match source.next_frame().await {
                Ok(Some(frame)) => {
                    let last = frame.is_end_of_stream();
                    yield Ok(frame);
                    if last {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    yield Err(error);
                    break;
                }
            }
        }
    })
}

impl Stage for Pipeline {
    fn name(&self) -> &'static str {
        self.name
    }

    /// Pushes one frame through every stage in order.
    ///
    /// Used when a pipeline is driven frame-by-frame by a caller other than
    /// [`Stage::run`]; `run` chains the stages lazily instead.
    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        let stages = &mut self.stages;
        let reporter = self.error_reporter.clone();
        Box::pin(stream! {
            let mut frames = vec![frame];
            for stage in stages.iter_mut() {
                let name = stage.name();
                let mut next = Vec::new();
                for frame in frames {
                    if let Err(error) = drain_into(name, stage.process(frame), &mut next, &*reporter).await {
                        yield Err(error);
                        return;
                    }
                }
                frames = next;
            }
            for frame in frames {
                yield Ok(frame);
            }
        })
    }

    /// Finalizes every stage in order. Frames flushed by stage *i* pass
    /// through `process` of stages *i+1..n* before those stages finalize.
    fn finalize(&mut self) -> FrameStream<'_> {
        let stages = &mut self.stages;
        let reporter = self.error_reporter.clone();
        Box::pin(stream! {
            let mut carried: Vec<Frame> = Vec::new();
            for stage in stages.iter_mut() {
                let name = stage.name();
                let mut next = Vec::new();
                for frame in carried {
                    if let Err(error) = drain_into(name, stage.process(frame), &mut next, &*reporter).await {
                        yield Err(error);
                        return;
                    }
                }
                if let Err(error) = drain_into(name, stage.finalize(), &mut next, &*reporter).await {
                    yield Err(error);
                    return;
                }
                carried = next;
            }
            for frame in carried {
                yield Ok(frame);
            }
        })
    }

    fn run<'a>(&'a mut self, source: Box<dyn FrameSource + 'a>) -> FrameStream<'a> {
        let reporter = self.error_reporter.clone();
        self.run_with_reporter(source, reporter)
    }

    fn run_with_reporter<'a>(
        &'a mut self,
        source: Box<dyn FrameSource + 'a>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> FrameStream<'a> {
        let handle = self.handle.clone();
        let name = self.name;

        let state = handle.state();
        if state != PipelineState::Idle {
            let error = StageError::Fatal(format!("{} already ran (state: {})", name, state));
            reporter.report(name, &error);
            return futures_util::stream::iter([Err::<Frame, StageError>(error)]).boxed();
        }
        handle.advance(PipelineState::Running);
        tracing::debug!(pipeline = name, stages = self.stages.len(), "pipeline started");

        let last = self.stages.len().saturating_sub(1);
        let mut output = passthrough(Box::new(WatchedSource {
            inner: source,
            handle: handle.clone(),
            on_end: PipelineState::Draining,
        }));

        for (index, stage) in self.stages.iter_mut().enumerate() {
            let input: Box<dyn FrameSource + 'a> = Box::new(StreamSource::fallible(output));
            let input: Box<dyn FrameSource + 'a> = if index == last {
                Box::new(WatchedSource {
                    inner: input,
                    handle: handle.clone(),
                    on_end: PipelineState::Finalizing,
                })
            } else {
                input
            };
            output = stage.run_with_reporter(input, reporter.clone());
        }

        Box::pin(stream! {
            while let Some(item) = output.next().await {
                if item.is_err() {
                    handle.advance(PipelineState::Failed);
                    tracing::debug!(pipeline = name, "pipeline failed");
                    yield item;
                    return;
                }
                yield item;
            }
            handle.advance(PipelineState::Completed);
            tracing::debug!(pipeline = name, "pipeline completed");
        })
    }
}
