//! Core stage abstraction and its driver loop.

use crate::frame::Frame;
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::sink::FrameSink;
use crate::pipeline::source::FrameSource;
use async_stream::stream;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

/// Lazy stream of frames produced by a stage.
pub type FrameStream<'a> = BoxStream<'a, Result<Frame, StageError>>;

/// A processing stage.
///
/// A stage pulls frames from a [`FrameSource`], runs [`Stage::process`] on
/// each, and yields whatever `process` produces, in order. When the input
/// ends it runs [`Stage::finalize`] once to flush buffered state.
pub trait Stage: Send {
    /// Returns the name of this stage for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Transforms one frame into zero or more frames.
    ///
    /// The default forwards the frame unchanged, so frame kinds a stage does
    /// not special-case always propagate.
    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        forward(frame)
    }

    /// Flushes buffered state. Called exactly once per run.
    fn finalize(&mut self) -> FrameStream<'_> {
        nothing()
    }

    /// Runs the stage over `source`, reporting errors through [`LogReporter`].
    fn run<'a>(&'a mut self, source: Box<dyn FrameSource + 'a>) -> FrameStream<'a> {
        self.run_with_reporter(source, Arc::new(LogReporter))
    }

    /// Runs the stage over `source` with an explicit error reporter.
    fn run_with_reporter<'a>(
        &'a mut self,
        source: Box<dyn FrameSource + 'a>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> FrameStream<'a> {
        drive(self, source, reporter)
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process(&mut self, frame: Frame) -> FrameStream<'_> {
        (**self).process(frame)
    }

    fn finalize(&mut self) -> FrameStream<'_> {
        (**self).finalize()
    }

    fn run<'a>(&'a mut self, source: Box<dyn FrameSource + 'a>) -> FrameStream<'a> {
        (**self).run(source)
    }

    fn run_with_reporter<'a>(
        &'a mut self,
        source: Box<dyn FrameSource + 'a>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> FrameStream<'a> {
        (**self).run_with_reporter(source, reporter)
    }
}

/// A stream that yields `frame` once.
pub fn forward<'a>(frame: Frame) -> FrameStream<'a> {
    stream::iter([Ok(frame)]).boxed()
}

/// A stream that yields `frames` in order.
pub fn emit<'a>(frames: Vec<Frame>) -> FrameStream<'a> {
    stream::iter(frames.into_iter().map(Ok)).boxed()
}

/// A stream that yields nothing.
pub fn nothing<'a>() -> FrameStream<'a> {
    stream::empty().boxed()
}

/// Main driver loop for a stage.
///
/// Ordering at end of input: an observed `EndOfStream` is not passed to
/// `process`. The driver stops pulling, yields the `finalize` output and then
/// re-emits `EndOfStream` as the last frame, so downstream stages see
/// flushed frames before the marker. A source that simply runs dry ends the
/// stream after `finalize` without a marker.
///
/// Errors raised by the stage itself are reported once here. Recoverable
/// ones become `Error` frames; fatal ones end the stream. Errors arriving
/// from the source were reported upstream and are only propagated.
pub fn drive<'a, S>(
    stage: &'a mut S,
    mut source: Box<dyn FrameSource + 'a>,
    reporter: Arc<dyn ErrorReporter>,
) -> FrameStream<'a>
where
    S: Stage + ?Sized,
{
    Box::pin(stream! {
        let name = stage.name();
        tracing::debug!(stage = name, "stage started");

        let mut saw_end_marker = false;
        let mut processed: u64 = 0;

        loop {
            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(stage = name, %error, "upstream failed, stopping");
                    yield Err(error);
                    return;
                }
            };

            if frame.is_end_of_stream() {
                saw_end_marker = true;
                break;
            }

            processed += 1;
            let mut output = stage.process(frame);
            while let Some(item) = output.next().await {
                match item {
                    Ok(frame) => yield Ok(frame),
                    Err(error) => {
                        reporter.report(name, &error);
                        match error {
                            StageError::Recoverable(message) => yield Ok(Frame::error(message)),
                            fatal @ StageError::Fatal(_) => {
                                yield Err(fatal);
                                return;
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(stage = name, processed, "input ended, finalizing");

        let mut flushed = stage.finalize();
        while let Some(item) = flushed.next().await {
            match item {
                Ok(frame) => yield Ok(frame),
                Err(error) => {
                    reporter.report(name, &error);
                    match error {
                        StageError::Recoverable(message) => yield Ok(Frame::error(message)),
                        fatal @ StageError::Fatal(_) => {
                            yield Err(fatal);
                            return;
                        }
                    }
                }
            }
        }
        drop(flushed);

        if saw_end_marker {
            yield Ok(Frame::EndOfStream);
        }
        tracing::debug!(stage = name, "stage completed");
    })
}

/// Drains `stage.run(source)` into `sink`.
///
/// With `append_end_marker` an `EndOfStream` frame is delivered afterwards,
/// unless the output already ended with one. Returns the number of frames
/// delivered.
pub async fn run_to_sink<S, Src, K>(
    stage: &mut S,
    source: Src,
    sink: &mut K,
    append_end_marker: bool,
) -> Result<usize, StageError>
where
    S: Stage + ?Sized,
    Src: FrameSource,
    K: FrameSink + ?Sized,
{
    let mut delivered = 0;
    let mut ended_with_marker = false;

    let mut output = stage.run(Box::new(source));
    while let Some(item) = output.next().await {
        let frame = item?;
        ended_with_marker = frame.is_end_of_stream();
        sink.accept(frame).await?;
        delivered += 1;
    }
    drop(output);

    if append_end_marker && !ended_with_marker {
        sink.accept(Frame::EndOfStream).await?;
        delivered += 1;
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sink::{CollectorSink, frame_queue};
    use crate::pipeline::source::{IterSource, QueueSource, StreamSource};
    use async_stream::stream;
    use std::sync::Mutex;

    /// Forwards everything.
    struct Identity;

    impl Stage for Identity {
        fn name(&self) -> &'static str {
            "Identity"
        }
    }

    /// Uppercases text, buffers the last word until finalize.
    struct Shouter {
        pending: Option<String>,
        finalize_calls: usize,
    }

    impl Shouter {
        fn new() -> Self {
            Self {
                pending: None,
                finalize_calls: 0,
            }
        }
    }

    impl Stage for Shouter {
        fn name(&self) -> &'static str {
            "Shouter"
        }

        fn process(&mut self, frame: Frame) -> FrameStream<'_> {
            match frame {
                Frame::Text { text, .. } => {
                    let previous = self.pending.replace(text.to_uppercase());
                    emit(previous.into_iter().map(Frame::text).collect())
                }
                other => forward(other),
            }
        }

        fn finalize(&mut self) -> FrameStream<'_> {
            self.finalize_calls += 1;
            emit(self.pending.take().into_iter().map(Frame::text).collect())
        }
    }

    /// Fails on a given text, either recoverably or fatally.
    struct Failing {
        fail_on: &'static str,
        fatal: bool,
    }

    impl Stage for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        fn process(&mut self, frame: Frame) -> FrameStream<'_> {
            if frame.as_text() == Some(self.fail_on) {
                let error = if self.fatal {
                    StageError::Fatal(format!("failed on {}", self.fail_on))
                } else {
                    StageError::Recoverable(format!("failed on {}", self.fail_on))
                };
                stream::iter([Err(error)]).boxed()
            } else {
                forward(frame)
            }
        }
    }

    /// Emits three frames per input lazily.
    struct Triple;

    impl Stage for Triple {
        fn name(&self) -> &'static str {
            "Triple"
        }

        fn process(&mut self, frame: Frame) -> FrameStream<'_> {
            Box::pin(stream! {
                for _ in 0..3 {
                    yield Ok(frame.clone());
                }
            })
        }
    }

    // Mock error reporter that collects errors
    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, stage: &str, error: &StageError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((stage.to_string(), error.to_string()));
        }
    }

    async fn collect(stream: FrameStream<'_>) -> Vec<Result<Frame, StageError>> {
        stream.collect().await
    }

    fn texts(items: &[Result<Frame, StageError>]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .filter_map(|frame| frame.as_text().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_identity_over_iterator() {
        let frames = vec![
            Frame::Control(crate::frame::ControlSignal::StreamStarted),
            Frame::text("a"),
            Frame::audio(vec![1u8, 2], 16000, 1),
        ];
        let mut stage = Identity;
        let out = collect(stage.run(Box::new(IterSource::new(frames.clone())))).await;
        let out: Vec<Frame> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, frames);
    }

    #[tokio::test]
    async fn test_identity_over_stream() {
        let frames = vec![Frame::text("x"), Frame::text("y")];
        let mut stage = Identity;
        let source = StreamSource::new(futures_util::stream::iter(frames.clone()));
        let out = collect(stage.run(Box::new(source))).await;
        let out: Vec<Frame> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, frames);
    }

    #[tokio::test]
    async fn test_queue_input_stops_at_end_marker() {
        let (tx, mut rx) = frame_queue(8);
        tx.send(Frame::text("one")).await.unwrap();
        tx.send(Frame::EndOfStream).await.unwrap();
        tx.send(Frame::text("after the marker")).await.unwrap();

        let mut stage = Identity;
        let out = collect(stage.run(Box::new(QueueSource::new(&mut rx)))).await;
        let out: Vec<Frame> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, vec![Frame::text("one"), Frame::EndOfStream]);

        // The frame behind the marker was never pulled.
        assert_eq!(rx.recv().await, Some(Frame::text("after the marker")));
    }

    #[tokio::test]
    async fn test_finalize_output_precedes_end_marker() {
        let frames = vec![Frame::text("hello"), Frame::text("world"), Frame::EndOfStream];
        let mut stage = Shouter::new();
        let out = collect(stage.run(Box::new(IterSource::new(frames)))).await;
        let out: Vec<Frame> = out.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            out,
            vec![Frame::text("HELLO"), Frame::text("WORLD"), Frame::EndOfStream]
        );
        assert_eq!(stage.finalize_calls, 1);
    }

    #[tokio::test]
    async fn test_finalize_runs_once_when_source_runs_dry() {
        let mut stage = Shouter::new();
        let out = collect(stage.run(Box::new(IterSource::new(vec![Frame::text("solo")])))).await;
        assert_eq!(texts(&out), vec!["SOLO"]);
        assert_eq!(stage.finalize_calls, 1);
    }

    #[tokio::test]
    async fn test_finalize_on_empty_buffer_yields_nothing() {
        let mut stage = Shouter::new();
        let out = collect(stage.run(Box::new(IterSource::new(vec![])))).await;
        assert!(out.is_empty());
        assert_eq!(stage.finalize_calls, 1);
    }

    #[tokio::test]
    async fn test_one_frame_fans_out_to_many() {
        let mut stage = Triple;
        let out = collect(stage.run(Box::new(IterSource::new(vec![Frame::text("x")])))).await;
        assert_eq!(texts(&out), vec!["x", "x", "x"]);
    }

    #[tokio::test]
    async fn test_recoverable_error_becomes_error_frame() {
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let mut stage = Failing {
            fail_on: "bad",
            fatal: false,
        };
        let frames = vec![Frame::text("ok"), Frame::text("bad"), Frame::text("fine")];

        let out = collect(stage.run_with_reporter(Box::new(IterSource::new(frames)), reporter)).await;
        let out: Vec<Frame> = out.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            out,
            vec![
                Frame::text("ok"),
                Frame::error("failed on bad"),
                Frame::text("fine")
            ]
        );
        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Failing");
    }

    #[tokio::test]
    async fn test_fatal_error_ends_stream() {
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let mut stage = Failing {
            fail_on: "bad",
            fatal: true,
        };
        let frames = vec![Frame::text("ok"), Frame::text("bad"), Frame::text("never")];

        let out = collect(stage.run_with_reporter(Box::new(IterSource::new(frames)), reporter)).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Ok(Frame::text("ok")));
        assert_eq!(out[1], Err(StageError::Fatal("failed on bad".to_string())));
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_is_propagated_without_report() {
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let items = vec![
            Ok(Frame::text("ok")),
            Err(StageError::Fatal("upstream".to_string())),
        ];
        let mut stage = Shouter::new();
        let source = StreamSource::fallible(futures_util::stream::iter(items));

        let out = collect(stage.run_with_reporter(Box::new(source), reporter)).await;

        assert_eq!(out, vec![Err(StageError::Fatal("upstream".to_string()))]);
        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(stage.finalize_calls, 0, "aborted runs do not finalize");
    }

    #[tokio::test]
    async fn test_run_to_sink_appends_end_marker() {
        let mut stage = Identity;
        let mut sink = CollectorSink::new();
        let delivered = run_to_sink(
            &mut stage,
            IterSource::new(vec![Frame::text("a")]),
            &mut sink,
            true,
        )
        .await
        .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(sink.frames(), &[Frame::text("a"), Frame::EndOfStream]);
    }

    #[tokio::test]
    async fn test_run_to_sink_does_not_duplicate_end_marker() {
        let mut stage = Identity;
        let mut sink = CollectorSink::new();
        run_to_sink(
            &mut stage,
            IterSource::new(vec![Frame::text("a"), Frame::EndOfStream]),
            &mut sink,
            true,
        )
        .await
        .unwrap();

        assert_eq!(sink.frames(), &[Frame::text("a"), Frame::EndOfStream]);
    }

    #[tokio::test]
    async fn test_run_to_sink_without_marker() {
        let mut stage = Identity;
        let (mut tx, mut rx) = frame_queue(4);
        run_to_sink(
            &mut stage,
            IterSource::new(vec![Frame::text("a")]),
            &mut tx,
            false,
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(Frame::text("a")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_run_to_sink_surfaces_fatal_error() {
        let mut stage = Failing {
            fail_on: "bad",
            fatal: true,
        };
        let mut sink = CollectorSink::new();
        let result = run_to_sink(
            &mut stage,
            IterSource::new(vec![Frame::text("ok"), Frame::text("bad")]),
            &mut sink,
            true,
        )
        .await;

        assert!(result.unwrap_err().is_fatal());
        // Partial output already delivered stays delivered.
        assert_eq!(sink.frames(), &[Frame::text("ok")]);
    }

    #[tokio::test]
    async fn test_boxed_stage_is_a_stage() {
        let mut stage: Box<dyn Stage> = Box::new(Identity);
        assert_eq!(stage.name(), "Identity");
        let out = collect(stage.run(Box::new(IterSource::new(vec![Frame::text("boxed")])))).await;
        assert_eq!(texts(&out), vec!["boxed"]);
    }
}
