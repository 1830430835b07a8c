//! Frame-streaming engine.
//!
//! A [`Stage`] turns a pulled input of frames into a lazy output stream. A
//! [`Pipeline`] chains stages directly, stream into stream, and is itself a
//! stage. Stages or pipelines that run as separate tokio tasks are connected
//! by bounded frame queues, which carry backpressure.

pub mod error;
pub mod interrupt;
pub mod orchestrator;
pub mod sink;
pub mod source;
pub mod stage;
pub mod tee;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use interrupt::{ChainFactory, InterruptCoordinator, InterruptStats};
pub use orchestrator::{Pipeline, PipelineHandle, PipelineState};
pub use sink::{CollectorSink, FrameReceiver, FrameSender, FrameSink, frame_queue};
pub use source::{FrameSource, IterSource, QueueSource, StreamSource};
pub use stage::{FrameStream, Stage, emit, forward, nothing, run_to_sink};
pub use tee::{broadcast, tee};
