//! voxchain - Frame-streaming engine for real-time voice pipelines
//!
//! Stages exchange typed frames over lazy async streams; pipelines compose
//! stages, tees fan frames out, and an interrupt coordinator keeps a single
//! generation chain live.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod frame;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod services;
pub mod stages;

// Frames
pub use frame::{ControlSignal, Frame, FrameKind, Message, Role, ServiceKind};

// Stage framework (source → stage → sink)
pub use pipeline::sink::{CollectorSink, FrameSink};
pub use pipeline::source::{FrameSource, IterSource, QueueSource, StreamSource};
pub use pipeline::stage::{FrameStream, Stage};

// Composition
pub use pipeline::interrupt::{ChainFactory, InterruptCoordinator};
pub use pipeline::orchestrator::{Pipeline, PipelineHandle, PipelineState};
pub use pipeline::tee::{broadcast, tee};

// Error handling
pub use error::{Result, VoxchainError};
pub use pipeline::error::{ErrorReporter, StageError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
