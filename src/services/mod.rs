//! Contracts for the external services a voice pipeline calls.
//!
//! Each contract has a deterministic mock used by tests and by the offline
//! CLI demos. Real adapters (HTTP clients, local models) live outside this
//! crate and implement the same traits.

pub mod image;
pub mod llm;
pub mod stt;
pub mod tts;

pub use image::{GeneratedImage, ImageService, MockImageGen};
pub use llm::{LlmChunk, LlmService, LlmStream, MockLlm};
pub use stt::{MockStt, SttService};
pub use tts::{AudioStream, MockTts, TtsService};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mock's call log, ignoring poisoning from a panicked test thread.
pub(crate) fn lock_log<T>(log: &Mutex<T>) -> MutexGuard<'_, T> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}
