//! Default configuration constants for voxchain.
//!
//! Shared by the configuration layer, the stages and the mock services so the
//! same value is never spelled twice.

/// Default audio sample rate in Hz.
///
/// 16kHz is what most speech services accept and emit.
pub const SAMPLE_RATE: u32 = 16000;

/// Default number of audio channels.
pub const CHANNELS: u16 = 1;

/// Bits per PCM sample. All audio frames carry 16-bit little-endian samples.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Maximum payload of one emitted audio frame, in bytes.
///
/// 8000 bytes is 250ms of 16kHz mono 16-bit audio.
pub const AUDIO_CHUNK_BYTES: usize = 8000;

/// Default capacity of the bounded queues between concurrently running
/// pipelines.
pub const QUEUE_CAPACITY: usize = 32;

/// Upper bound accepted for a configured queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 65536;

/// Characters that close a sentence for aggregation purposes.
pub const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Default system prompt seeded into the conversation context.
pub const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Keep your answers short; they will be spoken aloud.";

/// Default participant id of the bot itself.
pub const BOT_PARTICIPANT_ID: &str = "bot";

/// Default tracing filter directive.
pub const LOG_FILTER: &str = "voxchain=info";

/// Default prefix of the frame logger stage.
pub const LOGGER_PREFIX: &str = "Frame";
