//! Audio transcode path
//!
//! Compressed audio packet → decoder → resampler (8 kHz, mono, S16) →
//! frame assembler → narrowband (G.711) encoder.

pub mod assembler;
pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod resampler;

pub use pipeline::AudioTranscoder;
