//! Cross-module tests
//!
//! - `scenarios`: engine control, pacing and lifecycle over scripted sources
//! - `media`: the FFmpeg-backed source on generated WAV and MP4 files

pub mod fixtures;
