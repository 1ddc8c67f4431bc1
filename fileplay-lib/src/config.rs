//! Engine configuration

use ffmpeg_next as ffmpeg;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Narrowband codec the audio path transcodes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrowbandCodec {
    /// G.711 A-law
    Pcma,
    /// G.711 µ-law
    Pcmu,
}

impl NarrowbandCodec {
    pub fn codec_id(self) -> ffmpeg::codec::Id {
        match self {
            NarrowbandCodec::Pcma => ffmpeg::codec::Id::PCM_ALAW,
            NarrowbandCodec::Pcmu => ffmpeg::codec::Id::PCM_MULAW,
        }
    }

    /// Static RTP payload type (RFC 3551)
    pub fn payload_type(self) -> u8 {
        match self {
            NarrowbandCodec::Pcma => 8,
            NarrowbandCodec::Pcmu => 0,
        }
    }

    pub fn rtpmap(self) -> &'static str {
        match self {
            NarrowbandCodec::Pcma => "PCMA/8000",
            NarrowbandCodec::Pcmu => "PCMU/8000",
        }
    }
}

/// Narrowband output sample rate
pub const NARROWBAND_RATE: u32 = 8000;

/// Longest narrowband frame accepted
pub const MAX_FRAME_MS: u32 = 1000;

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub codec: NarrowbandCodec,

    /// Duration of one narrowband frame in milliseconds
    pub frame_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: NarrowbandCodec::Pcma,
            frame_ms: 20,
        }
    }
}

impl AudioConfig {
    /// Samples per narrowband frame (160 at the default 20 ms)
    pub fn frame_samples(&self) -> usize {
        (NARROWBAND_RATE as u64 * self.frame_ms as u64 / 1000) as usize
    }
}

/// Where the reformatter puts SPS/PPS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSetMode {
    /// Every access unit lacking them gets SPS/PPS prepended
    EveryAccessUnit,
    /// Only access units carrying an IDR slice get SPS/PPS prepended
    KeyframesOnly,
}

/// Video repackaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Route video packets at all. When off the engine is audio-only.
    pub enabled: bool,

    pub parameter_sets: ParameterSetMode,

    /// Dynamic RTP payload type announced for H.264
    pub payload_type: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parameter_sets: ParameterSetMode::EveryAccessUnit,
            payload_type: 96,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wake granularity for pause/stop polling and pacing sleeps
    pub poll_interval_ms: u64,

    /// Lateness emitted as-is; anything beyond rebases the pacing clock
    pub catchup_tolerance_ms: u64,

    /// Reject file commands until the transport reports media up
    pub require_media_up: bool,

    pub audio: AudioConfig,

    pub video: VideoConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            catchup_tolerance_ms: 200,
            require_media_up: true,
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn catchup_tolerance(&self) -> Duration {
        Duration::from_millis(self.catchup_tolerance_ms)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.audio.frame_ms == 0 || self.audio.frame_ms > MAX_FRAME_MS {
            return Err(crate::PlayError::Config(format!(
                "audio.frame_ms {} is outside 1-{}",
                self.audio.frame_ms, MAX_FRAME_MS
            )));
        }
        if !(96..=127).contains(&self.video.payload_type) {
            return Err(crate::PlayError::Config(format!(
                "video.payload_type {} is outside the dynamic range 96-127",
                self.video.payload_type
            )));
        }
        if self.poll_interval_ms > 1000 {
            return Err(crate::PlayError::Config(format!(
                "poll_interval_ms {} exceeds 1000",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }
}
