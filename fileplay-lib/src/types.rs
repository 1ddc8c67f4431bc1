use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// The two media kinds the engine routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub(crate) fn slot(self) -> usize {
        match self {
            MediaKind::Audio => 0,
            MediaKind::Video => 1,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// One encoded unit handed to the packet sink.
///
/// Audio units are single narrowband frames; video units are complete access
/// units in Annex B form. Every video unit carries `marker`; on audio it flags
/// the first frame of a talkspurt and is set by the pacing worker.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUnit {
    pub kind: MediaKind,
    pub payload: Bytes,
    pub pts: Option<Duration>,
    pub marker: bool,
}

impl MediaUnit {
    pub fn audio(payload: impl Into<Bytes>, pts: Duration) -> Self {
        Self {
            kind: MediaKind::Audio,
            payload: payload.into(),
            pts: Some(pts),
            marker: false,
        }
    }

    pub fn video(payload: impl Into<Bytes>, pts: Option<Duration>) -> Self {
        Self {
            kind: MediaKind::Video,
            payload: payload.into(),
            pts,
            marker: true,
        }
    }
}

/// Playback state shared between the control path and the pacing worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlaybackState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Identifier of one externally established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Audio stream information
#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    pub stream_index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub sample_rate: u32,
    pub channels: u16,
    pub timebase: ffmpeg::Rational,
    pub start_time: i64,
}

/// Video stream information
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    pub stream_index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub width: u32,
    pub height: u32,
    pub timebase: ffmpeg::Rational,
    pub start_time: i64,
    /// Raw codec extradata (`avcC` record for MP4-style H.264)
    pub extradata: Vec<u8>,
}

/// Counters of one playback run (the timing context).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    pub packets: u64,
    pub audio_packets: u64,
    pub video_packets: u64,
    pub audio_frames: u64,
    pub narrowband_frames: u64,
    pub video_units: u64,
    pub skipped_packets: u64,
    pub dropped_units: u64,
    pub paused_for: Duration,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_roundtrip_u8() {
        for state in [
            PlaybackState::Stopped,
            PlaybackState::Playing,
            PlaybackState::Paused,
        ] {
            assert_eq!(PlaybackState::from_u8(state as u8), state);
        }
        assert_eq!(PlaybackState::from_u8(42), PlaybackState::Stopped);
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_media_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
    }
}
