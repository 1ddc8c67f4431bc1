//! Paced real-time playback of media files.
//!
//! A file is demuxed, its audio transcoded to G.711 and its H.264 video
//! rewritten into self-contained Annex B access units; both are then handed to
//! a host-supplied [`PacketSink`] at their original presentation timing.
//! Playback is driven through an [`Engine`] with start/pause/resume/stop
//! commands and reports back through an [`EventSink`].

pub mod config;
pub(crate) mod dispatcher;
pub mod engine;
pub(crate) mod error;
pub(crate) mod ffmpeg_utils;
pub mod pacing;
pub mod probe;
pub mod sdp;
pub mod session;
pub mod sink;
pub mod source;
pub(crate) mod transcode;
pub(crate) mod types;
pub mod unit;
pub mod video;
pub(crate) mod worker;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{AudioConfig, EngineConfig, NarrowbandCodec, ParameterSetMode, VideoConfig};
pub use dispatcher::Command;
pub use engine::Engine;
pub use error::{FfmpegError, PlayError, Result};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, install_log_filter};
pub use session::SessionSnapshot;
pub use sink::{Event, EventKind, EventSink, ExitReason, LogEventSink, PacketSink};
pub use source::{FfmpegOpener, MediaSource, SourceOpener, Step};
pub use types::{
    AudioStreamInfo, MediaKind, MediaUnit, PlaybackState, PlaybackStats, SessionId,
    VideoStreamInfo,
};
pub use video::split_annexb;
