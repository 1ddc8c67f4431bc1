//! Stream prober
//!
//! Opens the container, classifies every stream, and selects at most one
//! audio and one video stream (first of each kind wins). Selection is a pure
//! function over [`StreamDescriptor`]s so it can be tested without media.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::error::{PlayError, Result};
use crate::ffmpeg_utils::helpers::{
    codec_params_channels, codec_params_extradata, codec_params_height, codec_params_sample_rate,
    codec_params_width,
};
use crate::ffmpeg_utils::utils::debug_stream_info;
use crate::types::{AudioStreamInfo, MediaKind, VideoStreamInfo};

/// One container stream as seen by the prober
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: Option<MediaKind>,
    pub codec_id: ffmpeg::codec::Id,
}

/// Stream indices chosen for playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub audio: Option<usize>,
    pub video: Option<usize>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

/// Pick the first audio stream and the first H.264 video stream.
///
/// Video streams in any other codec are skipped: the repackage path only
/// knows how to make H.264 self-describing.
pub fn select_streams(streams: &[StreamDescriptor], video_enabled: bool) -> Selection {
    let mut selection = Selection::default();
    for s in streams {
        match s.kind {
            Some(MediaKind::Audio) if selection.audio.is_none() => {
                selection.audio = Some(s.index);
            }
            Some(MediaKind::Video) if video_enabled && selection.video.is_none() => {
                if s.codec_id == ffmpeg::codec::Id::H264 {
                    selection.video = Some(s.index);
                } else {
                    tracing::warn!(
                        stream_index = s.index,
                        codec = ?s.codec_id,
                        "ignoring non-H.264 video stream"
                    );
                }
            }
            Some(kind) => {
                tracing::debug!(stream_index = s.index, %kind, "ignoring extra stream");
            }
            None => {}
        }
    }
    selection
}

/// Cheap readability check run before a worker is spawned.
pub fn check_readable(path: &Path) -> Result<()> {
    let open_err = |reason: String| PlayError::Open {
        path: path.display().to_string(),
        reason,
    };
    let meta = std::fs::metadata(path).map_err(|e| open_err(e.to_string()))?;
    if !meta.is_file() {
        return Err(open_err("not a regular file".to_string()));
    }
    std::fs::File::open(path).map_err(|e| open_err(e.to_string()))?;
    Ok(())
}

/// An opened container with its selected streams
pub struct ProbedFile {
    pub path: PathBuf,
    pub input: ffmpeg::format::context::Input,
    pub streams: Vec<StreamDescriptor>,
    pub audio: Option<AudioStreamInfo>,
    pub video: Option<VideoStreamInfo>,
}

impl ProbedFile {
    pub fn kind_of(&self, stream_index: usize) -> Option<MediaKind> {
        if self.audio.as_ref().map(|a| a.stream_index) == Some(stream_index) {
            Some(MediaKind::Audio)
        } else if self.video.as_ref().map(|v| v.stream_index) == Some(stream_index) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Open `path` and select its playable streams.
pub fn probe_file(path: &Path, video_enabled: bool) -> Result<ProbedFile> {
    check_readable(path)?;

    let input = ffmpeg::format::input(&path).map_err(|e| PlayError::Probe {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let streams: Vec<StreamDescriptor> = input
        .streams()
        .map(|stream| {
            debug_stream_info(&stream, stream.index());
            let params = stream.parameters();
            let kind = match params.medium() {
                ffmpeg::media::Type::Audio => Some(MediaKind::Audio),
                ffmpeg::media::Type::Video => Some(MediaKind::Video),
                _ => None,
            };
            StreamDescriptor {
                index: stream.index(),
                kind,
                codec_id: params.id(),
            }
        })
        .collect();

    let selection = select_streams(&streams, video_enabled);
    if selection.is_empty() {
        return Err(PlayError::Probe {
            path: path.display().to_string(),
            reason: format!(
                "no playable stream among {} (need audio or H.264 video)",
                streams.len()
            ),
        });
    }

    let audio = selection
        .audio
        .and_then(|i| input.stream(i))
        .map(|stream| analyze_audio(&stream));
    let video = selection
        .video
        .and_then(|i| input.stream(i))
        .map(|stream| analyze_video(&stream));

    tracing::info!(
        file = %path.display(),
        streams = streams.len(),
        audio = ?audio.as_ref().map(|a| (a.stream_index, a.codec_id, a.sample_rate, a.channels)),
        video = ?video.as_ref().map(|v| (v.stream_index, v.width, v.height)),
        "probed media file"
    );

    Ok(ProbedFile {
        path: path.to_path_buf(),
        input,
        streams,
        audio,
        video,
    })
}

fn start_time(stream: &ffmpeg::Stream) -> i64 {
    match stream.start_time() {
        i64::MIN => 0,
        t => t,
    }
}

fn analyze_audio(stream: &ffmpeg::Stream) -> AudioStreamInfo {
    let params = stream.parameters();
    AudioStreamInfo {
        stream_index: stream.index(),
        codec_id: params.id(),
        sample_rate: codec_params_sample_rate(&params),
        channels: codec_params_channels(&params),
        timebase: stream.time_base(),
        start_time: start_time(stream),
    }
}

fn analyze_video(stream: &ffmpeg::Stream) -> VideoStreamInfo {
    let params = stream.parameters();
    VideoStreamInfo {
        stream_index: stream.index(),
        codec_id: params.id(),
        width: codec_params_width(&params),
        height: codec_params_height(&params),
        timebase: stream.time_base(),
        start_time: start_time(stream),
        extradata: codec_params_extradata(&params),
    }
}
