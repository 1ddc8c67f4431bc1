//! Media sources
//!
//! The pacing worker only sees [`MediaSource`]: one call reads one container
//! packet and routes it through the matching path. [`FfmpegOpener`] builds the
//! real thing on top of the prober and the two media paths.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::config::EngineConfig;
use crate::error::{PlayError, Result};
use crate::probe::{self, ProbedFile};
use crate::transcode::AudioTranscoder;
use crate::types::{MediaKind, MediaUnit};
use crate::video::VideoRepackager;

/// Outcome of reading one container packet
#[derive(Debug)]
pub enum Step {
    /// A packet of a selected stream, with whatever it produced
    Packet {
        kind: MediaKind,
        units: Vec<MediaUnit>,
    },
    /// A packet of a stream that is not played
    Ignored,
    Eof,
}

/// A demuxed, routed stream of encoded units.
///
/// `next_step` returns per-packet failures (see [`PlayError::is_per_packet`])
/// as errors the caller may skip; any other error ends the run. Sources are
/// built and consumed on the worker thread, so they need not be `Send`.
pub trait MediaSource {
    fn next_step(&mut self) -> Result<Step>;

    /// Drain buffered output after `Step::Eof`.
    fn finish(&mut self) -> Result<Vec<MediaUnit>>;

    /// Raw audio frames decoded so far
    fn decoded_audio_frames(&self) -> u64 {
        0
    }
}

/// Builds sources for files.
pub trait SourceOpener: Send + Sync {
    /// Fast check run by the dispatcher before a worker is spawned.
    fn check(&self, path: &Path) -> Result<()>;

    /// Probe `path` and set up its media paths. Runs on the worker.
    fn open(&self, path: &Path, config: &EngineConfig) -> Result<Box<dyn MediaSource>>;
}

/// Opener backed by FFmpeg
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl SourceOpener for FfmpegOpener {
    fn check(&self, path: &Path) -> Result<()> {
        probe::check_readable(path)
    }

    fn open(&self, path: &Path, config: &EngineConfig) -> Result<Box<dyn MediaSource>> {
        let source = FileSource::open(path, config)?;
        Ok(Box::new(source))
    }
}

pub struct FileSource {
    file: ProbedFile,
    audio: Option<AudioTranscoder>,
    video: Option<VideoRepackager>,
}

impl FileSource {
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self> {
        let file = probe::probe_file(path, config.video.enabled)?;

        let audio = match &file.audio {
            Some(info) => {
                let stream = file.input.stream(info.stream_index).ok_or_else(|| {
                    PlayError::Probe {
                        path: path.display().to_string(),
                        reason: format!("audio stream {} vanished", info.stream_index),
                    }
                })?;
                Some(AudioTranscoder::open(&stream, info.clone(), &config.audio)?)
            }
            None => {
                tracing::info!(file = %path.display(), "no audio stream, audio path idle");
                None
            }
        };

        let video = match &file.video {
            Some(info) => Some(VideoRepackager::open(info.clone(), &config.video)?),
            None => None,
        };

        Ok(Self {
            file,
            audio,
            video,
        })
    }

    fn route(
        &mut self,
        kind: MediaKind,
        packet: &ffmpeg::codec::packet::Packet,
    ) -> Result<Vec<MediaUnit>> {
        match kind {
            MediaKind::Audio => match self.audio.as_mut() {
                Some(audio) => audio.transcode(packet),
                None => Ok(Vec::new()),
            },
            MediaKind::Video => match self.video.as_mut() {
                Some(video) => Ok(vec![video.repackage(packet)?]),
                None => Ok(Vec::new()),
            },
        }
    }
}

impl MediaSource for FileSource {
    fn next_step(&mut self) -> Result<Step> {
        // A fresh packet per read; the previous one is released on drop
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match packet.read(&mut self.file.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(Step::Eof),
            Err(e) => {
                return Err(PlayError::Read(format!(
                    "{}: {}",
                    self.file.path.display(),
                    e
                )))
            }
        }

        match self.file.kind_of(packet.stream()) {
            Some(kind) => {
                let units = self.route(kind, &packet)?;
                Ok(Step::Packet { kind, units })
            }
            None => Ok(Step::Ignored),
        }
    }

    fn finish(&mut self) -> Result<Vec<MediaUnit>> {
        match self.audio.as_mut() {
            Some(audio) => audio.finish(),
            None => Ok(Vec::new()),
        }
    }

    fn decoded_audio_frames(&self) -> u64 {
        self.audio.as_ref().map(|a| a.decoded_frames()).unwrap_or(0)
    }
}
