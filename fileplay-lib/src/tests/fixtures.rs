//! Test fixtures
//!
//! Scripted media sources and recording sinks, so engine behaviour can be
//! exercised without media files, plus WAV and H.264/MP4 writers for the
//! FFmpeg-backed tests.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{PlayError, Result};
use crate::session::Session;
use crate::sink::{Event, EventSink, PacketSink};
use crate::source::{MediaSource, SourceOpener, Step};
use crate::types::{MediaKind, MediaUnit, SessionId};

/// Packet sink that keeps every unit with its arrival time.
#[derive(Default)]
pub struct RecordingPacketSink {
    units: Mutex<Vec<(Instant, MediaUnit)>>,
}

impl RecordingPacketSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn units(&self) -> Vec<(Instant, MediaUnit)> {
        self.units.lock().clone()
    }

    pub fn of_kind(&self, kind: MediaKind) -> Vec<(Instant, MediaUnit)> {
        self.units
            .lock()
            .iter()
            .filter(|(_, u)| u.kind == kind)
            .cloned()
            .collect()
    }
}

impl PacketSink for RecordingPacketSink {
    fn send(&self, unit: &MediaUnit) -> Result<()> {
        self.units.lock().push((Instant::now(), unit.clone()));
        Ok(())
    }
}

/// Event sink that keeps every event.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind.name() == name)
            .cloned()
            .collect()
    }

    /// Poll until an event called `name` has been emitted `count` times.
    pub fn wait_for(&self, name: &str, count: usize, timeout: Duration) -> Vec<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.named(name);
            if found.len() >= count || Instant::now() >= deadline {
                return found;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}

pub fn null_session() -> Arc<Session> {
    Session::new(SessionId::new(), RecordingPacketSink::new())
}

/// One scripted container packet
#[derive(Debug, Clone)]
pub enum Scripted {
    Unit(MediaKind, Option<Duration>),
    Ignored,
    BadPacket,
    ReadFailure,
}

/// Opener that plays a fixed script.
///
/// Paths containing `missing` fail the pre-flight check; paths containing
/// `corrupt` fail probing on the worker.
pub struct ScriptedOpener {
    script: Vec<Scripted>,
    tail: usize,
    pub opened: Mutex<Vec<String>>,
}

impl ScriptedOpener {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script,
            tail: 0,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// `frames` audio units at 20 ms spacing.
    pub fn audio(frames: usize) -> Arc<Self> {
        Self::new(audio_script(frames))
    }

    /// Like `audio`, with `tail` extra frames produced by the end-of-stream flush.
    pub fn audio_with_tail(frames: usize, tail: usize) -> Arc<Self> {
        Arc::new(Self {
            script: audio_script(frames),
            tail,
            opened: Mutex::new(Vec::new()),
        })
    }
}

pub fn audio_script(frames: usize) -> Vec<Scripted> {
    (0..frames)
        .map(|i| Scripted::Unit(MediaKind::Audio, Some(Duration::from_millis(20 * i as u64))))
        .collect()
}

impl SourceOpener for ScriptedOpener {
    fn check(&self, path: &Path) -> Result<()> {
        if path.to_string_lossy().contains("missing") {
            return Err(PlayError::Open {
                path: path.display().to_string(),
                reason: "No such file or directory".into(),
            });
        }
        Ok(())
    }

    fn open(&self, path: &Path, _config: &EngineConfig) -> Result<Box<dyn MediaSource>> {
        self.opened.lock().push(path.display().to_string());
        if path.to_string_lossy().contains("corrupt") {
            return Err(PlayError::Probe {
                path: path.display().to_string(),
                reason: "moov atom not found".into(),
            });
        }
        let last_pts = self
            .script
            .iter()
            .filter_map(|s| match s {
                Scripted::Unit(MediaKind::Audio, pts) => *pts,
                _ => None,
            })
            .max()
            .unwrap_or_default();
        Ok(Box::new(ScriptedSource {
            script: self.script.iter().cloned().collect(),
            tail: (1..=self.tail)
                .map(|i| {
                    MediaUnit::audio(silence(), last_pts + Duration::from_millis(20 * i as u64))
                })
                .collect(),
        }))
    }
}

pub struct ScriptedSource {
    script: VecDeque<Scripted>,
    tail: Vec<MediaUnit>,
}

fn silence() -> Bytes {
    Bytes::from(vec![0xD5u8; 160])
}

impl MediaSource for ScriptedSource {
    fn next_step(&mut self) -> Result<Step> {
        match self.script.pop_front() {
            None => Ok(Step::Eof),
            Some(Scripted::Ignored) => Ok(Step::Ignored),
            Some(Scripted::BadPacket) => Err(PlayError::Decode("invalid frame header".into())),
            Some(Scripted::ReadFailure) => Err(PlayError::Read("I/O error".into())),
            Some(Scripted::Unit(kind, pts)) => {
                let unit = match kind {
                    MediaKind::Audio => MediaUnit::audio(silence(), pts.unwrap_or_default()),
                    MediaKind::Video => {
                        MediaUnit::video(Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88]), pts)
                    }
                };
                Ok(Step::Packet {
                    kind,
                    units: vec![unit],
                })
            }
        }
    }

    fn finish(&mut self) -> Result<Vec<MediaUnit>> {
        Ok(std::mem::take(&mut self.tail))
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 10,
        ..EngineConfig::default()
    }
}

pub fn scripted_engine(opener: Arc<ScriptedOpener>) -> (Engine, Arc<RecordingEventSink>) {
    scripted_engine_with(opener, test_config())
}

pub fn scripted_engine_with(
    opener: Arc<ScriptedOpener>,
    config: EngineConfig,
) -> (Engine, Arc<RecordingEventSink>) {
    let events = RecordingEventSink::new();
    let engine = Engine::with_opener(config, events.clone(), opener).unwrap();
    (engine, events)
}

/// A session with media already up.
pub fn live_session(engine: &Engine) -> (SessionId, Arc<RecordingPacketSink>) {
    let sink = RecordingPacketSink::new();
    let id = engine.create_session(sink.clone());
    engine.setup_media(id).unwrap();
    (id, sink)
}

/// Write a 16-bit PCM WAV file carrying a sine tone.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f64) {
    let frames = (sample_rate as f64 * seconds) as usize;
    let mut pcm = Vec::with_capacity(frames * channels as usize * 2);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let s = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
        for _ in 0..channels {
            pcm.extend_from_slice(&s.to_le_bytes());
        }
    }

    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(b"RIFF").unwrap();
    file.write_all(&(36 + pcm.len() as u32).to_le_bytes()).unwrap();
    file.write_all(b"WAVEfmt ").unwrap();
    file.write_all(&16u32.to_le_bytes()).unwrap();
    file.write_all(&1u16.to_le_bytes()).unwrap();
    file.write_all(&channels.to_le_bytes()).unwrap();
    file.write_all(&sample_rate.to_le_bytes()).unwrap();
    file.write_all(&byte_rate.to_le_bytes()).unwrap();
    file.write_all(&block_align.to_le_bytes()).unwrap();
    file.write_all(&16u16.to_le_bytes()).unwrap();
    file.write_all(b"data").unwrap();
    file.write_all(&(pcm.len() as u32).to_le_bytes()).unwrap();
    file.write_all(&pcm).unwrap();
}

/// Encode `frames` flat 64x64 pictures at 25 fps as H.264 into an MP4 file.
///
/// Returns the number of packets written. Fails when this FFmpeg build has
/// no usable H.264 encoder or MP4 muxer.
pub fn write_h264_mp4(path: &Path, frames: usize) -> std::result::Result<usize, ffmpeg::Error> {
    use ffmpeg::{codec, format, Rational};

    let found = codec::encoder::find(codec::Id::H264).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let mut output = format::output(&path)?;
    let global_header = output
        .format()
        .flags()
        .contains(format::Flags::GLOBAL_HEADER);

    let time_base = Rational::new(1, 25);
    let mut video_enc = codec::Context::new_with_codec(found).encoder().video()?;
    video_enc.set_width(64);
    video_enc.set_height(64);
    video_enc.set_format(format::Pixel::YUV420P);
    video_enc.set_time_base(time_base);
    video_enc.set_frame_rate(Some(Rational::new(25, 1)));
    video_enc.set_gop(10);
    video_enc.set_max_b_frames(0);
    if global_header {
        video_enc.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut opts = ffmpeg::Dictionary::new();
    opts.set("preset", "ultrafast");
    opts.set("tune", "zerolatency");
    let mut encoder = video_enc.open_as_with(found, opts)?;

    {
        let mut stream = output.add_stream(codec::encoder::find(codec::Id::H264))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
    }
    output.write_header()?;
    let stream_tb = output.stream(0).map(|s| s.time_base()).unwrap_or(time_base);

    let mut written = 0;
    let mut drain = |encoder: &mut ffmpeg::encoder::Video,
                     output: &mut format::context::Output|
     -> std::result::Result<(), ffmpeg::Error> {
        let mut packet = ffmpeg::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(time_base, stream_tb);
            packet.write_interleaved(output)?;
            written += 1;
        }
        Ok(())
    };

    for i in 0..frames {
        let mut frame = ffmpeg::util::frame::Video::new(format::Pixel::YUV420P, 64, 64);
        frame.data_mut(0).fill((16 + i * 8 % 200) as u8);
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        frame.set_pts(Some(i as i64));
        encoder.send_frame(&frame)?;
        drain(&mut encoder, &mut output)?;
    }
    encoder.send_eof()?;
    drain(&mut encoder, &mut output)?;
    output.write_trailer()?;
    Ok(written)
}
