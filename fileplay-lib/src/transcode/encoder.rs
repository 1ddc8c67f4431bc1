//! G.711 encoder for the transcode path
//!
//! Wraps an FFmpeg `AVCodecContext` (`pcm_alaw` / `pcm_mulaw`) to encode
//! fixed-size 8 kHz mono `S16` frames into one byte per sample.

use crate::config::{NarrowbandCodec, NARROWBAND_RATE};
use crate::error::{FfmpegError, PlayError, Result};
use crate::transcode::resampler::{NARROWBAND_FORMAT, NARROWBAND_LAYOUT};
use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

/// Narrowband encoder backed by a real FFmpeg codec context
pub struct NarrowbandEncoder {
    encoder: ffmpeg::encoder::Audio,
    codec: NarrowbandCodec,
    frame_samples: usize,
    next_pts: i64,
}

impl NarrowbandEncoder {
    pub fn open(codec: NarrowbandCodec, frame_samples: usize) -> Result<Self> {
        let found = codec::encoder::find(codec.codec_id()).ok_or_else(|| {
            PlayError::Ffmpeg(FfmpegError::EncoderNotFound(format!(
                "{:?} encoder not found in this FFmpeg build",
                codec
            )))
        })?;

        let context = codec::Context::new_with_codec(found);
        let mut audio_enc = context.encoder().audio().map_err(|e| {
            PlayError::Ffmpeg(FfmpegError::EncoderCreate(format!(
                "cannot get audio encoder handle: {}",
                e
            )))
        })?;

        audio_enc.set_rate(NARROWBAND_RATE as i32);
        audio_enc.set_format(NARROWBAND_FORMAT);
        audio_enc.set_channel_layout(NARROWBAND_LAYOUT);
        audio_enc.set_time_base(ffmpeg::Rational::new(1, NARROWBAND_RATE as i32));

        let encoder = audio_enc.open_as(found).map_err(|e| {
            PlayError::Ffmpeg(FfmpegError::EncoderCreate(format!(
                "failed to open {:?} encoder: {}",
                codec, e
            )))
        })?;

        Ok(Self {
            encoder,
            codec,
            frame_samples,
            next_pts: 0,
        })
    }

    /// Encode exactly one frame of `frame_samples` samples.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Bytes> {
        if samples.len() != self.frame_samples {
            return Err(PlayError::Encode(format!(
                "expected {} samples, got {}",
                self.frame_samples,
                samples.len()
            )));
        }

        let mut frame = ffmpeg::util::frame::Audio::new(
            NARROWBAND_FORMAT,
            self.frame_samples,
            NARROWBAND_LAYOUT,
        );
        frame.set_rate(NARROWBAND_RATE);
        frame.set_pts(Some(self.next_pts));
        {
            let plane = frame.data_mut(0);
            for (dst, s) in plane.chunks_exact_mut(2).zip(samples) {
                dst.copy_from_slice(&s.to_ne_bytes());
            }
        }
        self.next_pts += self.frame_samples as i64;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| PlayError::Encode(format!("{:?} send_frame: {}", self.codec, e)))?;

        let mut out = Vec::with_capacity(self.frame_samples);
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    if let Some(data) = packet.data() {
                        out.extend_from_slice(data);
                    }
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    return Err(PlayError::Encode(format!(
                        "{:?} receive_packet: {}",
                        self.codec, e
                    )))
                }
            }
        }
        Ok(Bytes::from(out))
    }
}

/// Check whether the FFmpeg build includes an encoder for `codec`.
pub fn is_encoder_available(codec: NarrowbandCodec) -> bool {
    codec::encoder::find(codec.codec_id()).is_some()
}
