//! Audio resampler for the transcode path
//!
//! Converts decoded PCM frames to 8 kHz / mono / packed `S16`, the input the
//! G.711 encoders require.

use crate::config::NARROWBAND_RATE;
use crate::error::{FfmpegError, PlayError, Result};
use crate::ffmpeg_utils::helpers::packed_audio_bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

/// Target channel layout (mono)
pub const NARROWBAND_LAYOUT: ChannelLayout = ChannelLayout::MONO;
/// Target sample format required by the G.711 encoders
pub const NARROWBAND_FORMAT: Sample = Sample::I16(ffmpeg::util::format::sample::Type::Packed);

/// Input description the current `SwrContext` was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
struct InputFormat {
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
}

/// Audio resampler wrapping FFmpeg's `SwrContext`
pub struct NarrowbandResampler {
    context: resampling::Context,
    input: InputFormat,
}

impl NarrowbandResampler {
    /// Create a resampler from the decoder's advertised output format.
    pub fn new(format: Sample, layout: ChannelLayout, rate: u32) -> Result<Self> {
        let input = InputFormat {
            format,
            layout: normalize_layout(layout, 0),
            rate,
        };
        Ok(Self {
            context: build_context(input)?,
            input,
        })
    }

    /// Convert one decoded frame into narrowband samples.
    ///
    /// Decoders may change format mid-stream (MP3 files mixing mono and stereo
    /// frames); the `SwrContext` is rebuilt when that happens.
    pub fn convert(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<Vec<i16>> {
        let incoming = InputFormat {
            format: frame.format(),
            layout: normalize_layout(frame.channel_layout(), frame.channels() as usize),
            rate: frame.rate(),
        };
        if incoming != self.input {
            tracing::debug!(
                from = ?self.input,
                to = ?incoming,
                "decoded audio format changed, rebuilding resampler"
            );
            // Only this packet is lost if the new format is unusable
            self.context = build_context(incoming).map_err(|e| {
                PlayError::Resample(format!("cannot follow format change: {}", e))
            })?;
            self.input = incoming;
        }

        // Output frame must be empty — swr_convert_frame allocates the
        // correct buffer from the SwrContext config.
        let mut out = ffmpeg::util::frame::Audio::empty();
        self.context
            .run(frame, &mut out)
            .map_err(|e| PlayError::Resample(format!("resampling error: {}", e)))?;

        Ok(to_samples(&out))
    }

    /// Drain the samples the resampler keeps for its filter delay.
    ///
    /// When no actual rate conversion happens the context has nothing
    /// buffered and `flush()` errors; that is not a failure.
    pub fn flush(&mut self) -> Vec<i16> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        match self.context.flush(&mut out) {
            Ok(_) => to_samples(&out),
            Err(e) => {
                tracing::debug!("Resampler flush returned non-fatal error: {}", e);
                Vec::new()
            }
        }
    }
}

fn build_context(input: InputFormat) -> Result<resampling::Context> {
    resampling::Context::get(
        input.format,
        input.layout,
        input.rate,
        NARROWBAND_FORMAT,
        NARROWBAND_LAYOUT,
        NARROWBAND_RATE,
    )
    .map_err(|e| {
        PlayError::Ffmpeg(FfmpegError::ResamplerCreate(format!(
            "{:?}/{}Hz -> s16/8000Hz/mono: {}",
            input.format, input.rate, e
        )))
    })
}

/// Some demuxers (raw PCM, old WAV headers) leave the layout unset.
fn normalize_layout(layout: ChannelLayout, channels: usize) -> ChannelLayout {
    if layout.bits() != 0 {
        return layout;
    }
    match channels {
        0 | 1 => ChannelLayout::MONO,
        _ => ChannelLayout::STEREO,
    }
}

fn to_samples(frame: &ffmpeg::util::frame::Audio) -> Vec<i16> {
    packed_audio_bytes(frame)
        .chunks_exact(2)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_mono_frame(rate: u32, samples: &[i16]) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(NARROWBAND_FORMAT, samples.len(), ChannelLayout::MONO);
        frame.set_rate(rate);
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        frame.data_mut(0)[..bytes.len()].copy_from_slice(&bytes);
        frame
    }

    #[test]
    fn test_normalize_layout_fallback() {
        assert_eq!(normalize_layout(ChannelLayout::empty(), 1), ChannelLayout::MONO);
        assert_eq!(normalize_layout(ChannelLayout::empty(), 2), ChannelLayout::STEREO);
        assert_eq!(
            normalize_layout(ChannelLayout::STEREO, 1),
            ChannelLayout::STEREO
        );
    }

    #[test]
    fn test_downsample_44100_to_8000() {
        crate::init().unwrap();
        let mut rs =
            NarrowbandResampler::new(NARROWBAND_FORMAT, ChannelLayout::MONO, 44100).unwrap();

        let mut total = 0usize;
        for _ in 0..10 {
            let frame = s16_mono_frame(44100, &[1000; 4410]);
            total += rs.convert(&frame).unwrap().len();
        }
        total += rs.flush().len();

        // 1 s of input -> ~8000 samples out
        assert!((7800..=8200).contains(&total), "got {} samples", total);
    }

    #[test]
    fn test_passthrough_rate_keeps_sample_count() {
        crate::init().unwrap();
        let mut rs =
            NarrowbandResampler::new(NARROWBAND_FORMAT, ChannelLayout::MONO, 8000).unwrap();
        let out = rs.convert(&s16_mono_frame(8000, &[123; 320])).unwrap();
        assert_eq!(out.len(), 320);
        assert!(out.iter().all(|&s| s == 123));
    }

    #[test]
    fn test_failed_rebuild_is_per_packet() {
        crate::init().unwrap();
        let mut rs =
            NarrowbandResampler::new(NARROWBAND_FORMAT, ChannelLayout::MONO, 8000).unwrap();

        // A zero input rate cannot be configured
        let err = rs.convert(&s16_mono_frame(0, &[1; 160])).unwrap_err();
        assert!(matches!(err, PlayError::Resample(_)), "{:?}", err);
        assert!(err.is_per_packet());

        // The previous context keeps working
        let out = rs.convert(&s16_mono_frame(8000, &[7; 160])).unwrap();
        assert_eq!(out.len(), 160);
    }
}
