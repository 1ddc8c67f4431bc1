//! Audio transcode pipeline
//!
//! Combines `AudioDecoder` → `NarrowbandResampler` → `FrameAssembler` →
//! `NarrowbandEncoder` to turn each compressed packet of the selected audio
//! stream into zero or more paced-ready narrowband `MediaUnit`s.

use ffmpeg_next as ffmpeg;

use crate::config::{AudioConfig, NARROWBAND_RATE};
use crate::error::{PlayError, Result};
use crate::ffmpeg_utils::utils::ts_to_duration;
use crate::types::{AudioStreamInfo, MediaUnit};

use super::assembler::FrameAssembler;
use super::decoder::AudioDecoder;
use super::encoder::NarrowbandEncoder;
use super::resampler::NarrowbandResampler;

pub struct AudioTranscoder {
    info: AudioStreamInfo,
    decoder: AudioDecoder,
    resampler: NarrowbandResampler,
    assembler: FrameAssembler,
    encoder: NarrowbandEncoder,
    decoded_frames: u64,
}

impl AudioTranscoder {
    /// Open the decoder, resampler and encoder for one audio stream.
    pub fn open(
        stream: &ffmpeg::format::stream::Stream,
        info: AudioStreamInfo,
        config: &AudioConfig,
    ) -> Result<Self> {
        let decoder = AudioDecoder::open(stream)?;
        let resampler = NarrowbandResampler::new(
            decoder.format(),
            decoder.channel_layout(),
            decoder.sample_rate(),
        )?;
        let encoder = NarrowbandEncoder::open(config.codec, config.frame_samples())?;

        tracing::debug!(
            stream_index = info.stream_index,
            codec = ?info.codec_id,
            sample_rate = info.sample_rate,
            channels = info.channels,
            target = ?config.codec,
            "audio transcode path ready"
        );

        Ok(Self {
            info,
            decoder,
            resampler,
            assembler: FrameAssembler::new(config.frame_samples(), NARROWBAND_RATE),
            encoder,
            decoded_frames: 0,
        })
    }

    /// Transcode one compressed packet.
    ///
    /// A frame that fails to resample or encode is dropped on its own; units
    /// already produced for the packet are kept. The packet only fails as a
    /// whole when it yields nothing. Samples buffered in the assembler
    /// survive either way.
    pub fn transcode(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<Vec<MediaUnit>> {
        self.decoder.send_packet(packet)?;
        self.drain_decoder()
    }

    /// Drain decoder, resampler and assembler at end of stream.
    pub fn finish(&mut self) -> Result<Vec<MediaUnit>> {
        self.decoder.send_eof()?;
        let mut units = self.drain_decoder()?;

        let tail = self.resampler.flush();
        self.assembler.push(&tail);
        if let Err(e) = self.encode_ready(&mut units) {
            tracing::warn!(error = %e, "dropping narrowband frame at end of stream");
        }

        let pending = self.assembler.pending_samples();
        if let Some((samples, pts)) = self.assembler.flush_padded() {
            units.push(MediaUnit::audio(self.encoder.encode(&samples)?, pts));
        }
        tracing::debug!(
            stream_index = self.info.stream_index,
            padded_from = pending,
            total_samples = self.assembler.emitted_samples(),
            "audio path flushed"
        );
        Ok(units)
    }

    pub fn decoded_frames(&self) -> u64 {
        self.decoded_frames
    }

    fn drain_decoder(&mut self) -> Result<Vec<MediaUnit>> {
        let mut frames = Vec::new();
        let mut failure = None;
        loop {
            match self.decoder.receive_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.absorb(frames, failure)
    }

    /// Resample and encode decoded frames, skipping the ones that fail.
    fn absorb(
        &mut self,
        frames: Vec<ffmpeg::util::frame::Audio>,
        mut failure: Option<PlayError>,
    ) -> Result<Vec<MediaUnit>> {
        let mut units = Vec::new();
        for frame in frames {
            self.decoded_frames += 1;

            // Only the first decoded frame's timestamp is trusted
            if self.decoded_frames == 1 {
                let start = frame
                    .pts()
                    .and_then(|pts| ts_to_duration(pts, self.info.start_time, self.info.timebase))
                    .unwrap_or_default();
                self.assembler.anchor(start);
            }

            match self.resampler.convert(&frame) {
                Ok(samples) => self.assembler.push(&samples),
                Err(e) => {
                    tracing::debug!(error = %e, "dropping decoded audio frame");
                    failure = Some(e);
                    continue;
                }
            }
            if let Err(e) = self.encode_ready(&mut units) {
                failure = Some(e);
            }
        }

        match failure {
            Some(e) if units.is_empty() => Err(e),
            Some(e) => {
                tracing::warn!(error = %e, kept = units.len(), "audio packet partly transcoded");
                Ok(units)
            }
            None => Ok(units),
        }
    }

    /// Encode every full frame in the assembler. A frame the encoder rejects
    /// is dropped and the rest are still encoded.
    fn encode_ready(&mut self, units: &mut Vec<MediaUnit>) -> Result<()> {
        let mut failure = None;
        while let Some((samples, pts)) = self.assembler.next_frame() {
            match self.encoder.encode(&samples) {
                Ok(payload) => units.push(MediaUnit::audio(payload, pts)),
                Err(e) => failure = Some(e),
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::probe_file;
    use crate::tests::fixtures::write_wav;
    use ffmpeg_next::util::channel_layout::ChannelLayout;
    use std::time::Duration;

    use super::super::resampler::NARROWBAND_FORMAT;

    fn s16_mono_frame(rate: u32, len: usize) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(NARROWBAND_FORMAT, len, ChannelLayout::MONO);
        frame.set_rate(rate);
        let bytes: Vec<u8> = (0..len).flat_map(|_| 500i16.to_ne_bytes()).collect();
        frame.data_mut(0)[..bytes.len()].copy_from_slice(&bytes);
        frame
    }

    fn narrowband_transcoder(dir: &std::path::Path) -> AudioTranscoder {
        crate::init().unwrap();
        let path = dir.join("voice.wav");
        write_wav(&path, 8000, 1, 0.2);
        let probed = probe_file(&path, false).unwrap();
        let info = probed.audio.clone().unwrap();
        let stream = probed.input.stream(info.stream_index).unwrap();
        AudioTranscoder::open(&stream, info, &AudioConfig::default()).unwrap()
    }

    #[test]
    fn test_failed_frame_keeps_earlier_units() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = narrowband_transcoder(dir.path());

        // 400 samples make two frames; the zero-rate frame cannot be resampled
        let units = t
            .absorb(vec![s16_mono_frame(8000, 400), s16_mono_frame(0, 160)], None)
            .unwrap();
        let pts: Vec<_> = units.iter().map(|u| u.pts.unwrap()).collect();
        assert_eq!(pts, vec![Duration::ZERO, Duration::from_millis(20)]);
        assert_eq!(t.assembler.pending_samples(), 80);

        // Leftover samples carry into the next packet on the same grid
        let units = t.absorb(vec![s16_mono_frame(8000, 80)], None).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].pts, Some(Duration::from_millis(40)));
        assert_eq!(units[0].payload.len(), 160);
    }

    #[test]
    fn test_packet_with_no_output_fails_per_packet() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = narrowband_transcoder(dir.path());

        t.absorb(vec![s16_mono_frame(8000, 100)], None).unwrap();
        let err = t.absorb(vec![s16_mono_frame(0, 160)], None).unwrap_err();
        assert!(err.is_per_packet(), "{:?}", err);
        assert_eq!(t.assembler.pending_samples(), 100);
    }
}
