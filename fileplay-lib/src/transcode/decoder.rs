//! Audio decoder for the transcode path
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed audio packets
//! (AAC, MP3, PCM, Opus, …) into raw PCM `AVFrame`s.

use crate::error::{FfmpegError, PlayError, Result};
use ffmpeg_next as ffmpeg;

/// Audio decoder backed by a FFmpeg codec context
pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder for the given stream.
    ///
    /// Uses the stream's own codec parameters to initialise the context so no
    /// external configuration is needed.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                PlayError::Ffmpeg(FfmpegError::DecoderNotFound(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                )))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            PlayError::Ffmpeg(FfmpegError::DecoderNotFound(format!(
                "audio decoder for stream {}: {}",
                stream_index, e
            )))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// `AVERROR_INVALIDDATA` is non-fatal: it shows up on MP3 files with
    /// garbage before the first sync word, so the packet is skipped.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                Ok(())
            }
            Err(e) => Err(PlayError::Decode(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Send EOF to flush the decoder's internal buffers.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(PlayError::Decode(format!(
                "send_eof error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PlayError::Decode(format!(
                "receive_frame error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Sample format of decoded frames.
    pub fn format(&self) -> ffmpeg::util::format::sample::Sample {
        self.decoder.format()
    }

    /// Channel layout of decoded frames.
    pub fn channel_layout(&self) -> ffmpeg::util::channel_layout::ChannelLayout {
        self.decoder.channel_layout()
    }
}
