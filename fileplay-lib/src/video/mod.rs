//! Video repackage path
//!
//! Video is never re-encoded. Each H.264 packet is rewritten into a
//! self-contained Annex B access unit and timestamped from the container.

pub mod annexb;

use ffmpeg_next as ffmpeg;
use std::time::Duration;

use crate::config::VideoConfig;
use crate::error::Result;
use crate::ffmpeg_utils::utils::ts_to_duration;
use crate::types::{MediaUnit, VideoStreamInfo};

pub use annexb::{split_annexb, AnnexBFilter};

pub struct VideoRepackager {
    info: VideoStreamInfo,
    filter: AnnexBFilter,
}

impl VideoRepackager {
    /// Build the reformatter for the selected video stream.
    ///
    /// Fails when the stream's decoder configuration cannot be parsed.
    pub fn open(info: VideoStreamInfo, config: &VideoConfig) -> Result<Self> {
        let filter = AnnexBFilter::new(&info.extradata, config.parameter_sets)?;
        tracing::debug!(
            stream_index = info.stream_index,
            width = info.width,
            height = info.height,
            extradata_len = info.extradata.len(),
            parameter_sets = ?config.parameter_sets,
            "video repackage path ready"
        );
        Ok(Self { info, filter })
    }

    /// Rewrite one compressed packet. Timing is carried over unchanged.
    pub fn repackage(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<MediaUnit> {
        let data = packet.data().unwrap_or_default();
        let payload = self.filter.filter(data)?;
        Ok(MediaUnit::video(payload, self.packet_pts(packet)))
    }

    /// Presentation time relative to the stream start; falls back to DTS.
    fn packet_pts(&self, packet: &ffmpeg::codec::packet::Packet) -> Option<Duration> {
        packet
            .pts()
            .or_else(|| packet.dts())
            .and_then(|ts| ts_to_duration(ts, self.info.start_time, self.info.timebase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterSetMode;

    fn info(extradata: Vec<u8>) -> VideoStreamInfo {
        VideoStreamInfo {
            stream_index: 0,
            codec_id: ffmpeg::codec::Id::H264,
            width: 320,
            height: 240,
            timebase: ffmpeg::Rational::new(1, 90000),
            start_time: 0,
            extradata,
        }
    }

    #[test]
    fn test_repackage_keeps_timing() {
        let mut rp = VideoRepackager::open(info(Vec::new()), &VideoConfig::default()).unwrap();

        let mut packet = ffmpeg::codec::packet::Packet::copy(&[0, 0, 0, 1, 0x65, 0x88]);
        packet.set_pts(Some(45000));
        let unit = rp.repackage(&packet).unwrap();
        assert_eq!(unit.pts, Some(Duration::from_millis(500)));
        assert!(unit.marker);
        assert_eq!(unit.payload.as_ref(), &[0, 0, 0, 1, 0x65, 0x88]);
    }

    #[test]
    fn test_missing_timestamps_yield_none() {
        let mut rp = VideoRepackager::open(info(Vec::new()), &VideoConfig::default()).unwrap();
        let packet = ffmpeg::codec::packet::Packet::copy(&[0, 0, 1, 0x41, 0x9a]);
        assert_eq!(rp.repackage(&packet).unwrap().pts, None);
    }

    #[test]
    fn test_bad_avcc_fails_open() {
        let config = VideoConfig {
            parameter_sets: ParameterSetMode::KeyframesOnly,
            ..VideoConfig::default()
        };
        assert!(VideoRepackager::open(info(vec![1, 2, 3]), &config).is_err());
    }
}
