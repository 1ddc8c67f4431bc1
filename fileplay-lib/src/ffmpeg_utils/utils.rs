//! FFmpeg utility functions

use ffmpeg_next as ffmpeg;
use std::time::Duration;

/// Convert timestamps from one timebase to another
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    unsafe { ffmpeg::ffi::av_rescale_q(ts, from.into(), to.into()) }
}

/// Convert a stream timestamp to an offset from the stream start.
///
/// Returns `None` for timebases with a zero denominator. Timestamps before the
/// stream start clamp to zero.
pub fn ts_to_duration(ts: i64, start: i64, timebase: ffmpeg::Rational) -> Option<Duration> {
    if timebase.denominator() == 0 || timebase.numerator() <= 0 {
        return None;
    }
    let micros = rescale_ts(
        ts.saturating_sub(start),
        timebase,
        ffmpeg::Rational::new(1, 1_000_000),
    );
    Some(Duration::from_micros(micros.max(0) as u64))
}

/// Get the media type name
pub fn media_type_name(media_type: ffmpeg::media::Type) -> &'static str {
    match media_type {
        ffmpeg::media::Type::Video => "video",
        ffmpeg::media::Type::Audio => "audio",
        ffmpeg::media::Type::Subtitle => "subtitle",
        ffmpeg::media::Type::Data => "data",
        ffmpeg::media::Type::Attachment => "attachment",
        _ => "unknown",
    }
}

/// Print stream information for debugging
pub fn debug_stream_info(stream: &ffmpeg::Stream, index: usize) {
    let params = stream.parameters();

    tracing::debug!(
        "Stream {}: type={}, codec={}, timebase={}",
        index,
        media_type_name(params.medium()),
        params.id().name(),
        stream.time_base()
    );
}
