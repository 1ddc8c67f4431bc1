//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Routing FFmpeg's own log output through a filtered callback
//! - Raw field accessors and timestamp conversion

pub mod helpers;
pub mod utils;

pub use ffmpeg_next as ffmpeg;
#[allow(unused_imports)]
pub use utils::*;

/// Initialize the FFmpeg library.
///
/// Must be called once at startup before any file is probed. Calling it again
/// is harmless.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that suppresses known-noisy messages.
///
/// Demuxing MP4 files with edit lists and decoding MP3 with ID3 padding make
/// FFmpeg chatter on every run; none of it affects playback.
///
/// **Safety & Ordering:** Must be called after `init()` and before any
/// playback worker is started, because altering the global log callback is not
/// thread-safe.
pub fn install_log_filter() {
    // SAFETY: both functions modify global FFmpeg state and are safe to call
    // after `ffmpeg::init()`.  They are called exactly once at startup before
    // any worker threads exist.
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected side-effects of file playback and should be suppressed.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
    "Estimating duration from bitrate",
    "Skipping 0 bytes of junk",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0 as std::ffi::c_char; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();

    for suppressed in SUPPRESSED_MESSAGES {
        if msg.contains(suppressed) {
            return;
        }
    }

    let msg = msg.trim_end();
    if level <= ffmpeg_next::ffi::AV_LOG_ERROR as std::ffi::c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    }
}

/// Get the version information of the linked FFmpeg libraries.
pub fn version_info() -> String {
    let v = ffmpeg::format::version();
    format!("libavformat {}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}
