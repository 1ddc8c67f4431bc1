//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call.  All `unsafe`
//! blocks are contained here with explicit safety arguments.  Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use ffmpeg_next as ffmpeg;

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `sample_rate` is a plain i32 field with no
    // ownership semantics.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels.max(0) as u16 }
}

/// Read `width` from an `AVCodecParameters` struct.
pub fn codec_params_width(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    unsafe { (*params.as_ptr()).width.max(0) as u32 }
}

/// Read `height` from an `AVCodecParameters` struct.
pub fn codec_params_height(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    unsafe { (*params.as_ptr()).height.max(0) as u32 }
}

/// Copy the codec `extradata` out of an `AVCodecParameters` struct.
///
/// For H.264 in MP4/MKV this holds the `avcC` decoder configuration record
/// carrying the SPS/PPS; for MPEG-TS it is usually empty.
pub fn codec_params_extradata(params: &ffmpeg::codec::parameters::Parameters) -> Vec<u8> {
    // SAFETY: `extradata` is either null or points to `extradata_size` valid
    // bytes owned by the parameters struct, which outlives this call.  We
    // copy the bytes out before returning.
    unsafe {
        let p = params.as_ptr();
        let data = (*p).extradata;
        let size = (*p).extradata_size;
        if data.is_null() || size <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(data, size as usize).to_vec()
    }
}

// ── Packed audio access ─────────────────────────────────────────────────────

/// The meaningful bytes of a packed (interleaved) audio frame.
///
/// `Audio::data(0)` returns the whole line, which FFmpeg pads for alignment;
/// this trims it to `samples * channels * bytes_per_sample`.
pub fn packed_audio_bytes(frame: &ffmpeg::util::frame::Audio) -> &[u8] {
    if frame.samples() == 0 || frame.format().is_planar() {
        return &[];
    }
    let wanted = frame.samples() * frame.channels() as usize * frame.format().bytes();
    let line = frame.data(0);
    &line[..wanted.min(line.len())]
}
