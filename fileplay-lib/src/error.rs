use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum PlayError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The media file is missing or unreadable
    #[error("Cannot open media file {path}: {reason}")]
    Open { path: String, reason: String },

    /// Container metadata is unavailable, corrupt, or has no usable stream
    #[error("Cannot probe media file {path}: {reason}")]
    Probe { path: String, reason: String },

    /// A compressed audio packet could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A decoded audio frame could not be converted to the narrowband input format
    #[error("Resample error: {0}")]
    Resample(String),

    /// Narrowband encoding of a frame failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// The video bitstream reformatter rejected a packet or its configuration
    #[error("Bitstream filter error: {0}")]
    Filter(String),

    /// Reading the next packet from the container failed mid-stream
    #[error("Read error: {0}")]
    Read(String),

    /// A control command arrived in a state where it cannot apply
    #[error("{request} rejected: {reason}")]
    Precondition {
        request: &'static str,
        reason: String,
    },

    /// No session is registered under the given id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session with the given id is already registered
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// The pacing worker thread could not be started
    #[error("Failed to spawn playback worker: {0}")]
    WorkerSpawn(String),

    /// The packet sink refused a unit
    #[error("Packet sink error: {0}")]
    Sink(String),

    /// Engine configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlayError {
    /// Per-packet failures: logged and skipped, never fatal to a run.
    pub fn is_per_packet(&self) -> bool {
        matches!(
            self,
            PlayError::Decode(_)
                | PlayError::Resample(_)
                | PlayError::Encode(_)
                | PlayError::Filter(_)
        )
    }

    pub(crate) fn precondition(request: &'static str, reason: impl Into<String>) -> Self {
        PlayError::Precondition {
            request,
            reason: reason.into(),
        }
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// The requested decoder for a specific codec ID was not found
    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    /// The requested encoder for a specific codec ID was not found
    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    /// Failure instantiating or opening an encoder
    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    /// Failure creating an audio resampler
    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_packet_classification() {
        assert!(PlayError::Decode("x".into()).is_per_packet());
        assert!(PlayError::Resample("x".into()).is_per_packet());
        assert!(PlayError::Encode("x".into()).is_per_packet());
        assert!(PlayError::Filter("x".into()).is_per_packet());
        assert!(!PlayError::Read("x".into()).is_per_packet());
        assert!(!PlayError::Open {
            path: "a".into(),
            reason: "b".into()
        }
        .is_per_packet());
    }

    #[test]
    fn test_precondition_message() {
        let err = PlayError::precondition("pause", "no active playback");
        assert_eq!(err.to_string(), "pause rejected: no active playback");
    }
}
