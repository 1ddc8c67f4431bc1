//! Transport-setup descriptor.
//!
//! The engine only ever sends, so the offer is `sendonly` and carries no real
//! connection address; the host fills in transport details on its side.

use std::fmt::Write;

use crate::config::EngineConfig;

/// Build a send-only SDP offer for the configured media.
pub fn build_offer(config: &EngineConfig) -> String {
    let session_id = chrono::Utc::now().timestamp_micros().max(0);
    build_offer_with_id(config, session_id as u64)
}

pub(crate) fn build_offer_with_id(config: &EngineConfig, session_id: u64) -> String {
    let codec = config.audio.codec;
    let mut sdp = String::with_capacity(512);

    // Writing into a String cannot fail
    let _ = write!(
        sdp,
        "v=0\r\n\
         o=- {session_id} 1 IN IP4 127.0.0.1\r\n\
         s=FilePlay\r\n\
         t=0 0\r\n"
    );

    let pt = codec.payload_type();
    let _ = write!(
        sdp,
        "m=audio 1 RTP/AVP {pt}\r\n\
         c=IN IP4 1.1.1.1\r\n\
         b=AS:64\r\n\
         a=rtpmap:{pt} {}\r\n\
         a=ptime:{}\r\n\
         a=sendonly\r\n",
        codec.rtpmap(),
        config.audio.frame_ms,
    );

    if config.video.enabled {
        let vpt = config.video.payload_type;
        let _ = write!(
            sdp,
            "m=video 1 RTP/AVP {vpt}\r\n\
             c=IN IP4 1.1.1.1\r\n\
             a=rtpmap:{vpt} H264/90000\r\n\
             a=fmtp:{vpt} packetization-mode=1\r\n\
             a=sendonly\r\n"
        );
    }

    sdp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NarrowbandCodec;

    #[test]
    fn test_audio_only_offer() {
        let mut config = EngineConfig::default();
        config.video.enabled = false;
        let sdp = build_offer_with_id(&config, 42);

        assert!(sdp.starts_with("v=0\r\no=- 42 1 IN IP4 127.0.0.1\r\n"));
        assert!(sdp.contains("m=audio 1 RTP/AVP 8\r\n"));
        assert!(sdp.contains("a=rtpmap:8 PCMA/8000\r\n"));
        assert!(sdp.contains("b=AS:64\r\n"));
        assert!(sdp.contains("a=sendonly\r\n"));
        assert!(!sdp.contains("m=video"));
        assert!(sdp.lines().all(|l| !l.is_empty()));
    }

    #[test]
    fn test_pcmu_with_video() {
        let mut config = EngineConfig::default();
        config.audio.codec = NarrowbandCodec::Pcmu;
        let sdp = build_offer_with_id(&config, 1);

        assert!(sdp.contains("m=audio 1 RTP/AVP 0\r\n"));
        assert!(sdp.contains("a=rtpmap:0 PCMU/8000\r\n"));
        assert!(sdp.contains("m=video 1 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=fmtp:96 packetization-mode=1\r\n"));
        assert_eq!(sdp.matches("a=sendonly").count(), 2);
    }

    #[test]
    fn test_session_id_from_clock() {
        let sdp = build_offer(&EngineConfig::default());
        let origin = sdp.lines().nth(1).unwrap();
        let id: u64 = origin.split(' ').nth(1).unwrap().parse().unwrap();
        assert!(id > 0);
    }
}
