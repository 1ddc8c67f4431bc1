//! RTP/UDP packet sink
//!
//! Each session gets one sink sending to the peer's media address. Audio
//! goes out as one RTP packet per narrowband frame on an 8 kHz clock. Video
//! access units are packetized per RFC 6184 on a 90 kHz clock: NAL units
//! that fit the MTU are sent as single NAL unit packets, bigger ones are
//! split into FU-A fragments.

use bytes::{BufMut, Bytes, BytesMut};
use fileplay_lib::{
    split_annexb, MediaKind, MediaUnit, NarrowbandCodec, PacketSink, PlayError,
};
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const RTP_VERSION: u8 = 2;
const HEADER_LEN: usize = 12;
const AUDIO_CLOCK: u32 = 8000;
const VIDEO_CLOCK: u32 = 90_000;
const NAL_TYPE_FU_A: u8 = 28;
const NAL_TYPE_AUD: u8 = 9;

/// Sequence and timestamp state of one outgoing RTP stream
#[derive(Debug)]
struct RtpStream {
    payload_type: u8,
    clock_rate: u32,
    ssrc: u32,
    sequence: u16,
    timestamp_base: u32,
    last_timestamp: u32,
}

impl RtpStream {
    fn new(payload_type: u8, clock_rate: u32) -> Self {
        let seed = Uuid::new_v4().as_u128();
        let timestamp_base = (seed >> 64) as u32;
        Self {
            payload_type,
            clock_rate,
            ssrc: seed as u32,
            sequence: (seed >> 32) as u16,
            timestamp_base,
            last_timestamp: timestamp_base,
        }
    }

    /// Media timestamp for `pts`; units without one reuse the previous value.
    fn timestamp(&mut self, pts: Option<Duration>) -> u32 {
        if let Some(pts) = pts {
            let ticks = pts.as_nanos() * self.clock_rate as u128 / 1_000_000_000;
            self.last_timestamp = self.timestamp_base.wrapping_add(ticks as u32);
        }
        self.last_timestamp
    }

    fn packet(&mut self, marker: bool, timestamp: u32, parts: &[&[u8]]) -> Bytes {
        let len = HEADER_LEN + parts.iter().map(|p| p.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(((marker as u8) << 7) | (self.payload_type & 0x7f));
        buf.put_u16(self.sequence);
        buf.put_u32(timestamp);
        buf.put_u32(self.ssrc);
        for part in parts {
            buf.put_slice(part);
        }
        self.sequence = self.sequence.wrapping_add(1);
        buf.freeze()
    }
}

/// One RTP payload of a packetized access unit
#[derive(Debug, PartialEq, Eq)]
pub enum H264Payload<'a> {
    Single(&'a [u8]),
    Fragment {
        indicator: u8,
        header: u8,
        data: &'a [u8],
    },
}

impl H264Payload<'_> {
    fn parts(&self) -> Vec<&[u8]> {
        match self {
            H264Payload::Single(nal) => vec![*nal],
            H264Payload::Fragment {
                indicator,
                header,
                data,
            } => vec![
                std::slice::from_ref(indicator),
                std::slice::from_ref(header),
                *data,
            ],
        }
    }
}

/// Split an Annex B access unit into RTP payloads no longer than `max_payload`.
///
/// Access unit delimiters are dropped; they carry nothing a depacketizer needs.
pub fn packetize_h264(access_unit: &[u8], max_payload: usize) -> Vec<H264Payload<'_>> {
    let mut payloads = Vec::new();
    for nal in split_annexb(access_unit) {
        let nal_type = nal[0] & 0x1f;
        if nal_type == NAL_TYPE_AUD {
            continue;
        }
        if nal.len() <= max_payload {
            payloads.push(H264Payload::Single(nal));
            continue;
        }

        let indicator = (nal[0] & 0xe0) | NAL_TYPE_FU_A;
        let body = &nal[1..];
        let chunk = max_payload.saturating_sub(2).max(1);
        let count = body.len().div_ceil(chunk);
        for (i, data) in body.chunks(chunk).enumerate() {
            let mut header = nal_type;
            if i == 0 {
                header |= 0x80;
            }
            if i + 1 == count {
                header |= 0x40;
            }
            payloads.push(H264Payload::Fragment {
                indicator,
                header,
                data,
            });
        }
    }
    payloads
}

/// Packet sink writing RTP over a shared UDP socket
pub struct RtpPacketSink {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    mtu: usize,
    audio: Mutex<RtpStream>,
    video: Mutex<RtpStream>,
}

impl RtpPacketSink {
    pub fn new(
        socket: Arc<UdpSocket>,
        target: SocketAddr,
        mtu: usize,
        codec: NarrowbandCodec,
        video_payload_type: u8,
    ) -> Self {
        Self {
            socket,
            target,
            mtu,
            audio: Mutex::new(RtpStream::new(codec.payload_type(), AUDIO_CLOCK)),
            video: Mutex::new(RtpStream::new(video_payload_type, VIDEO_CLOCK)),
        }
    }

    fn transmit(&self, packet: &[u8]) -> fileplay_lib::Result<()> {
        self.socket
            .send_to(packet, self.target)
            .map(|_| ())
            .map_err(|e| PlayError::Sink(format!("send to {}: {}", self.target, e)))
    }

    fn send_audio(&self, unit: &MediaUnit) -> fileplay_lib::Result<()> {
        let packet = {
            let mut stream = self.audio.lock();
            let ts = stream.timestamp(unit.pts);
            stream.packet(unit.marker, ts, &[unit.payload.as_ref()])
        };
        self.transmit(&packet)
    }

    fn send_video(&self, unit: &MediaUnit) -> fileplay_lib::Result<()> {
        let payloads = packetize_h264(&unit.payload, self.mtu);
        let packets: Vec<Bytes> = {
            let mut stream = self.video.lock();
            let ts = stream.timestamp(unit.pts);
            let last = payloads.len().saturating_sub(1);
            payloads
                .iter()
                .enumerate()
                .map(|(i, p)| stream.packet(unit.marker && i == last, ts, &p.parts()))
                .collect()
        };
        for packet in &packets {
            self.transmit(packet)?;
        }
        Ok(())
    }
}

impl PacketSink for RtpPacketSink {
    fn send(&self, unit: &MediaUnit) -> fileplay_lib::Result<()> {
        match unit.kind {
            MediaKind::Audio => self.send_audio(unit),
            MediaKind::Video => self.send_video(unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn sink_to(target: SocketAddr, mtu: usize) -> RtpPacketSink {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        RtpPacketSink::new(socket, target, mtu, NarrowbandCodec::Pcma, 96)
    }

    fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 2048];
        let n = socket.recv(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    fn seq(packet: &[u8]) -> u16 {
        u16::from_be_bytes([packet[2], packet[3]])
    }

    fn ts(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
    }

    fn ssrc(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]])
    }

    #[test]
    fn test_small_nals_are_single_packets() {
        let au = [0, 0, 0, 1, 0x09, 0xf0, 0, 0, 0, 1, 0x67, 1, 2, 0, 0, 1, 0x65, 9, 9];
        let payloads = packetize_h264(&au, 1200);
        assert_eq!(
            payloads,
            vec![
                H264Payload::Single(&[0x67, 1, 2]),
                H264Payload::Single(&[0x65, 9, 9]),
            ]
        );
    }

    #[test]
    fn test_large_nal_is_fragmented() {
        let mut au = vec![0, 0, 0, 1, 0x65];
        au.extend((0..25u8).map(|i| i + 1));
        let payloads = packetize_h264(&au, 12);

        // 25 body bytes in chunks of 10
        assert_eq!(payloads.len(), 3);
        for (i, p) in payloads.iter().enumerate() {
            match p {
                H264Payload::Fragment {
                    indicator,
                    header,
                    data,
                } => {
                    assert_eq!(*indicator, 0x60 | NAL_TYPE_FU_A);
                    assert_eq!(header & 0x1f, 5);
                    assert_eq!(header & 0x80 != 0, i == 0);
                    assert_eq!(header & 0x40 != 0, i == 2);
                    assert!(data.len() <= 10);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        let body: Vec<u8> = payloads
            .iter()
            .flat_map(|p| match p {
                H264Payload::Fragment { data, .. } => data.to_vec(),
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(body, au[5..].to_vec());
    }

    #[test]
    fn test_audio_packets_on_8khz_clock() {
        let (rx, addr) = receiver();
        let sink = sink_to(addr, 1200);

        sink.send(&MediaUnit::audio(vec![0xd5; 160], Duration::ZERO))
            .unwrap();
        sink.send(&MediaUnit::audio(vec![0xd5; 160], Duration::from_millis(20)))
            .unwrap();

        let first = recv(&rx);
        let second = recv(&rx);
        assert_eq!(first.len(), HEADER_LEN + 160);
        assert_eq!(first[0] >> 6, RTP_VERSION);
        assert_eq!(first[1] & 0x7f, 8);
        assert_eq!(seq(&second), seq(&first).wrapping_add(1));
        assert_eq!(ts(&second).wrapping_sub(ts(&first)), 160);
        assert_eq!(ssrc(&first), ssrc(&second));
    }

    #[test]
    fn test_audio_marker_only_on_talkspurt_start() {
        let (rx, addr) = receiver();
        let sink = sink_to(addr, 1200);

        let mut first = MediaUnit::audio(vec![0xd5; 160], Duration::ZERO);
        first.marker = true;
        sink.send(&first).unwrap();
        sink.send(&MediaUnit::audio(vec![0xd5; 160], Duration::from_millis(20)))
            .unwrap();

        assert_ne!(recv(&rx)[1] & 0x80, 0);
        assert_eq!(recv(&rx)[1] & 0x80, 0);
    }

    #[test]
    fn test_video_marker_on_last_packet() {
        let (rx, addr) = receiver();
        let sink = sink_to(addr, 12);

        let mut au = vec![0, 0, 0, 1, 0x67, 1, 2, 0, 0, 0, 1, 0x65];
        au.extend(std::iter::repeat(7u8).take(25));
        sink.send(&MediaUnit::video(au, Some(Duration::from_millis(40))))
            .unwrap();

        // SPS single packet, then three FU-A fragments
        let packets: Vec<Vec<u8>> = (0..4).map(|_| recv(&rx)).collect();
        for (i, p) in packets.iter().enumerate() {
            assert_eq!(p[1] & 0x7f, 96);
            assert_eq!(p[1] & 0x80 != 0, i == 3);
            assert_eq!(ts(p), ts(&packets[0]));
        }
        assert_eq!(packets[0][HEADER_LEN], 0x67);
        assert_eq!(packets[1][HEADER_LEN] & 0x1f, NAL_TYPE_FU_A);
    }

    #[test]
    fn test_streams_use_distinct_ssrcs() {
        let (rx, addr) = receiver();
        let sink = sink_to(addr, 1200);
        sink.send(&MediaUnit::audio(vec![0xd5; 160], Duration::ZERO))
            .unwrap();
        sink.send(&MediaUnit::video(vec![0, 0, 1, 0x65, 1], None))
            .unwrap();
        let audio = recv(&rx);
        let video = recv(&rx);
        // Independent random draws; a collision here is a 1 in 2^32 event
        assert_ne!(ssrc(&audio), ssrc(&video));
    }

    #[test]
    fn test_video_without_pts_reuses_timestamp() {
        let mut stream = RtpStream::new(96, VIDEO_CLOCK);
        let a = stream.timestamp(Some(Duration::from_secs(1)));
        let b = stream.timestamp(None);
        assert_eq!(a, b);
        assert_eq!(a.wrapping_sub(stream.timestamp_base), 90_000);
    }
}
