//! H.264 length-prefixed → Annex B reformatter.
//!
//! MP4 and Matroska store H.264 as length-prefixed NAL units with the SPS/PPS
//! kept once in the `avcC` decoder configuration record. Real-time consumers
//! join mid-stream and need start codes plus in-band parameter sets, so every
//! access unit is rewritten here:
//!
//! - each NAL gets a 4-byte start code instead of its length prefix
//! - the cached SPS/PPS are inserted (after an access unit delimiter, if any)
//!   when the access unit does not already carry them
//!
//! Streams that are already Annex B (MPEG-TS, raw `.h264`) pass through with
//! only the parameter-set insertion applied.

use crate::config::ParameterSetMode;
use crate::error::{PlayError, Result};
use bytes::{BufMut, Bytes, BytesMut};

const START_CODE: [u8; 4] = [0, 0, 0, 1];

pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// NAL unit type from the first header byte.
pub fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| b & 0x1f).unwrap_or(0)
}

/// How packets of a stream delimit their NAL units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Big-endian length prefix of 1, 2 or 4 bytes
    Length(usize),
    AnnexB,
}

/// Parsed `avcC` decoder configuration record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub length_size: usize,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfig {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let err = |what: &str| PlayError::Filter(format!("invalid avcC record: {}", what));

        if data.len() < 7 {
            return Err(err("too short"));
        }
        if data[0] != 1 {
            return Err(err("unsupported configuration version"));
        }
        let length_size = (data[4] & 0x03) as usize + 1;
        if length_size == 3 {
            return Err(err("3-byte NAL length prefix"));
        }

        let mut pos = 5;
        let sps_count = (data[pos] & 0x1f) as usize;
        pos += 1;
        let mut sps = Vec::with_capacity(sps_count);
        for _ in 0..sps_count {
            let (nal, next) = read_u16_prefixed(data, pos).ok_or_else(|| err("truncated SPS"))?;
            sps.push(nal.to_vec());
            pos = next;
        }

        let pps_count = *data.get(pos).ok_or_else(|| err("missing PPS count"))? as usize;
        pos += 1;
        let mut pps = Vec::with_capacity(pps_count);
        for _ in 0..pps_count {
            let (nal, next) = read_u16_prefixed(data, pos).ok_or_else(|| err("truncated PPS"))?;
            pps.push(nal.to_vec());
            pos = next;
        }

        Ok(Self {
            length_size,
            sps,
            pps,
        })
    }
}

fn read_u16_prefixed(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let len = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]) as usize;
    let start = pos + 2;
    let nal = data.get(start..start + len)?;
    Some((nal, start + len))
}

/// Split an Annex B buffer into NAL units (start codes removed).
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut i = 0;
    let mut start: Option<usize> = None;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if let Some(s) = start {
                let mut end = i;
                // A 4-byte start code owns the preceding zero
                while end > s && data[end - 1] == 0 {
                    end -= 1;
                }
                if end > s {
                    nals.push(&data[s..end]);
                }
            }
            i += 3;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        if s < data.len() {
            nals.push(&data[s..]);
        }
    }
    nals
}

fn split_length_prefixed(data: &[u8], length_size: usize) -> Result<Vec<&[u8]>> {
    let mut nals = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let prefix = data.get(pos..pos + length_size).ok_or_else(|| {
            PlayError::Filter(format!("truncated NAL length prefix at byte {}", pos))
        })?;
        let len = prefix.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        pos += length_size;
        let nal = data.get(pos..pos + len).ok_or_else(|| {
            PlayError::Filter(format!(
                "NAL of {} bytes overruns packet ({} bytes left)",
                len,
                data.len() - pos
            ))
        })?;
        if !nal.is_empty() {
            nals.push(nal);
        }
        pos += len;
    }
    Ok(nals)
}

/// Per-stream reformatter state
#[derive(Debug)]
pub struct AnnexBFilter {
    framing: Framing,
    mode: ParameterSetMode,
    sps: Vec<Bytes>,
    pps: Vec<Bytes>,
}

impl AnnexBFilter {
    /// Build the filter from the stream's codec extradata.
    ///
    /// A malformed `avcC` record is a filter initialisation failure: without
    /// the parameter sets no downstream decoder could start.
    pub fn new(extradata: &[u8], mode: ParameterSetMode) -> Result<Self> {
        if extradata.is_empty() {
            return Ok(Self {
                framing: Framing::AnnexB,
                mode,
                sps: Vec::new(),
                pps: Vec::new(),
            });
        }

        if extradata.starts_with(&[0, 0, 1]) || extradata.starts_with(&START_CODE) {
            let mut filter = Self {
                framing: Framing::AnnexB,
                mode,
                sps: Vec::new(),
                pps: Vec::new(),
            };
            filter.learn(&split_annexb(extradata));
            return Ok(filter);
        }

        let config = AvcConfig::parse(extradata)?;
        if config.sps.is_empty() || config.pps.is_empty() {
            return Err(PlayError::Filter(
                "avcC record carries no SPS/PPS".to_string(),
            ));
        }
        Ok(Self {
            framing: Framing::Length(config.length_size),
            mode,
            sps: config.sps.into_iter().map(Bytes::from).collect(),
            pps: config.pps.into_iter().map(Bytes::from).collect(),
        })
    }

    /// Rewrite one access unit.
    pub fn filter(&mut self, packet: &[u8]) -> Result<Bytes> {
        let nals = match self.framing {
            Framing::Length(size) => split_length_prefixed(packet, size)?,
            Framing::AnnexB => split_annexb(packet),
        };
        if nals.is_empty() {
            return Err(PlayError::Filter("packet contains no NAL units".into()));
        }

        let has_sps = nals.iter().any(|n| nal_type(n) == NAL_SPS);
        let has_pps = nals.iter().any(|n| nal_type(n) == NAL_PPS);
        let is_idr = nals.iter().any(|n| nal_type(n) == NAL_IDR);
        // In-band parameter sets replace the cached ones
        self.learn(&nals);

        let inject = !(has_sps && has_pps)
            && match self.mode {
                ParameterSetMode::EveryAccessUnit => true,
                ParameterSetMode::KeyframesOnly => is_idr,
            };

        let extra: usize = if inject {
            self.sps.iter().chain(&self.pps).map(|n| n.len() + 4).sum()
        } else {
            0
        };
        let mut out = BytesMut::with_capacity(packet.len() + nals.len() * 4 + extra);

        let mut rest = &nals[..];
        if let Some((first, tail)) = nals.split_first() {
            if nal_type(first) == NAL_AUD {
                put_nal(&mut out, first);
                rest = tail;
            }
        }
        if inject {
            for ps in self.sps.iter().chain(&self.pps) {
                put_nal(&mut out, ps);
            }
        }
        for nal in rest {
            put_nal(&mut out, nal);
        }
        Ok(out.freeze())
    }

    pub fn has_parameter_sets(&self) -> bool {
        !self.sps.is_empty() && !self.pps.is_empty()
    }

    fn learn(&mut self, nals: &[&[u8]]) {
        let sps: Vec<Bytes> = nals
            .iter()
            .filter(|n| nal_type(n) == NAL_SPS)
            .map(|n| Bytes::copy_from_slice(n))
            .collect();
        let pps: Vec<Bytes> = nals
            .iter()
            .filter(|n| nal_type(n) == NAL_PPS)
            .map(|n| Bytes::copy_from_slice(n))
            .collect();
        if !sps.is_empty() {
            self.sps = sps;
        }
        if !pps.is_empty() {
            self.pps = pps;
        }
    }
}

fn put_nal(out: &mut BytesMut, nal: &[u8]) {
    out.put_slice(&START_CODE);
    out.put_slice(nal);
}
