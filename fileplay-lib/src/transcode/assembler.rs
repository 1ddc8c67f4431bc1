//! Fixed-size frame assembly for the narrowband encoder.
//!
//! Resampled audio arrives in chunks whose size depends on the source codec
//! (1152 samples for MP3, 1024 for AAC, arbitrary for PCM) and on the
//! resampler's internal delay. The encoder wants exactly `frame_samples` per
//! frame, so samples are buffered here across packet boundaries.
//!
//! Timestamps are derived from the number of samples already emitted, anchored
//! at the first decoded frame's timestamp. Container timestamps are never used
//! after the anchor, which keeps the output grid drift-free.

use std::collections::VecDeque;
use std::time::Duration;

pub struct FrameAssembler {
    frame_samples: usize,
    sample_rate: u32,
    pending: VecDeque<i16>,
    emitted_samples: u64,
    anchor: Option<Duration>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize, sample_rate: u32) -> Self {
        Self {
            frame_samples,
            sample_rate,
            pending: VecDeque::with_capacity(frame_samples * 4),
            emitted_samples: 0,
            anchor: None,
        }
    }

    /// Pin the timeline origin. Only the first call has an effect.
    pub fn anchor(&mut self, start: Duration) {
        if self.anchor.is_none() {
            self.anchor = Some(start);
        }
    }

    pub fn push(&mut self, samples: &[i16]) {
        self.pending.extend(samples.iter().copied());
    }

    /// Take one full frame and its presentation time, if enough samples are buffered.
    pub fn next_frame(&mut self) -> Option<(Vec<i16>, Duration)> {
        if self.pending.len() < self.frame_samples {
            return None;
        }
        let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
        Some(self.stamp(frame))
    }

    /// Take the trailing partial frame padded with silence. Used at end of stream.
    pub fn flush_padded(&mut self) -> Option<(Vec<i16>, Duration)> {
        if self.pending.is_empty() {
            return None;
        }
        let mut frame: Vec<i16> = self.pending.drain(..).collect();
        frame.resize(self.frame_samples, 0);
        Some(self.stamp(frame))
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn emitted_samples(&self) -> u64 {
        self.emitted_samples
    }

    fn stamp(&mut self, frame: Vec<i16>) -> (Vec<i16>, Duration) {
        let offset_us = self.emitted_samples * 1_000_000 / self.sample_rate as u64;
        let pts = self.anchor.unwrap_or(Duration::ZERO) + Duration::from_micros(offset_us);
        self.emitted_samples += self.frame_samples as u64;
        (frame, pts)
    }
}
