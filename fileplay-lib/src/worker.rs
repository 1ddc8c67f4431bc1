//! Pacing worker
//!
//! One OS thread per active playback. The worker probes the file, then reads
//! packets in container order, routes them through the media paths and hands
//! each unit to the session's packet sink at its wall-clock target time.
//! Pause, stop, supersede and teardown are observed by polling at bounded
//! intervals; nothing here blocks on the control path.

use std::cell::Cell;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::engine::EngineContext;
use crate::error::{PlayError, Result};
use crate::pacing::{wait_until, Due, PlaybackClock};
use crate::sink::{Event, EventKind, ExitReason};
use crate::source::{MediaSource, Step};
use crate::types::{MediaKind, MediaUnit, PlaybackState, PlaybackStats};
use crate::unit::{Halt, WorkerLease};

/// How a run ended
#[derive(Debug)]
enum Outcome {
    Finished(ExitReason),
    Failed(PlayError),
    /// The session went away; nobody is left to notify
    Destroyed,
}

impl From<Halt> for Outcome {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Destroyed => Outcome::Destroyed,
            Halt::Superseded => Outcome::Finished(ExitReason::Superseded),
            Halt::Stopped => Outcome::Finished(ExitReason::Stopped),
        }
    }
}

pub(crate) struct Worker {
    lease: WorkerLease,
    file: PathBuf,
    transaction: Option<String>,
    ctx: Arc<EngineContext>,
    /// Next audio frame opens a talkspurt (start of run, after a pause)
    talkspurt: Cell<bool>,
}

impl Worker {
    pub(crate) fn new(
        lease: WorkerLease,
        file: PathBuf,
        transaction: Option<String>,
        ctx: Arc<EngineContext>,
    ) -> Self {
        Self {
            lease,
            file,
            transaction,
            ctx,
            talkspurt: Cell::new(true),
        }
    }

    /// Start the worker thread. On failure the lease is released and the
    /// unit falls back to STOPPED.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let name = format!(
            "fileplay-{}-{}",
            self.lease.unit().session_id(),
            self.lease.generation()
        );
        std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|e| PlayError::WorkerSpawn(e.to_string()))
    }

    fn run(self) {
        let session = self.lease.unit().session_id();
        let span = tracing::info_span!(
            "playback",
            %session,
            file = %self.file.display(),
            generation = self.lease.generation()
        );
        let _enter = span.enter();

        let started = Instant::now();
        let mut stats = PlaybackStats::default();

        let outcome = match self.ctx.opener.open(&self.file, &self.ctx.config) {
            Ok(mut source) => {
                let mut clock =
                    PlaybackClock::new(Instant::now(), self.ctx.config.catchup_tolerance());
                tracing::info!("playback started");
                let outcome = self.pace(source.as_mut(), &mut clock, &mut stats);
                stats.paused_for = clock.paused_total(Instant::now());
                stats.audio_frames = source.decoded_audio_frames();
                if clock.rebases() > 0 {
                    tracing::debug!(rebases = clock.rebases(), "pacing fell behind during run");
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot set up media paths");
                Outcome::Failed(e)
            }
        };
        stats.elapsed = started.elapsed();

        self.finish(outcome, stats);
    }

    fn pace(
        &self,
        source: &mut dyn MediaSource,
        clock: &mut PlaybackClock,
        stats: &mut PlaybackStats,
    ) -> Outcome {
        loop {
            if let Some(halt) = self.hold_while_paused(clock) {
                return halt.into();
            }

            match source.next_step() {
                Ok(Step::Eof) => {
                    match source.finish() {
                        Ok(tail) => {
                            stats.narrowband_frames += tail.len() as u64;
                            for unit in tail {
                                if let Some(outcome) = self.deliver(unit, clock, stats) {
                                    return outcome;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping buffered audio at end of stream")
                        }
                    }
                    return Outcome::Finished(ExitReason::Eof);
                }
                Ok(Step::Ignored) => stats.packets += 1,
                Ok(Step::Packet { kind, units }) => {
                    stats.packets += 1;
                    match kind {
                        MediaKind::Audio => {
                            stats.audio_packets += 1;
                            stats.narrowband_frames += units.len() as u64;
                        }
                        MediaKind::Video => {
                            stats.video_packets += 1;
                            stats.video_units += units.len() as u64;
                        }
                    }
                    for unit in units {
                        if let Some(outcome) = self.deliver(unit, clock, stats) {
                            return outcome;
                        }
                    }
                }
                Err(e) if e.is_per_packet() => {
                    stats.packets += 1;
                    stats.skipped_packets += 1;
                    tracing::warn!(error = %e, packet = stats.packets, "skipping packet");
                }
                Err(e) => {
                    tracing::error!(error = %e, "playback aborted");
                    return Outcome::Failed(e);
                }
            }
        }
    }

    /// Block while PAUSED; the time spent is excluded from pacing.
    fn hold_while_paused(&self, clock: &mut PlaybackClock) -> Option<Halt> {
        loop {
            if let Some(halt) = self.lease.halt() {
                return Some(halt);
            }
            if self.lease.unit().state() == PlaybackState::Paused {
                if !clock.is_paused() {
                    tracing::info!("paused");
                    clock.pause(Instant::now());
                }
                std::thread::sleep(self.ctx.config.poll_interval());
                continue;
            }
            if clock.is_paused() {
                let now = Instant::now();
                clock.resume(now);
                self.talkspurt.set(true);
                tracing::info!(paused_ms = clock.paused_total(now).as_millis() as u64, "resumed");
            }
            return None;
        }
    }

    /// Wait for the unit's due time, then send it.
    fn deliver(
        &self,
        unit: MediaUnit,
        clock: &mut PlaybackClock,
        stats: &mut PlaybackStats,
    ) -> Option<Outcome> {
        loop {
            match clock.schedule(unit.kind, unit.pts, Instant::now()) {
                Due::Now => break,
                Due::At(deadline) => {
                    let reached = wait_until(deadline, self.ctx.config.poll_interval(), || {
                        self.lease.halt().is_some()
                            || self.lease.unit().state() != PlaybackState::Playing
                    });
                    if reached {
                        break;
                    }
                    if let Some(halt) = self.hold_while_paused(clock) {
                        return Some(halt.into());
                    }
                }
            }
        }
        self.send(unit, stats);
        None
    }

    fn send(&self, mut unit: MediaUnit, stats: &mut PlaybackStats) {
        let Some(session) = self.lease.unit().session() else {
            stats.dropped_units += 1;
            return;
        };
        if self.ctx.config.require_media_up && !session.is_media_up() {
            stats.dropped_units += 1;
            return;
        }
        if unit.kind == MediaKind::Audio {
            unit.marker = self.talkspurt.replace(false);
        }
        if let Err(e) = session.packet_sink().send(&unit) {
            stats.dropped_units += 1;
            tracing::warn!(kind = %unit.kind, error = %e, "packet sink refused unit");
        }
    }

    fn finish(self, outcome: Outcome, stats: PlaybackStats) {
        let (reason, detail) = match outcome {
            Outcome::Finished(reason) => (reason, None),
            Outcome::Failed(e) => (ExitReason::Error, Some(e.to_string())),
            Outcome::Destroyed => {
                tracing::info!(packets = stats.packets, "session gone, worker exiting");
                return;
            }
        };

        tracing::info!(
            ?reason,
            packets = stats.packets,
            audio_packets = stats.audio_packets,
            video_packets = stats.video_packets,
            audio_frames = stats.audio_frames,
            narrowband_frames = stats.narrowband_frames,
            video_units = stats.video_units,
            skipped = stats.skipped_packets,
            dropped = stats.dropped_units,
            paused_ms = stats.paused_for.as_millis() as u64,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "playback finished"
        );

        let Self {
            lease,
            file,
            transaction,
            ctx,
            ..
        } = self;
        let unit = Arc::clone(lease.unit());
        if unit.is_destroyed() {
            return;
        }
        // Release the unit before reporting so observers of the event see it STOPPED
        drop(lease);

        // Teardown may have landed while the lease was released
        if unit.is_destroyed() {
            return;
        }
        ctx.events.emit(Event::new(
            unit.session_id(),
            transaction,
            EventKind::Exit {
                file: file.display().to_string(),
                reason,
                detail,
                stats,
            },
        ));
    }
}
