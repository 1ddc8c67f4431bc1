//! Playback unit: the shared handle between a session and its pacing worker.
//!
//! A unit is always held as `Arc<PlaybackUnit>`. The two expected holders are
//! the owning session and the running worker (through a [`WorkerLease`]);
//! whichever drops the last `Arc` frees it. Teardown only flags the unit and
//! cuts its session link, it never waits for the worker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::session::Session;
use crate::types::{PlaybackState, SessionId};

#[derive(Debug)]
struct UnitInner {
    filename: Option<PathBuf>,
    destroyed: bool,
    session: Weak<Session>,
    /// Bumped by every start; a worker whose generation is stale exits
    generation: u64,
    /// Generation of the worker currently owning playback, if any
    running: Option<u64>,
}

#[derive(Debug)]
pub struct PlaybackUnit {
    session_id: SessionId,
    state: AtomicU8,
    inner: Mutex<UnitInner>,
}

impl PlaybackUnit {
    pub(crate) fn new(session: &Arc<Session>) -> Arc<Self> {
        tracing::debug!(session = %session.id(), "playback unit created");
        Arc::new(Self {
            session_id: session.id(),
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            inner: Mutex::new(UnitInner {
                filename: None,
                destroyed: false,
                session: Arc::downgrade(session),
                generation: 0,
                running: None,
            }),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from` → `to` atomically. Returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn filename(&self) -> Option<PathBuf> {
        self.inner.lock().filename.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// True while some worker owns playback.
    pub fn is_running(&self) -> bool {
        self.inner.lock().running.is_some()
    }

    /// The owning session, unless it has been torn down.
    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        let inner = self.inner.lock();
        if inner.destroyed {
            return None;
        }
        inner.session.upgrade()
    }

    /// Claim playback of `filename` for a new worker.
    ///
    /// Replaces the filename, supersedes any running worker and sets the
    /// state to PLAYING. Returns `None` once the unit is destroyed.
    pub(crate) fn begin(self: &Arc<Self>, filename: &Path) -> Option<WorkerLease> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return None;
            }
            inner.generation += 1;
            inner.filename = Some(filename.to_path_buf());
            inner.running = Some(inner.generation);
            // Under the lock so a retiring lease cannot overwrite it
            self.set_state(PlaybackState::Playing);
            inner.generation
        };
        Some(WorkerLease {
            unit: Arc::clone(self),
            generation,
        })
    }

    /// Flag the unit destroyed and drop its session link.
    ///
    /// Idempotent; returns true only for the call that did the work.
    pub(crate) fn teardown(&self) -> bool {
        let first = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                false
            } else {
                inner.destroyed = true;
                inner.session = Weak::new();
                true
            }
        };
        if first {
            self.set_state(PlaybackState::Stopped);
            tracing::debug!(session = %self.session_id, "playback unit torn down");
        }
        first
    }
}

impl Drop for PlaybackUnit {
    fn drop(&mut self) {
        tracing::debug!(session = %self.session_id, "playback unit released");
    }
}

/// Why a worker should leave its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    Destroyed,
    Superseded,
    Stopped,
}

/// A worker's stake in a unit.
///
/// Holds one strong reference for as long as the worker lives. Dropping the
/// lease clears the running marker, and returns the unit to STOPPED, unless a
/// newer worker has taken over.
#[derive(Debug)]
pub struct WorkerLease {
    unit: Arc<PlaybackUnit>,
    generation: u64,
}

impl WorkerLease {
    pub fn unit(&self) -> &Arc<PlaybackUnit> {
        &self.unit
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the worker must stop, checked at every poll.
    pub(crate) fn halt(&self) -> Option<Halt> {
        {
            let inner = self.unit.inner.lock();
            if inner.destroyed {
                return Some(Halt::Destroyed);
            }
            if inner.generation != self.generation {
                return Some(Halt::Superseded);
            }
        }
        match self.unit.state() {
            PlaybackState::Stopped => Some(Halt::Stopped),
            _ => None,
        }
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        let mut inner = self.unit.inner.lock();
        if inner.running == Some(self.generation) {
            inner.running = None;
            self.unit.set_state(PlaybackState::Stopped);
        }
    }
}
