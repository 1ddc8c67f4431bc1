//! Sessions: one per external connection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::sink::PacketSink;
use crate::types::{PlaybackState, SessionId};
use crate::unit::PlaybackUnit;

pub struct Session {
    id: SessionId,
    packet_sink: Arc<dyn PacketSink>,
    alive: AtomicBool,
    media_up: AtomicBool,
    /// Control messages queued for this session but not yet consumed
    pending: AtomicUsize,
    unit: Mutex<Option<Arc<PlaybackUnit>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("media_up", &self.is_media_up())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Point-in-time view of a session, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub media_up: bool,
    pub pending_messages: usize,
    pub state: PlaybackState,
    pub file: Option<String>,
    pub running: bool,
}

impl Session {
    pub fn new(id: SessionId, packet_sink: Arc<dyn PacketSink>) -> Arc<Self> {
        Arc::new(Self {
            id,
            packet_sink,
            alive: AtomicBool::new(true),
            media_up: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            unit: Mutex::new(None),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_media_up(&self) -> bool {
        self.media_up.load(Ordering::Acquire)
    }

    pub(crate) fn set_media_up(&self, up: bool) {
        self.media_up.store(up, Ordering::Release);
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn message_queued(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn message_consumed(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn packet_sink(&self) -> &Arc<dyn PacketSink> {
        &self.packet_sink
    }

    pub fn unit(&self) -> Option<Arc<PlaybackUnit>> {
        self.unit.lock().clone()
    }

    /// The attached unit, creating it on first use.
    pub(crate) fn unit_or_create(self: &Arc<Self>) -> Arc<PlaybackUnit> {
        let mut slot = self.unit.lock();
        match slot.as_ref() {
            Some(unit) => Arc::clone(unit),
            None => {
                let unit = PlaybackUnit::new(self);
                *slot = Some(Arc::clone(&unit));
                unit
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let unit = self.unit();
        SessionSnapshot {
            id: self.id,
            media_up: self.is_media_up(),
            pending_messages: self.pending(),
            state: unit
                .as_ref()
                .map(|u| u.state())
                .unwrap_or(PlaybackState::Stopped),
            file: unit
                .as_ref()
                .and_then(|u| u.filename())
                .map(|p| p.display().to_string()),
            running: unit.as_ref().map(|u| u.is_running()).unwrap_or(false),
        }
    }

    /// End the session: tear down and release its unit.
    ///
    /// Does not wait for a running worker; the worker notices at its next poll
    /// and drops the last reference itself. Idempotent.
    pub(crate) fn destroy(&self) -> bool {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.set_media_up(false);
        let unit = self.unit.lock().take();
        if let Some(unit) = unit {
            unit.teardown();
        }
        tracing::info!(session = %self.id, pending = self.pending(), "session destroyed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::null_session;
    use std::path::Path;

    #[test]
    fn test_unit_created_once() {
        let session = null_session();
        assert!(session.unit().is_none());
        let a = session.unit_or_create();
        let b = session.unit_or_create();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_destroy_releases_unit_and_is_idempotent() {
        let session = null_session();
        let unit = session.unit_or_create();
        let lease = unit.begin(Path::new("a.wav")).unwrap();

        assert!(session.destroy());
        assert!(!session.destroy());
        assert!(!session.is_alive());
        assert!(session.unit().is_none());
        assert!(unit.is_destroyed());
        assert!(lease.halt().is_some());
    }

    #[test]
    fn test_snapshot() {
        let session = null_session();
        session.set_media_up(true);
        let unit = session.unit_or_create();
        let _lease = unit.begin(Path::new("/media/x.mp4")).unwrap();
        let snap = session.snapshot();
        assert!(snap.media_up);
        assert!(snap.running);
        assert_eq!(snap.state, PlaybackState::Playing);
        assert_eq!(snap.file.as_deref(), Some("/media/x.mp4"));
    }
}
