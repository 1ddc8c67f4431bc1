//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - The playback engine
//! - Queued notifications per session (`EventLog`)
//! - The shared RTP socket and server configuration

use dashmap::DashMap;
use fileplay_lib::{Engine, Event, EventSink, SessionId};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::rtp::RtpPacketSink;

/// Engine events queued until a client drains them.
///
/// Only sessions opened through [`AppState`] have a queue; late events for a
/// closed session are dropped.
#[derive(Default)]
pub struct EventLog {
    queues: DashMap<SessionId, Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take every queued event of a session, oldest first.
    pub fn drain(&self, session: SessionId) -> Vec<Event> {
        self.queues
            .get_mut(&session)
            .map(|mut q| std::mem::take(q.value_mut()))
            .unwrap_or_default()
    }

    pub fn register(&self, session: SessionId) {
        self.queues.entry(session).or_default();
    }

    pub fn forget(&self, session: SessionId) {
        self.queues.remove(&session);
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: Event) {
        tracing::info!(
            session = %event.session,
            transaction = ?event.transaction,
            event = event.kind.name(),
            "event"
        );
        match self.queues.get_mut(&event.session) {
            Some(mut queue) => queue.push(event),
            None => {
                tracing::debug!(session = %event.session, "event for closed session dropped")
            }
        }
    }
}

/// Application state shared across all handlers
pub struct AppState {
    pub engine: Engine,

    pub events: Arc<EventLog>,

    /// Socket every session's RTP is sent from
    pub rtp_socket: Arc<UdpSocket>,

    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Bind the RTP socket and start the engine.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let rtp_socket = Arc::new(UdpSocket::bind(&config.rtp.bind)?);
        tracing::info!(addr = ?rtp_socket.local_addr().ok(), "RTP socket bound");

        let events = EventLog::new();
        let engine = Engine::new(config.engine.clone(), events.clone())?;
        Ok(Self {
            engine,
            events,
            rtp_socket,
            config,
        })
    }

    /// Register a session whose media goes to `target`.
    pub fn open_session(&self, target: SocketAddr) -> SessionId {
        let sink = RtpPacketSink::new(
            Arc::clone(&self.rtp_socket),
            target,
            self.config.rtp.mtu,
            self.config.engine.audio.codec,
            self.config.engine.video.payload_type,
        );
        let id = self.engine.create_session(Arc::new(sink));
        self.events.register(id);
        tracing::info!(session = %id, %target, "RTP session opened");
        id
    }

    /// Tear a session down and discard its queued events.
    pub fn close_session(&self, id: SessionId) -> bool {
        let existed = self.engine.destroy_session(id);
        self.events.forget(id);
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileplay_lib::EventKind;

    fn offer_event(session: SessionId, transaction: &str) -> Event {
        Event::new(
            session,
            Some(transaction.to_string()),
            EventKind::CreateOffer { sdp: "v=0".into() },
        )
    }

    #[test]
    fn test_event_log_drains_in_order() {
        let log = EventLog::new();
        let a = SessionId::new();
        let b = SessionId::new();
        log.register(a);
        log.register(b);
        log.emit(offer_event(a, "1"));
        log.emit(offer_event(b, "x"));
        log.emit(offer_event(a, "2"));

        let drained = log.drain(a);
        let transactions: Vec<_> = drained
            .iter()
            .map(|e| e.transaction.clone().unwrap())
            .collect();
        assert_eq!(transactions, vec!["1", "2"]);
        assert!(log.drain(a).is_empty());
        assert_eq!(log.drain(b).len(), 1);
    }

    #[test]
    fn test_forget_discards_queue() {
        let log = EventLog::new();
        let a = SessionId::new();
        log.register(a);
        log.emit(offer_event(a, "1"));
        log.forget(a);
        assert!(log.drain(a).is_empty());
    }

    #[test]
    fn test_late_event_does_not_revive_queue() {
        let log = EventLog::new();
        let a = SessionId::new();
        log.register(a);
        log.forget(a);
        log.emit(offer_event(a, "late"));
        assert!(log.queues.is_empty());
        assert!(log.drain(a).is_empty());
    }
}
