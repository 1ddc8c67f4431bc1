//! Outbound capabilities: packet sink and event sink.
//!
//! Both are supplied by the host. The engine never retries a failed send and
//! never blocks on either.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::types::{MediaUnit, PlaybackStats, SessionId};

/// Accepts paced units for transport delivery.
pub trait PacketSink: Send + Sync {
    fn send(&self, unit: &MediaUnit) -> Result<()>;
}

/// Accepts status notifications.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Why a pacing worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitReason {
    Eof,
    Stopped,
    Superseded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum EventKind {
    #[serde(rename = "create.offer")]
    CreateOffer { sdp: String },

    #[serde(rename = "launch.started")]
    LaunchStarted { file: String },

    #[serde(rename = "exit.ffmpeg")]
    Exit {
        file: String,
        reason: ExitReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        stats: PlaybackStats,
    },

    #[serde(rename = "setup.failed")]
    SetupFailed { reason: String },

    #[serde(rename = "command.rejected")]
    CommandRejected { request: String, reason: String },
}

impl EventKind {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CreateOffer { .. } => "create.offer",
            EventKind::LaunchStarted { .. } => "launch.started",
            EventKind::Exit { .. } => "exit.ffmpeg",
            EventKind::SetupFailed { .. } => "setup.failed",
            EventKind::CommandRejected { .. } => "command.rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub session: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(session: SessionId, transaction: Option<String>, kind: EventKind) -> Self {
        Self {
            session,
            transaction,
            at: Utc::now(),
            kind,
        }
    }
}

/// Event sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: Event) {
        tracing::info!(
            session = %event.session,
            transaction = ?event.transaction,
            event = event.kind.name(),
            "event"
        );
    }
}
