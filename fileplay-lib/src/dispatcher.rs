//! Control channel and its serialized dispatcher.
//!
//! All session and unit mutation, apart from the worker's own polling, happens
//! on one dispatcher thread draining a FIFO queue, so commands apply in
//! exactly the order they were submitted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::engine::EngineContext;
use crate::error::{PlayError, Result};
use crate::sdp;
use crate::session::Session;
use crate::sink::{Event, EventKind};
use crate::types::PlaybackState;
use crate::unit::PlaybackUnit;
use crate::worker::Worker;

/// A control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { file: PathBuf },
    Pause,
    Resume,
    Stop,
    QueryOffer,
}

impl Command {
    /// Request name used on the wire and in rejections
    pub fn request(&self) -> &'static str {
        match self {
            Command::Start { .. } => "play.file",
            Command::Pause => "pause.file",
            Command::Resume => "resume.file",
            Command::Stop => "stop.file",
            Command::QueryOffer => "request.offer",
        }
    }
}

/// One queued command bound to its session.
///
/// Counts as outstanding on the session from creation until it is dropped,
/// whether it was processed or discarded.
pub struct ControlMessage {
    session: Arc<Session>,
    transaction: Option<String>,
    command: Command,
}

impl ControlMessage {
    pub(crate) fn new(
        session: Arc<Session>,
        transaction: Option<String>,
        command: Command,
    ) -> Self {
        session.message_queued();
        Self {
            session,
            transaction,
            command,
        }
    }
}

impl Drop for ControlMessage {
    fn drop(&mut self) {
        self.session.message_consumed();
    }
}

pub(crate) type ControlSender = mpsc::UnboundedSender<ControlMessage>;

/// Start the dispatcher thread. It runs until every sender is dropped.
pub(crate) fn spawn(ctx: Arc<EngineContext>) -> Result<(ControlSender, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ControlMessage>();
    let handle = std::thread::Builder::new()
        .name("fileplay-dispatch".to_string())
        .spawn(move || {
            tracing::debug!("control dispatcher started");
            while let Some(msg) = rx.blocking_recv() {
                dispatch(&ctx, msg);
            }
            tracing::debug!("control dispatcher stopped");
        })
        .map_err(|e| PlayError::WorkerSpawn(format!("dispatcher: {}", e)))?;
    Ok((tx, handle))
}

fn dispatch(ctx: &Arc<EngineContext>, msg: ControlMessage) {
    let session = &msg.session;
    if !session.is_alive() {
        tracing::debug!(
            session = %session.id(),
            request = msg.command.request(),
            "discarding command for destroyed session"
        );
        return;
    }
    tracing::debug!(
        session = %session.id(),
        request = msg.command.request(),
        transaction = ?msg.transaction,
        "dispatching command"
    );

    let result = match &msg.command {
        Command::Start { file } => start(ctx, session, file, &msg.transaction),
        Command::Pause => require_media(ctx, session, "pause.file").and_then(|_| pause(session)),
        Command::Resume => require_media(ctx, session, "resume.file").and_then(|_| resume(session)),
        Command::Stop => require_media(ctx, session, "stop.file").and_then(|_| stop(session)),
        Command::QueryOffer => {
            let sdp = sdp::build_offer(&ctx.config);
            notify(ctx, session, &msg.transaction, EventKind::CreateOffer { sdp });
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(
            session = %session.id(),
            request = msg.command.request(),
            error = %e,
            "command failed"
        );
        let kind = match e {
            PlayError::Precondition { request, reason } => EventKind::CommandRejected {
                request: request.to_string(),
                reason,
            },
            other => EventKind::SetupFailed {
                reason: other.to_string(),
            },
        };
        notify(ctx, session, &msg.transaction, kind);
    }
}

/// Emit unless the session is already gone.
fn notify(ctx: &EngineContext, session: &Session, transaction: &Option<String>, kind: EventKind) {
    if session.is_alive() {
        ctx.events
            .emit(Event::new(session.id(), transaction.clone(), kind));
    }
}

fn require_media(ctx: &EngineContext, session: &Session, request: &'static str) -> Result<()> {
    if ctx.config.require_media_up && !session.is_media_up() {
        return Err(PlayError::precondition(request, "media is not up"));
    }
    Ok(())
}

fn start(
    ctx: &Arc<EngineContext>,
    session: &Arc<Session>,
    file: &Path,
    transaction: &Option<String>,
) -> Result<()> {
    require_media(ctx, session, "play.file")?;
    ctx.opener.check(file)?;

    let unit = session.unit_or_create();
    let replacing = unit.is_running();
    let lease = unit
        .begin(file)
        .ok_or_else(|| PlayError::precondition("play.file", "session is being torn down"))?;

    if replacing {
        tracing::info!(
            session = %session.id(),
            file = %file.display(),
            generation = lease.generation(),
            "replacing running playback"
        );
    }

    Worker::new(lease, file.to_path_buf(), transaction.clone(), Arc::clone(ctx)).spawn()?;
    notify(
        ctx,
        session,
        transaction,
        EventKind::LaunchStarted {
            file: file.display().to_string(),
        },
    );
    Ok(())
}

/// The unit of a session whose worker is running.
fn active_unit(session: &Session, request: &'static str) -> Result<Arc<PlaybackUnit>> {
    let unit = session
        .unit()
        .ok_or_else(|| PlayError::precondition(request, "nothing has been played"))?;
    if !unit.is_running() {
        return Err(PlayError::precondition(request, "no playback running"));
    }
    Ok(unit)
}

fn pause(session: &Session) -> Result<()> {
    let unit = active_unit(session, "pause.file")?;
    if !unit.transition(PlaybackState::Playing, PlaybackState::Paused) {
        return Err(PlayError::precondition(
            "pause.file",
            format!("playback is {:?}", unit.state()),
        ));
    }
    Ok(())
}

fn resume(session: &Session) -> Result<()> {
    let unit = active_unit(session, "resume.file")?;
    if !unit.transition(PlaybackState::Paused, PlaybackState::Playing) {
        return Err(PlayError::precondition(
            "resume.file",
            format!("playback is {:?}", unit.state()),
        ));
    }
    Ok(())
}

fn stop(session: &Session) -> Result<()> {
    let unit = active_unit(session, "stop.file")?;
    unit.set_state(PlaybackState::Stopped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::null_session;

    #[test]
    fn test_request_names() {
        assert_eq!(
            Command::Start {
                file: PathBuf::from("x")
            }
            .request(),
            "play.file"
        );
        assert_eq!(Command::QueryOffer.request(), "request.offer");
    }

    #[test]
    fn test_message_counts_pending_until_dropped() {
        let session = null_session();
        let a = ControlMessage::new(Arc::clone(&session), None, Command::Pause);
        let b = ControlMessage::new(Arc::clone(&session), Some("t".into()), Command::Stop);
        assert_eq!(session.pending(), 2);
        drop(a);
        assert_eq!(session.pending(), 1);
        drop(b);
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn test_pause_resume_preconditions() {
        let session = null_session();
        assert!(matches!(pause(&session), Err(PlayError::Precondition { .. })));

        let unit = session.unit_or_create();
        assert!(matches!(stop(&session), Err(PlayError::Precondition { .. })));

        let _lease = unit.begin(Path::new("a.wav")).unwrap();
        assert!(resume(&session).is_err());
        pause(&session).unwrap();
        assert_eq!(unit.state(), PlaybackState::Paused);
        assert!(pause(&session).is_err());
        resume(&session).unwrap();
        assert_eq!(unit.state(), PlaybackState::Playing);
        stop(&session).unwrap();
        assert_eq!(unit.state(), PlaybackState::Stopped);
    }
}
