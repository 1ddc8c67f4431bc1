//! Engine facade: session registry, control channel and host lifecycle hooks.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::dispatcher::{self, Command, ControlMessage, ControlSender};
use crate::error::{FfmpegError, PlayError, Result};
use crate::sdp;
use crate::session::{Session, SessionSnapshot};
use crate::sink::{EventSink, PacketSink};
use crate::source::{FfmpegOpener, SourceOpener};
use crate::transcode::encoder::is_encoder_available;
use crate::types::SessionId;

/// What workers and the dispatcher share
pub(crate) struct EngineContext {
    pub(crate) config: EngineConfig,
    pub(crate) opener: Arc<dyn SourceOpener>,
    pub(crate) events: Arc<dyn EventSink>,
}

pub struct Engine {
    ctx: Arc<EngineContext>,
    sessions: DashMap<SessionId, Arc<Session>>,
    control: Mutex<Option<ControlSender>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Engine playing real files through FFmpeg.
    ///
    /// Initializes FFmpeg. Hosts wanting FFmpeg's log routed through `tracing`
    /// call [`init`](crate::init) and then
    /// [`install_log_filter`](crate::install_log_filter) before this.
    pub fn new(config: EngineConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        crate::init()?;
        if !is_encoder_available(config.audio.codec) {
            return Err(FfmpegError::EncoderNotFound(format!("{:?}", config.audio.codec)).into());
        }
        Self::with_opener(config, events, Arc::new(FfmpegOpener))
    }

    /// Engine with a custom source opener.
    pub fn with_opener(
        config: EngineConfig,
        events: Arc<dyn EventSink>,
        opener: Arc<dyn SourceOpener>,
    ) -> Result<Self> {
        config.validate()?;
        let ctx = Arc::new(EngineContext {
            config,
            opener,
            events,
        });
        let (tx, handle) = dispatcher::spawn(Arc::clone(&ctx))?;
        tracing::info!(
            codec = ?ctx.config.audio.codec,
            video = ctx.config.video.enabled,
            poll_ms = ctx.config.poll_interval_ms,
            "playback engine ready"
        );
        Ok(Self {
            ctx,
            sessions: DashMap::new(),
            control: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Register a new connection.
    pub fn create_session(&self, packet_sink: Arc<dyn PacketSink>) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, Session::new(id, packet_sink));
        tracing::info!(session = %id, "session created");
        id
    }

    /// Register a connection under a host-chosen id.
    pub fn create_session_with_id(
        &self,
        id: SessionId,
        packet_sink: Arc<dyn PacketSink>,
    ) -> Result<()> {
        match self.sessions.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(PlayError::SessionExists(id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Session::new(id, packet_sink));
                tracing::info!(session = %id, "session created");
                Ok(())
            }
        }
    }

    /// End a connection. Returns false if it was already gone.
    ///
    /// A running worker is not waited for; it exits at its next poll.
    pub fn destroy_session(&self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some((_, session)) => session.destroy(),
            None => false,
        }
    }

    /// Host hook: the transport is ready to carry media.
    pub fn setup_media(&self, id: SessionId) -> Result<()> {
        let session = self.lookup(id)?;
        session.set_media_up(true);
        tracing::info!(session = %id, "media up");
        Ok(())
    }

    /// Host hook: the transport stopped carrying media.
    pub fn hangup_media(&self, id: SessionId) -> Result<()> {
        let session = self.lookup(id)?;
        session.set_media_up(false);
        tracing::info!(session = %id, "media down");
        Ok(())
    }

    /// Queue a command. Its outcome is reported through the event sink.
    pub fn submit(
        &self,
        id: SessionId,
        transaction: Option<String>,
        command: Command,
    ) -> Result<()> {
        let session = self.lookup(id)?;
        let control = self.control.lock();
        let tx = control
            .as_ref()
            .ok_or_else(|| PlayError::precondition(command.request(), "engine is shut down"))?;
        tx.send(ControlMessage::new(session, transaction, command))
            .map_err(|_| PlayError::WorkerSpawn("control dispatcher has exited".to_string()))
    }

    pub fn start(&self, id: SessionId, file: impl Into<PathBuf>) -> Result<()> {
        self.submit(id, None, Command::Start { file: file.into() })
    }

    pub fn pause(&self, id: SessionId) -> Result<()> {
        self.submit(id, None, Command::Pause)
    }

    pub fn resume(&self, id: SessionId) -> Result<()> {
        self.submit(id, None, Command::Resume)
    }

    pub fn stop(&self, id: SessionId) -> Result<()> {
        self.submit(id, None, Command::Stop)
    }

    /// Transport-setup descriptor for a session, synchronously.
    pub fn query_offer(&self, id: SessionId) -> Result<String> {
        self.lookup(id)?;
        Ok(sdp::build_offer(&self.ctx.config))
    }

    pub fn session(&self, id: SessionId) -> Result<SessionSnapshot> {
        Ok(self.lookup(id)?.snapshot())
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    /// Destroy every session and stop the dispatcher. Idempotent.
    pub fn shutdown(&self) {
        let ids = self.session_ids();
        for id in &ids {
            self.destroy_session(*id);
        }
        // Dropping the sender lets the dispatcher drain and exit
        drop(self.control.lock().take());
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                tracing::error!("control dispatcher panicked");
            }
            tracing::info!(sessions = ids.len(), "playback engine shut down");
        }
    }

    pub(crate) fn lookup(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| PlayError::SessionNotFound(id.to_string()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
