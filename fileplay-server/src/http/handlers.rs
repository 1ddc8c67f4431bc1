use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use fileplay_lib::{Command, Event, SessionId, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, ServerError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Where the session's RTP goes, as `ip:port`
    pub rtp_target: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct MediaRequest {
    pub up: bool,
}

/// A control message as the gateway would relay it
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub request: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub transaction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

fn parse_session(id: &str) -> Result<SessionId> {
    SessionId::parse(id)
        .ok_or_else(|| ServerError::BadRequest(format!("invalid session id: {}", id)))
}

/// Map a request name to an engine command.
pub fn parse_command(request: &str, file: Option<String>) -> Result<Command> {
    match request {
        "play.file" => {
            let file = file
                .filter(|f| !f.is_empty())
                .ok_or_else(|| ServerError::BadRequest("play.file needs a file".into()))?;
            Ok(Command::Start {
                file: PathBuf::from(file),
            })
        }
        "pause.file" => Ok(Command::Pause),
        "resume.file" => Ok(Command::Resume),
        "stop.file" => Ok(Command::Stop),
        "request.offer" => Ok(Command::QueryOffer),
        other => Err(ServerError::BadRequest(format!("unknown request: {}", other))),
    }
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Version information endpoint
pub async fn version_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": fileplay_lib::ffmpeg_version_info()
    }))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    let target: SocketAddr = req.rtp_target.parse().map_err(|_| {
        ServerError::BadRequest(format!("invalid rtp_target: {}", req.rtp_target))
    })?;
    let session_id = state.open_session(target);
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    let id = parse_session(&id)?;
    Ok(Json(state.engine.session(id)?))
}

/// Teardown; succeeds whether or not the session still exists.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_session(&id)?;
    if !state.close_session(id) {
        tracing::debug!(session = %id, "teardown of unknown session");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MediaRequest>,
) -> Result<StatusCode> {
    let id = parse_session(&id)?;
    if req.up {
        state.engine.setup_media(id)?;
    } else {
        state.engine.hangup_media(id)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Control message endpoint
///
/// `ping` is answered inline. Everything else is queued on the engine and
/// answered with 202; its outcome shows up in the session's events under
/// the same transaction.
pub async fn message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let id = parse_session(&id)?;
    if req.request == "ping" {
        state.engine.session(id)?;
        return Ok((
            StatusCode::OK,
            Json(MessageResponse {
                response: "pong".into(),
                transaction: req.transaction,
            }),
        ));
    }

    let command = parse_command(&req.request, req.file)?;
    let transaction = req
        .transaction
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    state
        .engine
        .submit(id, Some(transaction.clone()), command)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            response: "ack".into(),
            transaction: Some(transaction),
        }),
    ))
}

/// Transport-setup descriptor, synchronously
pub async fn offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_session(&id)?;
    let sdp = state.engine.query_offer(id)?;
    Ok(([(header::CONTENT_TYPE, "application/sdp")], sdp))
}

pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>> {
    let id = parse_session(&id)?;
    state.engine.session(id)?;
    Ok(Json(state.events.drain(id)))
}
