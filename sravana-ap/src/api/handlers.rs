//! HTTP request handlers
//!
//! Every playback command answers with the resulting [`PlaybackSnapshot`].
//! Errors become `{"status": "error: ..."}` with a matching status code.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::input::KeyCommand;
use crate::playback::{AmbientStatus, PlaybackSnapshot, SleepTimerRequest};
use crate::synth::AmbientProfile;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sravana_common::events::SleepTimerState;
use sravana_common::{ProgressRecord, Track, UserIdentity};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct BuildInfoResponse {
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub track: Track,
    /// Absent for anonymous listeners
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Resume point supplied by the caller instead of the stored one
    #[serde(default)]
    pub progress: Option<ProgressRecord>,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResponse {
    closed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub delta_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct ChapterRequest {
    pub number: u32,
    #[serde(default)]
    pub auto_resume: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: f32,
}

/// Omitting `muted` toggles
#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    #[serde(default)]
    pub muted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rate: f32,
}

#[derive(Debug, Serialize)]
pub struct SleepTimerCancelResponse {
    cancelled: bool,
}

/// Select by catalog id, or pass a full profile; omit both to clear the selection
#[derive(Debug, Deserialize)]
pub struct AmbientSelectRequest {
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profile: Option<AmbientProfile>,
}

#[derive(Debug, Serialize)]
pub struct AmbientVolumeResponse {
    volume: f32,
}

#[derive(Debug, Serialize)]
pub struct ChimeResponse {
    rung: bool,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct KeyResponse {
    consumed: bool,
    command: Option<KeyCommand>,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_)
        | Error::Common(sravana_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        Error::ChapterNotFound(_) | Error::Common(sravana_common::Error::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        Error::NoSession | Error::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: Error) -> ApiError {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

fn respond<T>(result: crate::Result<T>) -> ApiResult<T> {
    result.map(Json).map_err(api_error)
}

// ============================================================================
// Service
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "sravana-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
    })
}

/// GET /build_info
pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Session
// ============================================================================

/// POST /session/open
pub async fn open_session(
    State(ctx): State<AppContext>,
    Json(req): Json<OpenSessionRequest>,
) -> ApiResult<PlaybackSnapshot> {
    let user = req.user_id.map(UserIdentity::User).unwrap_or_default();
    info!("Open session request: track {} ({:?})", req.track.id, user);
    respond(ctx.player.open(req.track, user, req.progress).await)
}

/// POST /session/close
pub async fn close_session(State(ctx): State<AppContext>) -> Json<CloseSessionResponse> {
    Json(CloseSessionResponse {
        closed: ctx.player.close().await,
    })
}

// ============================================================================
// Transport
// ============================================================================

/// GET /playback/state
pub async fn get_state(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.snapshot().await)
}

/// POST /playback/play
pub async fn play(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.play().await)
}

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.pause().await)
}

/// POST /playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.toggle_play().await)
}

/// POST /playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.seek(req.position_seconds).await)
}

/// POST /playback/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Json(req): Json<SkipRequest>,
) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.skip(req.delta_seconds).await)
}

/// POST /playback/chapter
pub async fn go_to_chapter(
    State(ctx): State<AppContext>,
    Json(req): Json<ChapterRequest>,
) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.go_to_chapter(req.number, req.auto_resume).await)
}

/// POST /playback/next_chapter
pub async fn next_chapter(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.next_chapter().await)
}

/// POST /playback/previous_chapter
pub async fn previous_chapter(State(ctx): State<AppContext>) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.previous_chapter().await)
}

/// POST /playback/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<PlaybackSnapshot> {
    if !req.volume.is_finite() {
        return Err(api_error(Error::InvalidInput("volume must be a number".to_string())));
    }
    respond(ctx.player.set_volume(req.volume).await)
}

/// POST /playback/mute
pub async fn set_mute(
    State(ctx): State<AppContext>,
    Json(req): Json<MuteRequest>,
) -> ApiResult<PlaybackSnapshot> {
    let result = match req.muted {
        Some(muted) => ctx.player.set_muted(muted).await,
        None => ctx.player.toggle_mute().await,
    };
    respond(result)
}

/// POST /playback/rate
pub async fn set_rate(
    State(ctx): State<AppContext>,
    Json(req): Json<RateRequest>,
) -> ApiResult<PlaybackSnapshot> {
    respond(ctx.player.set_playback_rate(req.rate).await)
}

// ============================================================================
// Sleep timer
// ============================================================================

/// GET /sleep_timer
pub async fn get_sleep_timer(State(ctx): State<AppContext>) -> ApiResult<SleepTimerState> {
    respond(ctx.player.sleep_timer_state().await)
}

/// POST /sleep_timer
///
/// Body: `{"mode": "minutes", "minutes": 30}` or `{"mode": "chapter_end"}`
pub async fn arm_sleep_timer(
    State(ctx): State<AppContext>,
    Json(req): Json<SleepTimerRequest>,
) -> ApiResult<SleepTimerState> {
    respond(ctx.player.arm_sleep_timer(req).await)
}

/// DELETE /sleep_timer
pub async fn cancel_sleep_timer(State(ctx): State<AppContext>) -> ApiResult<SleepTimerCancelResponse> {
    respond(
        ctx.player
            .cancel_sleep_timer()
            .await
            .map(|cancelled| SleepTimerCancelResponse { cancelled }),
    )
}

// ============================================================================
// Ambient
// ============================================================================

/// GET /ambient/profiles
pub async fn list_ambient_profiles() -> Json<Vec<AmbientProfile>> {
    Json(AmbientProfile::catalog())
}

/// GET /ambient
pub async fn get_ambient(State(ctx): State<AppContext>) -> Json<AmbientStatus> {
    Json(ctx.player.ambient_status())
}

/// POST /ambient
pub async fn select_ambient(
    State(ctx): State<AppContext>,
    Json(req): Json<AmbientSelectRequest>,
) -> ApiResult<AmbientStatus> {
    let profile = match (req.profile, req.profile_id) {
        (Some(profile), _) => Some(profile),
        (None, Some(id)) => Some(AmbientProfile::find(&id).map_err(api_error)?),
        (None, None) => None,
    };
    ctx.player.select_ambient(profile);
    Ok(Json(ctx.player.ambient_status()))
}

/// POST /ambient/volume
pub async fn set_ambient_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<AmbientVolumeResponse> {
    if !req.volume.is_finite() {
        return Err(api_error(Error::InvalidInput("volume must be a number".to_string())));
    }
    Ok(Json(AmbientVolumeResponse {
        volume: ctx.player.set_ambient_volume(req.volume),
    }))
}

/// POST /ambient/chime
pub async fn chime(State(ctx): State<AppContext>) -> Json<ChimeResponse> {
    Json(ChimeResponse {
        rung: ctx.player.chime(),
    })
}

// ============================================================================
// Keyboard
// ============================================================================

/// POST /input/key
pub async fn key_press(
    State(ctx): State<AppContext>,
    Json(req): Json<KeyRequest>,
) -> ApiResult<KeyResponse> {
    respond(ctx.player.handle_key(&req.key).await.map(|command| KeyResponse {
        consumed: command.is_some(),
        command,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::ChapterNotFound(9)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::NoSession), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::Common(sravana_common::Error::InvalidInput("dup".into()))),
            StatusCode::BAD_REQUEST
        );
    }
}
