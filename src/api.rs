//! HTTP surface: command entry points and SSE watch streams for the
//! presentation layer. Bodies mirror the domain records one-to-one.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{error, instrument};

use crate::coordinator::{CoordinatorError, SessionCoordinator};
use crate::events::SessionEvent;
use crate::games::{GameMove, GameType};
use crate::invites::{InviteBroker, InviteRecord};
use crate::notify::ChannelSink;
use crate::rewards::RewardRecord;
use crate::session::{SessionRecord, UserId};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Invite lifecycle operations.
    pub broker: InviteBroker,
    /// Session lifecycle and move operations.
    pub coordinator: SessionCoordinator,
    /// Notification inbox tap for the SSE stream.
    pub inbox: ChannelSink,
}

/// Builds the coordinator router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invites", post(create_invite))
        .route("/invites/{id}", get(get_invite))
        .route("/invites/{id}/accept", post(accept_invite))
        .route("/invites/{id}/decline", post(decline_invite))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/open", post(open_session))
        .route("/sessions/{id}/leave", post(leave_session))
        .route("/sessions/{id}/moves", post(submit_move))
        .route("/sessions/{id}/watch", get(watch_session))
        .route("/users/{user}/invites", get(list_invites))
        .route("/users/{user}/sessions", get(list_sessions))
        .route("/users/{user}/rewards", get(list_rewards))
        .route("/users/{user}/notifications", get(watch_notifications))
        .with_state(state)
}

/// Error wrapper mapping the coordinator taxonomy onto status codes.
struct ApiError(CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::Move(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoordinatorError::Invite(_) | CoordinatorError::Conflict => StatusCode::CONFLICT,
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::Db(_) => {
                error!(error = %self.0, "Store failure on the interactive path");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateInviteRequest {
    inviter_id: UserId,
    invitee_id: UserId,
    game_type: GameType,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct SubmitMoveRequest {
    user_id: UserId,
    #[serde(rename = "move")]
    game_move: GameMove,
}

#[instrument(skip(state, body))]
async fn create_invite(
    State(state): State<AppState>,
    Json(body): Json<CreateInviteRequest>,
) -> Result<Json<InviteRecord>, ApiError> {
    let record = state
        .broker
        .create_invite(&body.inviter_id, &body.invitee_id, body.game_type)
        .await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
async fn get_invite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InviteRecord>, ApiError> {
    Ok(Json(state.broker.get_invite(&id)?))
}

#[instrument(skip(state, body))]
async fn accept_invite(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserRef>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = state.broker.accept_invite(&id, &body.user_id).await?;
    Ok(Json(serde_json::json!({ "session_id": session_id })))
}

#[instrument(skip(state, body))]
async fn decline_invite(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserRef>,
) -> Result<StatusCode, ApiError> {
    state.broker.decline_invite(&id, &body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    Ok(Json(state.coordinator.get_session(&id)?))
}

#[instrument(skip(state, body))]
async fn open_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserRef>,
) -> Result<Json<SessionRecord>, ApiError> {
    let record = state.coordinator.open_session(&id, &body.user_id).await?;
    Ok(Json(record))
}

#[instrument(skip(state, body))]
async fn leave_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserRef>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.leave_session(&id, &body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
async fn submit_move(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SubmitMoveRequest>,
) -> Result<Json<SessionRecord>, ApiError> {
    let record = state
        .coordinator
        .submit_move(&id, &body.user_id, body.game_move)
        .await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
async fn watch_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.coordinator.watch_session(&id).map(|event| {
        let name = match &event {
            SessionEvent::Updated(_) => "updated",
            SessionEvent::Removed => "removed",
        };
        Ok(Event::default()
            .event(name)
            .data(serde_json::to_string(&event).unwrap_or_default()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[instrument(skip(state))]
async fn list_invites(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<InviteRecord>>, ApiError> {
    Ok(Json(state.broker.open_invites_for(&user)?))
}

#[instrument(skip(state))]
async fn list_sessions(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    Ok(Json(state.coordinator.sessions_for(&user)?))
}

#[instrument(skip(state))]
async fn list_rewards(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<RewardRecord>>, ApiError> {
    let rewards = state
        .coordinator
        .ledger()
        .rewards_for(&user)
        .map_err(CoordinatorError::from)?;
    Ok(Json(rewards))
}

#[instrument(skip(state))]
async fn watch_notifications(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.inbox.subscribe(&user).map(|notification| {
        Ok(Event::default()
            .event(notification.kind.to_string())
            .data(serde_json::to_string(&notification).unwrap_or_default()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
