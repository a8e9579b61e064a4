use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::notes::{CreateNoteRequest, ListNotesResponse, NoteEnvelope, NoteResponse};
use crate::domain::projection::{NoteView, describe_delay};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Creates a note that publishes itself after the configured delay.
///
/// # Errors
/// Returns `AppError::Validation` if the caller has no room or the note is empty or too long.
pub async fn create_note(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse> {
    let room_id = auth_user.require_room()?;
    let view = state.note_service.create_note(auth_user.user_id, room_id, req.into()).await?;

    let message = format!(
        "Note created! It will be published in {}",
        describe_delay(state.lifecycle_engine.timings().publish_delay)
    );

    Ok((StatusCode::CREATED, Json(NoteEnvelope { message, note: view.into() })))
}

/// Publishes one of the caller's own notes immediately.
///
/// # Errors
/// Returns `AppError::Validation` for a malformed id, and `AppError::NotFound`,
/// `AppError::Forbidden` or `AppError::InvalidStateTransition` from the engine.
pub async fn publish_note(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(note_id): Path<String>,
) -> Result<impl IntoResponse> {
    let note_id = Uuid::parse_str(&note_id).map_err(|_| AppError::Validation("Invalid note ID".to_string()))?;
    let room_id = auth_user.require_room()?;
    let note = state.lifecycle_engine.publish_now(note_id, auth_user.user_id, room_id).await?;

    let timings = state.lifecycle_engine.timings();
    let message = format!("Note published! It will expire in {}", describe_delay(timings.expiry_delay));
    let view = NoteView::project(&note, auth_user.user_id, state.clock.now());

    Ok(Json(NoteEnvelope { message, note: view.into() }))
}

/// Lists the notes the caller can currently see in their room.
///
/// # Errors
/// Returns `AppError::Validation` if the caller has no room.
pub async fn list_notes(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let room_id = auth_user.require_room()?;
    let notes: Vec<NoteResponse> =
        state.note_service.list_visible(room_id, auth_user.user_id).await?.into_iter().map(Into::into).collect();

    Ok(Json(ListNotesResponse { count: notes.len(), notes }))
}
