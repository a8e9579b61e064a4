use crate::api::AppState;
use crate::domain::auth::Claims;
use crate::error::{AppError, Result};
use axum::{
    extract::FromRequestParts,
    http::{Request, header, request::Parts},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// The caller, as identified by a verified bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub room_id: Option<Uuid>,
}

impl AuthUser {
    /// Returns the caller's room.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the caller has not paired into a room yet.
    pub fn require_room(&self) -> Result<Uuid> {
        self.room_id.ok_or_else(|| AppError::Validation("You need to be in a room to use this feature".to_string()))
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let auth_header = parts.headers.get(header::AUTHORIZATION).ok_or(AppError::AuthError)?;

        let auth_str = auth_header.to_str().map_err(|_| AppError::AuthError)?;
        let token = auth_str.strip_prefix("Bearer ").ok_or(AppError::AuthError)?;

        let claims = Claims::decode(token, &state.config.auth.jwt_secret)?;

        tracing::Span::current().record("user_id", tracing::field::display(claims.sub));

        Ok(Self { user_id: claims.sub, room_id: claims.room })
    }
}

/// Generates a UUID request id unless the caller already supplied one.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}
