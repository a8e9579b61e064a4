use crate::error::{AppError, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Bearer token claims minted by the account service.
///
/// `room` is absent until the user has paired with a partner.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Uuid>,
    pub exp: usize,
}

impl Claims {
    #[must_use]
    pub fn new(user_id: Uuid, room_id: Option<Uuid>, ttl_secs: u64) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let expiration = usize::try_from(now.saturating_add(ttl_secs)).unwrap_or(usize::MAX);

        Self { sub: user_id, room: room_id, exp: expiration }
    }

    /// # Errors
    /// Returns `AppError::Internal` if signing fails.
    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes())).map_err(|_| AppError::Internal)
    }

    /// # Errors
    /// Returns `AppError::AuthError` for malformed, expired or foreign tokens.
    pub fn decode(token: &str, secret: &str) -> Result<Self> {
        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
            .map_err(|_| AppError::AuthError)?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_roundtrip() {
        let claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), 3600);
        let token = claims.encode("test_secret").unwrap();
        let decoded = Claims::decode(&token, "test_secret").unwrap();

        assert_eq!(claims, decoded);
    }

    #[test]
    fn test_claims_without_room() {
        let claims = Claims::new(Uuid::new_v4(), None, 3600);
        let token = claims.encode("test_secret").unwrap();
        assert_eq!(Claims::decode(&token, "test_secret").unwrap().room, None);
    }

    #[test]
    fn test_claims_invalid_secret() {
        let claims = Claims::new(Uuid::new_v4(), None, 3600);
        let token = claims.encode("secret1").unwrap();

        let result = Claims::decode(&token, "secret2");
        assert!(matches!(result, Err(AppError::AuthError)));
    }
}
