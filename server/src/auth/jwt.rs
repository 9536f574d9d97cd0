//! JWT Token Generation and Validation
//!
//! HS256 with a shared secret. Tokens carry the user ID as the subject.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID as UUID string).
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

/// Generate a signed token for a user.
pub fn generate_token(user_id: Uuid, secret: &str, expiry_secs: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::seconds(expiry_secs)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validate a token and return its claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

/// Validate a token and parse the user ID it carries.
pub fn user_id_from_token(token: &str, secret: &str) -> Result<Uuid, AuthError> {
    let claims = validate_token(token, secret)?;
    claims.sub.parse().map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "secret", 3600).unwrap();
        assert_eq!(user_id_from_token(&token, "secret").unwrap(), user_id);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = generate_token(Uuid::new_v4(), "secret", 3600).unwrap();
        assert!(validate_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = generate_token(Uuid::new_v4(), "secret", -3600).unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }
}
