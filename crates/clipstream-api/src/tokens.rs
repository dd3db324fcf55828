//! Paired short-lived/long-lived token service.
//!
//! Access and refresh tokens are signed with independent secrets and
//! expiries, so compromise of one kind cannot forge the other. Only the
//! refresh token is persisted server-side (on the account document) -
//! access verification stays a pure signature/expiry check while refresh
//! tokens remain revocable by rotation or by clearing the field.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use clipstream_db::{Collection, Database};
use clipstream_types::models::User;

use crate::error::ApiError;

/// Signing configuration, built once at startup from the environment and
/// passed explicitly - never read from ambient process state.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Fresh per issuance - two rotations in the same second must still
    /// produce distinct byte values, or the equality-based reuse check
    /// could not tell old from new.
    pub jti: Uuid,
    pub exp: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenService {
    config: AuthConfig,
}

impl TokenService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Sign the identity claims with the access secret. Pure.
    pub fn issue_access(&self, user: &User) -> Result<String, ApiError> {
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            exp: expiry(Duration::minutes(self.config.access_ttl_minutes)),
        };
        sign(&claims, &self.config.access_secret)
    }

    /// Sign minimal claims (account id only) with the refresh secret. Pure.
    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String, ApiError> {
        let claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            exp: expiry(Duration::days(self.config.refresh_ttl_days)),
        };
        sign(&claims, &self.config.refresh_secret)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.config.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.config.refresh_secret)
    }

    /// Issue a fresh pair and persist the new refresh token on the
    /// account, overwriting the previous one - after this, the old
    /// long-lived token no longer passes the refresh match check. The
    /// service's only mutating operation; called at login and at every
    /// successful refresh. Last-write-wins under concurrent rotation.
    pub fn rotate(&self, db: &Database, user: &mut User) -> Result<TokenPair, ApiError> {
        let access_token = self.issue_access(user)?;
        let refresh_token = self.issue_refresh(user.id)?;

        user.refresh_token = Some(refresh_token.clone());
        db.replace(Collection::Users, user)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn expiry(ttl: Duration) -> usize {
    (Utc::now() + ttl).timestamp() as usize
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, ApiError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

fn verify<T: serde::de::DeserializeOwned>(token: &str, secret: &str) -> Result<T, TokenError> {
    decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clipstream_types::models::AssetRef;

    fn test_config() -> AuthConfig {
        AuthConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 10,
        }
    }

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "chai".into(),
            email: "chai@example.com".into(),
            full_name: "Chai Dev".into(),
            avatar: AssetRef {
                url: "https://cdn.example.com/a.png".into(),
                public_id: "a".into(),
            },
            cover_image: None,
            watch_history: vec![],
            password: "digest".into(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_token_roundtrip() {
        let service = TokenService::new(test_config());
        let user = test_user();

        let token = service.issue_access(&user).unwrap();
        let claims = service.verify_access(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "chai");
    }

    #[test]
    fn secrets_are_independent() {
        let service = TokenService::new(test_config());
        let user = test_user();

        // An access token must not verify as a refresh token or vice versa.
        let access = service.issue_access(&user).unwrap();
        assert_eq!(service.verify_refresh(&access), Err(TokenError::Invalid));

        let refresh = service.issue_refresh(user.id).unwrap();
        assert_eq!(service.verify_access(&refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let service = TokenService::new(test_config());
        assert_eq!(
            service.verify_access("not-a-token"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn rotate_overwrites_stored_refresh_token() {
        let db = Database::open_in_memory().unwrap();
        let service = TokenService::new(test_config());
        let mut user = test_user();
        db.insert(Collection::Users, &user).unwrap();

        let first = service.rotate(&db, &mut user).unwrap();
        let second = service.rotate(&db, &mut user).unwrap();

        let stored: User = db
            .get(Collection::Users, &user.id.to_string())
            .unwrap()
            .unwrap();
        // Single-slot credential: only the latest refresh token matches.
        assert_eq!(stored.refresh_token.as_deref(), Some(second.refresh_token.as_str()));
        assert_ne!(first.refresh_token, second.refresh_token);
    }
}
