//! Credential hashing and bearer tokens.

use anyhow::{Context, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Account, Role};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountInactive,

    #[error("No token, authorization denied")]
    MissingToken,

    #[error("Token is not valid")]
    InvalidToken,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking pool, keeping argon2 off the async workers.
pub async fn hash_password_task(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_task(password: String, hash: String) -> Result<bool, AuthError> {
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?;
    Ok(verified)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub role: Role,
}

/// Issues and verifies HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, account: &Account) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id,
            role: account.role(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(anyhow!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {e}");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountProfile, Location, NewAccount};

    fn account() -> Account {
        NewAccount {
            first_name: "Asha".into(),
            last_name: "Patil".into(),
            email: "asha@example.com".into(),
            phone: "9876543210".into(),
            location: Location {
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411001".into(),
            },
            profile: AccountProfile::Consumer,
            password_hash: String::new(),
        }
        .into_account(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("secret123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret123", &hash));
        assert!(!verify_password("secret124", &hash));
        assert!(!verify_password("secret123", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn hashing_runs_on_the_blocking_pool() {
        let hash = hash_password_task("secret123".into()).await.unwrap();
        assert!(verify_password_task("secret123".into(), hash.clone()).await.unwrap());
        assert!(!verify_password_task("wrong".into(), hash).await.unwrap());
    }

    #[test]
    fn token_round_trip_carries_identity() {
        let tokens = TokenService::new("a-test-secret-that-is-long-enough-123", 1);
        let account = account();
        let claims = tokens.verify(&tokens.issue(&account).unwrap()).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::Consumer);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn foreign_and_expired_tokens_are_rejected() {
        let ours = TokenService::new("a-test-secret-that-is-long-enough-123", 1);
        let theirs = TokenService::new("another-secret-that-is-long-enough-456", 1);
        let token = theirs.issue(&account()).unwrap();
        assert!(matches!(ours.verify(&token), Err(AuthError::InvalidToken)));

        let expired = TokenService::new("a-test-secret-that-is-long-enough-123", -2);
        let token = expired.issue(&account()).unwrap();
        assert!(matches!(ours.verify(&token), Err(AuthError::InvalidToken)));
    }
}
