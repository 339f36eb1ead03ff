//! Password hashing, bearer tokens, and the authentication gate.
//!
//! Passwords are stored as argon2id PHC strings. Tokens are HS256 JWTs
//! carrying the user id and role; the signing secret comes from the
//! environment and is never persisted.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::api::SharedState;
use crate::db::DbHandle;
use crate::errors::ApiError;
use crate::models::{PublicUser, Role};

// ── Passwords ───────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// An unparseable stored hash verifies as false rather than erroring.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// ── Tokens ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signing and verification keys derived from one secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user_id: i64, role: Role) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Expired and malformed tokens both read as invalid to the caller;
    /// the distinction only goes to the log.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "expired",
                    _ => "invalid",
                };
                tracing::debug!(reason, "bearer token rejected");
                Err(ApiError::Authentication(
                    "Not authorized, invalid token".into(),
                ))
            }
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

/// Resolve the caller from the Authorization header. The token must
/// verify and its subject must still exist.
pub async fn authenticate(
    db: &DbHandle,
    keys: &TokenKeys,
    headers: &HeaderMap,
) -> Result<PublicUser, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::Authentication("Not authorized, token missing".into()))?
        .to_string();
    let claims = keys.verify(&token)?;
    let user_id = claims.sub;
    let user = db
        .call(move |store| store.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::Authentication("User no longer exists".into()))?;
    Ok(user.public())
}

/// Gate every mutating route behind a valid token. Register and login
/// stay open so callers can obtain one; safe methods pass through, and
/// `GET /auth/me` resolves the caller in its own handler.
pub async fn require_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let exempt = matches!(request.uri().path(), "/auth/register" | "/auth/login");
    if exempt || request.method().is_safe() {
        return Ok(next.run(request).await);
    }
    let user = authenticate(&state.db, &state.keys, request.headers()).await?;
    tracing::debug!(
        user_id = user.id,
        method = %request.method(),
        path = %request.uri().path(),
        "authenticated write"
    );
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("hunter2").unwrap();
        let b = hash_password("hunter2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_round_trip() {
        let keys = TokenKeys::new("test-secret", 7);
        let token = keys.issue(42, Role::Administrator).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::Administrator);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = TokenKeys::new("test-secret", -1);
        let token = keys.issue(42, Role::Technician).unwrap();
        let err = keys.verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenKeys::new("secret-a", 7)
            .issue(42, Role::Technician)
            .unwrap();
        let err = TokenKeys::new("secret-b", 7).verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Authentication(_)));
        assert_eq!(err.to_string(), "Not authorized, invalid token");
    }

    #[test]
    fn test_bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[tokio::test]
    async fn test_authenticate_resolves_user() {
        let db = DbHandle::new(Store::new_in_memory().unwrap());
        let keys = TokenKeys::new("test-secret", 7);
        let user = db
            .call(|store| store.create_user("Ana", "ana@plant.example", "hash", Role::Technician))
            .await
            .unwrap();

        let token = keys.issue(user.id, user.role).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let resolved = authenticate(&db, &keys, &headers).await.unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.email, "ana@plant.example");

        // A token whose subject was deleted no longer authenticates.
        let ghost = keys.issue(9999, Role::Technician).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {ghost}").parse().unwrap(),
        );
        let err = authenticate(&db, &keys, &headers).await.unwrap_err();
        assert_eq!(err.to_string(), "User no longer exists");

        let err = authenticate(&db, &keys, &HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authorized, token missing");
    }
}
