use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use rand::{Rng, RngCore, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::Role,
    repository::RepositoryState,
};

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;
pub const RESET_TOKEN_LEN: usize = 43;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// The payload of every token this service signs. Access tokens minted at login carry the
/// caller's `role`; refresh tokens and access tokens minted by `/refresh` do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user id, as a string.
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::InvalidToken("Invalid token subject".to_string()))
    }
}

/// issue_token
///
/// Signs an HS256 token for `user_id`. The lifetime is picked from `token_type`.
pub fn issue_token(secret: &str, user_id: i64, token_type: TokenType, role: Option<Role>) -> AppResult<String> {
    let now = Utc::now();
    let ttl = match token_type {
        TokenType::Access => Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
        TokenType::Refresh => Duration::days(REFRESH_TOKEN_TTL_DAYS),
    };
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        token_type,
        role,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
}

/// decode_token
///
/// Validates signature and expiry, then checks that the token is of the `expected` type.
///
/// An expired token is a 401; anything else that fails to decode, or a token of the wrong
/// type, is structurally unusable (422).
pub fn decode_token(secret: &str, token: &str, expected: TokenType) -> AppResult<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Unauthorized("Token has expired".to_string()),
            _ => AppError::InvalidToken("Invalid token".to_string()),
        })?;

    if data.claims.token_type != expected {
        let wanted = match expected {
            TokenType::Access => "Only access tokens are allowed",
            TokenType::Refresh => "Only refresh tokens are allowed",
        };
        return Err(AppError::InvalidToken(wanted.to_string()));
    }
    Ok(data.claims)
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> AppResult<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AppError::Internal(e.to_string()))?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// A fresh single-use password reset token (URL-safe).
pub fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// Behind the role gate the identity has already been resolved and sits in the request
/// extensions. Otherwise the Bearer access token is decoded here. When the token has no `role`
/// claim the role is read from storage, which also rejects tokens of deleted users.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let config = AppConfig::from_ref(state);
        let claims = decode_token(&config.jwt_secret, bearer_token(parts)?, TokenType::Access)?;
        let id = claims.user_id()?;

        let role = match claims.role {
            Some(role) => role,
            None => {
                let repo = RepositoryState::from_ref(state);
                let mut tx = repo.begin().await?;
                tx.user_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?
                    .role
            }
        };

        Ok(AuthUser { id, role })
    }
}

/// RefreshSubject
///
/// Extractor for `/refresh`: the user id carried by a valid refresh token.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSubject(pub i64);

impl<S> FromRequestParts<S> for RefreshSubject
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let claims = decode_token(&config.jwt_secret, bearer_token(parts)?, TokenType::Refresh)?;
        Ok(RefreshSubject(claims.user_id()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn access_token_round_trips_with_role() {
        let token = issue_token(SECRET, 42, TokenType::Access, Some(Role::Professor)).unwrap();
        let claims = decode_token(SECRET, &token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.role, Some(Role::Professor));
    }

    #[test]
    fn refresh_token_is_rejected_where_access_is_required() {
        let token = issue_token(SECRET, 1, TokenType::Refresh, None).unwrap();
        let err = decode_token(SECRET, &token, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_is_invalid_not_unauthorized() {
        let token = issue_token(SECRET, 1, TokenType::Access, None).unwrap();
        let err = decode_token("other-secret", &token, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let past = (Utc::now() - Duration::hours(2)).timestamp() as usize;
        let claims = Claims {
            sub: "1".into(),
            iat: past,
            exp: past + 60,
            token_type: TokenType::Access,
            role: None,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        let err = decode_token(SECRET, &token, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "s3cret-pass"));
        assert!(!verify_password(&hash, "wrong"));
        assert!(!verify_password("not-a-phc-string", "s3cret-pass"));
    }

    #[test]
    fn reset_tokens_are_url_safe_and_distinct() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
