//! Registration, login, and bearer-token authentication.
//!
//! Passwords are stored as bcrypt hashes. bcrypt is deliberately slow, so
//! hashing and verification run on the blocking pool.
//!
//! Tokens are HS256 JWTs whose `sub` is the user's email and whose `exp`
//! is `auth.access_token_expire_minutes` after issue. The [`CurrentUser`]
//! extractor accepts `Authorization: Bearer <token>` and rejects anything
//! else with `401` and `WWW-Authenticate: Bearer`.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::server::AppState;
use crate::users;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 4;
/// Maximum password length in bytes; bcrypt only reads the first 72.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Verified against when a login names an unknown email, so both branches
/// pay for one bcrypt verification.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: User,
}

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("Failed to hash password")
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| hash_password("ragchat-unknown-user").unwrap_or_default())
}

/// Verify on the blocking pool. With no stored hash the password is checked
/// against [`DUMMY_HASH`] and the result is always `false`.
async fn verify_password_blocking(password: String, hash: Option<String>) -> Result<bool> {
    let ok = tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            verify_password(&password, dummy_hash());
            false
        }
    })
    .await?;
    Ok(ok)
}

pub fn create_token(email: &str, config: &AuthConfig) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: email.to_string(),
        iat: now,
        exp: now + config.access_token_expire_minutes * 60,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .context("Failed to sign token")
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn validate_credentials(creds: &Credentials) -> ApiResult<()> {
    if !is_valid_email(&creds.email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if creds.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if creds.password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::bad_request(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

pub async fn register(
    pool: &SqlitePool,
    config: &AuthConfig,
    creds: Credentials,
) -> ApiResult<TokenResponse> {
    validate_credentials(&creds)?;
    let email = creds.email.trim().to_lowercase();

    if users::find_by_email(pool, &email).await?.is_some() {
        return Err(ApiError::conflict("Email already registered"));
    }

    let hash = hash_password_blocking(creds.password).await?;
    let user = users::create_user(pool, &email, &hash)
        .await?
        .ok_or_else(|| ApiError::conflict("Email already registered"))?;

    tracing::info!(user_id = user.id, "user registered");
    Ok(TokenResponse {
        access_token: create_token(&user.email, config)?,
        token_type: "bearer",
        user,
    })
}

pub async fn login(
    pool: &SqlitePool,
    config: &AuthConfig,
    creds: Credentials,
) -> ApiResult<TokenResponse> {
    let email = creds.email.trim().to_lowercase();
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let stored = users::find_by_email(pool, &email).await?;
    let hash = stored.as_ref().map(|s| s.password_hash.clone());
    let verified = verify_password_blocking(creds.password, hash).await?;
    let Some(stored) = stored.filter(|_| verified) else {
        return Err(invalid());
    };
    if !stored.user.is_active {
        return Err(ApiError::bad_request("User account is disabled"));
    }

    tracing::debug!(user_id = stored.user.id, "user logged in");
    Ok(TokenResponse {
        access_token: create_token(&stored.user.email, config)?,
        token_type: "bearer",
        user: stored.user,
    })
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let rejected = || ApiError::unauthorized("Could not validate credentials");

        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(rejected)?;

        let claims =
            validate_token(token.trim(), &state.config.auth.secret_key).map_err(|_| rejected())?;

        let stored = users::find_by_email(&state.pool, &claims.sub)
            .await?
            .ok_or_else(rejected)?;
        Ok(CurrentUser(stored.user))
    }
}
