use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::PasswordVerifier;
use argon2::{password_hash::SaltString, Argon2, PasswordHash};
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    db_helpers::get_user_by_id,
    errors::RequestError,
    models::{Actor, User},
};

#[derive(Debug, Serialize, Deserialize)]
struct AuthClaim {
    sub: i64,
    email: String,
    iat: i64,
    exp: i64,
}

/// Identity recovered from a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
}

/// Signs and checks stateless HS256 access tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: time::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], lifetime: time::Duration) -> Self {
        TokenIssuer {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = OffsetDateTime::now_utc();
        let claim = AuthClaim {
            sub: user.id,
            email: user.email.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.lifetime).unix_timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claim, &self.encoding_key)
            .context("Failed to generate jwt token")
    }

    pub fn validate(&self, token: &str) -> Result<Subject, RequestError> {
        let token_data =
            jsonwebtoken::decode::<AuthClaim>(token, &self.decoding_key, &Validation::default())
                .map_err(|e| {
                    tracing::debug!(error = %e, "rejected bearer token");
                    RequestError::NotAuthorized("Invalid token")
                })?;
        let claim = token_data.claims;
        if claim.exp < OffsetDateTime::now_utc().unix_timestamp() {
            return Err(RequestError::NotAuthorized("Token expired"));
        }
        Ok(Subject { id: claim.sub })
    }
}

/// An authenticated, active account. Rejects the request with 401 when the
/// bearer token is missing or invalid and 403 when the account is disabled.
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor::from(&self.0)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync + 'static,
{
    type Rejection = RequestError;
    async fn from_request_parts(
        parts: &mut Parts,
        _: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(RequestError::NotAuthorized("Not authenticated"))?;
        let header = header
            .to_str()
            .map_err(|_| RequestError::NotAuthorized("Invalid token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(RequestError::NotAuthorized("Invalid token"))?;

        let issuer = parts
            .extensions
            .get::<Arc<TokenIssuer>>()
            .cloned()
            .ok_or(RequestError::ServerError)?;
        let pool = parts
            .extensions
            .get::<Arc<SqlitePool>>()
            .cloned()
            .ok_or(RequestError::ServerError)?;

        let subject = issuer.validate(token.trim())?;
        let user = get_user_by_id(&pool, subject.id)
            .await?
            .ok_or(RequestError::NotAuthorized("Could not validate credentials"))?;
        if !user.is_active {
            return Err(RequestError::Forbidden("Inactive user"));
        }
        tracing::debug!(user_id = user.id, "authenticated request");
        Ok(AuthUser(user))
    }
}

pub async fn verify_password_argon2(password: String, hash: &str) -> Result<bool> {
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || {
        let hash = PasswordHash::new(hash.as_str())
            .map_err(|_| anyhow::anyhow!("Stored password hash is malformed"))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok())
    })
    .await
    .context("Failed to verify password")?
}

pub async fn hash_password_argon2(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(rand::thread_rng());
        let hash = PasswordHash::generate(Argon2::default(), password, salt.as_salt())
            .map_err(|_| anyhow::anyhow!("Failed to hash password"))?;
        Ok(hash.to_string())
    })
    .await
    .context("Failed to hash password")?
}
