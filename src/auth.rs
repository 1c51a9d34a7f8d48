use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::{
    audit::Actor,
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::{Role, User},
    repository::RepositoryState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of both access and refresh tokens. The role is fixed at issuance and is
/// trusted as-is for the lifetime of the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the identity id.
    pub sub: Uuid,
    pub role: Role,
    pub username: String,
    pub token_type: TokenType,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Extracting it rejects the
/// request with 401 when credentials are missing or invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub username: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            username: user.username.clone(),
        }
    }
}

impl AuthUser {
    /// The identity recorded on audit entries for mutations made by this caller.
    pub fn actor(&self) -> Actor {
        Actor::user(self.id, self.role)
    }
}

/// MaybeAuthUser
///
/// For public endpoints: no credentials means anonymous, but credentials that are
/// present and invalid still reject with 401.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// issue_token
///
/// Signs a token of the given type for `user` using the configured secret and TTL.
pub fn issue_token(config: &AppConfig, user: &AuthUser, token_type: TokenType) -> Result<String, AppError> {
    let now = now_secs();
    let ttl = match token_type {
        TokenType::Access => config.access_token_ttl_secs,
        TokenType::Refresh => config.refresh_token_ttl_secs,
    };
    let claims = Claims {
        sub: user.id,
        role: user.role,
        username: user.username.clone(),
        token_type,
        iat: now as usize,
        exp: (now + ttl) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
}

/// verify_token
///
/// Decodes and validates a token, insisting on the expected token type so a
/// refresh token can never be used as an access token.
pub fn verify_token(config: &AppConfig, token: &str, expected: TokenType) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let claims = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            return Err(match e.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token has expired".to_string())
                }
                _ => AppError::from(e),
            });
        }
    };

    if claims.token_type != expected {
        return Err(AppError::Unauthorized("Wrong token type".to_string()));
    }
    Ok(claims)
}

/// hash_password
///
/// bcrypt is CPU-bound, so it runs on the blocking pool instead of a runtime worker.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Resolves the caller, returning `Ok(None)` when no credentials were sent.
async fn resolve<S>(parts: &Parts, state: &S) -> Result<Option<AuthUser>, AppError>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let config = AppConfig::from_ref(state);

    // Local development bypass: the identity is looked up in the store.
    if config.env == Env::Local {
        if let Some(user_id) = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
        {
            let repo = RepositoryState::from_ref(state);
            if let Some(user) = repo.get_identity(user_id).await? {
                return Ok(Some(AuthUser::from(&user)));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Malformed Authorization header".to_string()))?;

    let claims = verify_token(&config, token, TokenType::Access)?;

    Ok(Some(AuthUser {
        id: claims.sub,
        role: claims.role,
        username: claims.username,
    }))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await?.ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".to_string())
        })
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(resolve(parts, state).await?))
    }
}
