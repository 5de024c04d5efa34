use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    errors::ErrorKind,
    jwk::JwkSet,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use kindred_types::api::Claims;

use crate::auth::{ADMIN_ROLE, AppState};
use crate::error::ApiError;

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
    /// Set for tokens this server issued; remote admin tokens carry none.
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized access")]
    Forbidden,

    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::TokenExpired | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::KeySetUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "NOT_AUTHENTICATED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Forbidden => "FORBIDDEN",
            Self::KeySetUnavailable(_) => "INTERNAL_ERROR",
        }
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => {
            debug!("Token rejected: {}", err);
            AuthError::InvalidToken
        }
    }
}

/// Turns a bearer token into a [`Caller`].
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Caller, AuthError>;
}

/// HS256 tokens signed with the server's own secret.
pub struct LocalVerifier {
    key: DecodingKey,
}

impl LocalVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Caller, AuthError> {
        let data = decode::<Claims>(token, &self.key, &Validation::default()).map_err(classify)?;
        let claims = data.claims;
        Ok(Caller {
            subject: claims.sub.to_string(),
            user_id: Some(claims.sub),
            email: Some(claims.email),
            roles: claims.roles,
        })
    }
}

#[async_trait]
impl CredentialVerifier for LocalVerifier {
    async fn verify(&self, token: &str) -> Result<Caller, AuthError> {
        self.decode(token)
    }
}

#[derive(Debug, Deserialize)]
struct RemoteClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    resource_access: HashMap<String, ClientAccess>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientAccess {
    #[serde(default)]
    roles: Vec<String>,
}

impl RemoteClaims {
    fn roles_for(&self, client_id: &str) -> Vec<String> {
        self.resource_access
            .get(client_id)
            .map(|access| access.roles.clone())
            .unwrap_or_default()
    }
}

struct CachedKeys {
    fetched_at: Instant,
    keys: JwkSet,
}

/// Shortest gap between refreshes forced by an unknown `kid`.
pub const DEFAULT_MIN_REFRESH: Duration = Duration::from_secs(30);

/// RS256 tokens from a remote identity provider. Signing keys are fetched
/// from the provider's certs URL and cached for `ttl`. An unknown `kid`
/// forces a refresh so rotated keys are picked up, at most once per
/// `min_refresh`.
pub struct JwksVerifier {
    http: reqwest::Client,
    certs_url: String,
    client_id: String,
    ttl: Duration,
    min_refresh: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(certs_url: impl Into<String>, client_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            certs_url: certs_url.into(),
            client_id: client_id.into(),
            ttl,
            min_refresh: DEFAULT_MIN_REFRESH,
            cache: RwLock::new(None),
        }
    }

    pub fn with_min_refresh(mut self, min_refresh: Duration) -> Self {
        self.min_refresh = min_refresh;
        self
    }

    async fn keys(&self, force_refresh: bool) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = cached.fetched_at.elapsed();
                if age < self.ttl && !(force_refresh && age >= self.min_refresh) {
                    if force_refresh {
                        debug!("Key set refreshed {:?} ago; not refetching", age);
                    }
                    return Ok(cached.keys.clone());
                }
            }
        }

        info!("Fetching signing keys from {}", self.certs_url);
        let keys: JwkSet = self
            .http
            .get(&self.certs_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        *self.cache.write().await = Some(CachedKeys {
            fetched_at: Instant::now(),
            keys: keys.clone(),
        });
        Ok(keys)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation
    }
}

#[async_trait]
impl CredentialVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Caller, AuthError> {
        let header = decode_header(token).map_err(classify)?;
        let kid = header.kid.ok_or(AuthError::InvalidToken)?;

        let mut keys = self.keys(false).await?;
        if keys.find(&kid).is_none() {
            keys = self.keys(true).await?;
        }
        let jwk = keys.find(&kid).ok_or_else(|| {
            warn!("No signing key with kid {}", kid);
            AuthError::InvalidToken
        })?;
        let key = DecodingKey::from_jwk(jwk).map_err(classify)?;

        let claims = decode::<RemoteClaims>(token, &key, &self.validation())
            .map_err(classify)?
            .claims;
        let roles = claims.roles_for(&self.client_id);
        Ok(Caller {
            subject: claims.sub,
            user_id: None,
            email: claims.email,
            roles,
        })
    }
}

type BearerHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

fn bearer_token(header: BearerHeader) -> Result<String, AuthError> {
    header
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .map_err(|_| AuthError::MissingCredentials)
}

/// Accept tokens issued by this server's login endpoint.
pub async fn require_user(
    State(state): State<AppState>,
    header: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(header)?;
    let caller = state.user_verifier.verify(&token).await?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Accept only callers holding the admin role.
pub async fn require_admin(
    State(state): State<AppState>,
    header: BearerHeader,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(header)?;
    let caller = state.admin_verifier.verify(&token).await?;

    if !caller.has_role(ADMIN_ROLE) {
        warn!("Caller {} lacks the admin role for {}", caller.subject, req.uri().path());
        return Err(AuthError::Forbidden.into());
    }

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
