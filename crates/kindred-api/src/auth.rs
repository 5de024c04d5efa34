use std::sync::Arc;

use anyhow::anyhow;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use kindred_core::PaymentGateway;
use kindred_db::{Database, Registration};
use kindred_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, UserView};

use crate::blocking;
use crate::error::ApiError;
use crate::logging::obfuscate_email;
use crate::middleware::{CredentialVerifier, LocalVerifier};
use crate::refunds::DecisionLocks;

pub const ADMIN_ROLE: &str = "admin";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub settings: Settings,
    /// Verifies tokens issued by [`login`].
    pub user_verifier: LocalVerifier,
    /// Verifies admin tokens; either local or backed by a remote key set.
    pub admin_verifier: Arc<dyn CredentialVerifier>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub refund_locks: DecisionLocks,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub admin_emails: Vec<String>,
    pub currency: String,
    /// Leading characters of an e-mail local part left readable in logs.
    pub email_visible: usize,
}

impl Settings {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email))
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let masked = obfuscate_email(&req.email, state.settings.email_visible);
    info!("Registering user {}", masked);

    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 50 {
        return Err(ApiError::BadRequest("Name must be between 1 and 50 characters".into()));
    }
    if !is_valid_email(&req.email) {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }

    let email = req.email.trim().to_string();
    let app = state.clone();
    let (user_name, user_email) = (name.clone(), email.clone());
    let registration = blocking(move || -> Result<Registration, ApiError> {
        // Argon2id, default parameters
        let password_hash = hash_password(&req.password)?;
        Ok(app.db.register_user(&user_name, &user_email, &password_hash)?)
    })
    .await?;

    let user_id = match registration {
        Registration::Created(id) => id,
        Registration::EmailTaken => return Err(ApiError::BadRequest("Email already registered".into())),
        Registration::UsernameTaken => return Err(ApiError::BadRequest("Username already taken".into())),
    };

    info!("Registered user {} as id {}", masked, user_id);
    Ok((
        StatusCode::CREATED,
        Json(UserView {
            id: user_id,
            name,
            email,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let masked = obfuscate_email(&req.email, state.settings.email_visible);
    info!("Login attempt for {}", masked);

    let app = state.clone();
    let user = blocking(move || -> Result<_, ApiError> {
        let Some(user) = app.db.get_user_by_email(req.email.trim())? else {
            return Ok(None);
        };
        let matches = verify_password(&req.password, &user.hashed_password)?;
        Ok(matches.then_some(user))
    })
    .await?
    .ok_or_else(|| {
        warn!("Rejected login for {}", masked);
        ApiError::InvalidCredentials
    })?;

    let roles = if state.settings.is_admin_email(&user.email) {
        vec![ADMIN_ROLE.to_string()]
    } else {
        Vec::new()
    };

    let token = create_token(
        &state.settings.jwt_secret,
        user.id,
        &user.email,
        roles,
        state.settings.token_ttl,
    )?;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "bearer".into(),
    }))
}

pub fn create_token(
    secret: &str,
    user_id: i64,
    email: &str,
    roles: Vec<String>,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        roles,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("password hashing failed: {}", e))
}

fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("stored hash is unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !email.chars().any(char::is_whitespace)
}
