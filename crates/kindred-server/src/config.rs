use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use kindred_api::auth::Settings;
use kindred_api::middleware::DEFAULT_MIN_REFRESH;
use kindred_api::paypal::{PayPalConfig, SANDBOX_URL};
use kindred_api::routes::HttpSettings;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEV_SECRET: &str = "dev-secret-change-me";

const DEFAULT_CORS_ORIGINS: &str = "http://127.0.0.1:3000,http://127.0.0.1:8000";

/// Provider redirects land on pages under `frontend/`, served at `/static`.
const DEFAULT_RETURN_URL: &str = "http://127.0.0.1:8000/static/payment-success.html";
const DEFAULT_CANCEL_URL: &str = "http://127.0.0.1:8000/static/payment-cancel.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Dev,
    Test,
    Prod,
}

impl EnvState {
    /// Prefix checked before the bare variable name.
    fn prefix(self) -> &'static str {
        match self {
            Self::Dev => "DEV_",
            Self::Test => "TEST_",
            Self::Prod => "PROD_",
        }
    }
}

impl FromStr for EnvState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            other => bail!("ENV_STATE must be dev, test or prod, got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub env_state: EnvState,
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub secret_key: String,
    /// Set when no secret was configured and the dev fallback is in use.
    pub using_dev_secret: bool,
    pub token_ttl_minutes: i64,
    pub admin_emails: Vec<String>,
    pub kc_client_id: Option<String>,
    pub kc_certs_url: Option<String>,
    pub jwks_ttl: Duration,
    /// Minimum gap between key set refreshes triggered by an unknown `kid`.
    pub jwks_min_refresh: Duration,
    pub paypal: PayPalConfig,
    pub currency: String,
    pub cors_origins: Vec<String>,
    pub frontend_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Each setting is read from
    /// `<PREFIX>NAME` first, then `NAME`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_state: EnvState = match lookup("ENV_STATE") {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => EnvState::Dev,
        };
        let prefix = env_state.prefix();
        let get = |key: &str| {
            lookup(&format!("{}{}", prefix, key))
                .or_else(|| lookup(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (secret_key, using_dev_secret) = match get("SECRET_KEY") {
            Some(secret) if env_state != EnvState::Dev && PLACEHOLDER_SECRETS.contains(&secret.as_str()) => {
                bail!("SECRET_KEY is still a placeholder; set a real secret for {:?}", env_state)
            }
            Some(secret) => (secret, false),
            None if env_state == EnvState::Dev => (DEV_SECRET.to_string(), true),
            None => bail!("SECRET_KEY is unset; it is required outside dev"),
        };

        let default_db = match env_state {
            EnvState::Test => "test.db",
            _ => "kindred.db",
        };

        let paypal = PayPalConfig {
            base_url: get("PAYPAL_BASE_URL").unwrap_or_else(|| SANDBOX_URL.into()),
            client_id: get("PAYPAL_CLIENT_ID"),
            secret: get("PAYPAL_SECRET"),
            return_url: get("PAYPAL_RETURN_URL").unwrap_or_else(|| DEFAULT_RETURN_URL.into()),
            cancel_url: get("PAYPAL_CANCEL_URL").unwrap_or_else(|| DEFAULT_CANCEL_URL.into()),
        };

        Ok(Self {
            env_state,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("PORT"), "PORT", 8000)?,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| default_db.into()).into(),
            secret_key,
            using_dev_secret,
            token_ttl_minutes: parse_or(get("TOKEN_TTL_MINUTES"), "TOKEN_TTL_MINUTES", 15)?,
            admin_emails: split_list(get("ADMIN_EMAILS").as_deref().unwrap_or("")),
            kc_client_id: get("KC_CLIENT_ID"),
            kc_certs_url: get("KC_CERTS_URL"),
            jwks_ttl: Duration::from_secs(parse_or(get("JWKS_TTL_SECS"), "JWKS_TTL_SECS", 300)?),
            jwks_min_refresh: Duration::from_secs(parse_or(
                get("JWKS_MIN_REFRESH_SECS"),
                "JWKS_MIN_REFRESH_SECS",
                DEFAULT_MIN_REFRESH.as_secs(),
            )?),
            paypal,
            currency: get("PAYMENT_CURRENCY").unwrap_or_else(|| "GBP".into()),
            cors_origins: split_list(get("CORS_ORIGINS").as_deref().unwrap_or(DEFAULT_CORS_ORIGINS)),
            frontend_dir: get("FRONTEND_DIR").unwrap_or_else(|| "frontend".into()).into(),
        })
    }

    pub fn default_log_filter(&self) -> &'static str {
        match self.env_state {
            EnvState::Dev => "kindred=debug,tower_http=debug",
            _ => "info",
        }
    }

    pub fn api_settings(&self) -> Settings {
        Settings {
            jwt_secret: self.secret_key.clone(),
            token_ttl: chrono::Duration::minutes(self.token_ttl_minutes),
            admin_emails: self.admin_emails.clone(),
            currency: self.currency.clone(),
            email_visible: if self.env_state == EnvState::Dev { 2 } else { 0 },
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            cors_origins: self.cors_origins.clone(),
            frontend_dir: self.frontend_dir.clone(),
            request_id_len: if self.env_state == EnvState::Dev { 8 } else { 32 },
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.parse().with_context(|| format!("{} has an invalid value '{}'", key, v)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
