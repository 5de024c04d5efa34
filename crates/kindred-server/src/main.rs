mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use kindred_api::auth::{AppState, AppStateInner};
use kindred_api::middleware::{CredentialVerifier, JwksVerifier, LocalVerifier};
use kindred_api::paypal::PayPalClient;
use kindred_api::refunds::DecisionLocks;
use kindred_api::routes::build_router;
use kindred_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Fix your environment or .env file and restart.");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .init();

    info!("Starting in {:?} mode", config.env_state);
    if config.using_dev_secret {
        warn!("SECRET_KEY is unset; using the development placeholder");
    }

    // Init database
    let db = if config.database_path.as_os_str() == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(&config.database_path)?
    };

    let admin_verifier: Arc<dyn CredentialVerifier> = match (&config.kc_certs_url, &config.kc_client_id) {
        (Some(certs_url), Some(client_id)) => {
            info!("Admin tokens verified against {}", certs_url);
            Arc::new(
                JwksVerifier::new(certs_url.clone(), client_id.clone(), config.jwks_ttl)
                    .with_min_refresh(config.jwks_min_refresh),
            )
        }
        _ => {
            warn!("KC_CERTS_URL/KC_CLIENT_ID not set; admin routes accept locally issued tokens");
            Arc::new(LocalVerifier::new(&config.secret_key))
        }
    };

    if config.paypal.client_id.is_none() || config.paypal.secret.is_none() {
        warn!("PayPal credentials not set; payments and refund approvals will fail");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        settings: config.api_settings(),
        user_verifier: LocalVerifier::new(&config.secret_key),
        admin_verifier,
        gateway: Arc::new(PayPalClient::new(config.paypal.clone())),
        refund_locks: DecisionLocks::default(),
    });

    let app = build_router(state, &config.http_settings());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Kindred server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
