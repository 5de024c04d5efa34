pub mod auth;
pub mod campaigns;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod paypal;
pub mod refunds;
pub mod routes;

use anyhow::anyhow;
use tracing::error;

use crate::error::ApiError;

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed: {}", e))
        })?
        .map_err(Into::into)
}
