use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use kindred_core::RefundError;
use kindred_core::refund::{self, Decision};
use kindred_types::api::{DecisionQuery, RefundApplication, RefundOutcome, RefundQuery};
use kindred_types::models::RefundRequest;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::{AuthError, Caller};

/// One async lock per refund id. A decision holds its refund's lock from
/// review until the outcome is written, so concurrent approvals of the same
/// request reach the provider once.
#[derive(Default)]
pub struct DecisionLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl DecisionLocks {
    pub async fn acquire(&self, refund_id: i64) -> Result<OwnedMutexGuard<()>, ApiError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| anyhow!("refund lock table poisoned: {}", e))?;
            // Entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(refund_id).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }
}

pub async fn request_refund(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RefundApplication>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller.user_id.ok_or(AuthError::InvalidToken)?;

    let refund = blocking(move || {
        state
            .db
            .transaction(|s| refund::request(s, user_id, req.payment_id, req.amount))
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RefundOutcome {
            message: "Refund request submitted successfully, awaiting admin approval.".into(),
            refund,
        }),
    ))
}

/// Approve or reject a pending refund. Approval refunds through the provider
/// before anything is written; a provider failure leaves the request pending.
/// Decisions on the same refund are serialized by [`DecisionLocks`].
pub async fn manage_refund(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(refund_id): Path<i64>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<RefundOutcome>, ApiError> {
    info!("Admin {} deciding refund {}: {}", caller.subject, refund_id, query.decision);

    let _decision_guard = state.refund_locks.acquire(refund_id).await?;
    debug!("Holding decision lock for refund {}", refund_id);

    let app = state.clone();
    let review = blocking(move || app.db.transaction(|s| refund::review(s, refund_id, &query.decision))).await?;

    refund::execute(state.gateway.as_ref(), &state.settings.currency, &review).await?;

    let decision = review.decision;
    let app = state.clone();
    let refund = blocking(move || app.db.transaction(|s| refund::settle(s, refund_id, decision)))
        .await
        .inspect_err(|e| {
            if decision == Decision::Approve && matches!(e, ApiError::Refund(RefundError::AlreadyProcessed(_))) {
                error!(
                    "Refund {} was paid out by the provider but settled concurrently elsewhere",
                    refund_id
                );
            }
        })?;

    let message = match decision {
        Decision::Approve => "Refund approved and processed successfully.",
        Decision::Reject => "Refund request has been rejected.",
    };

    Ok(Json(RefundOutcome {
        message: message.into(),
        refund,
    }))
}

pub async fn list_refunds(
    State(state): State<AppState>,
    Query(query): Query<RefundQuery>,
) -> Result<Json<Vec<RefundRequest>>, ApiError> {
    let refunds = blocking(move || state.db.with_store(|s| refund::list(s, query.status))).await?;
    Ok(Json(refunds))
}
