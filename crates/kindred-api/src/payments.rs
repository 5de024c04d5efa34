use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use tracing::{error, info};

use kindred_core::PaymentGateway;
use kindred_types::api::{PaymentRequest, PaymentResponse};
use kindred_types::models::{PaymentStatus, fits_minor_units};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::middleware::{AuthError, Caller};

/// Create a payment with the provider and record it for the caller. Nothing
/// is stored when the provider call itself fails.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller.user_id.ok_or(AuthError::InvalidToken)?;

    if req.amount <= Decimal::ZERO {
        return Err(ApiError::BadRequest("Payment amount must be greater than zero".into()));
    }
    if !fits_minor_units(req.amount) {
        return Err(ApiError::BadRequest(
            "Payment amount must have at most two decimal places".into(),
        ));
    }
    let method = req.payment_method.trim().to_string();
    if method.is_empty() {
        return Err(ApiError::BadRequest("Payment method is required".into()));
    }

    let currency = state.settings.currency.clone();
    info!("User {} paying {} {} via {}", user_id, req.amount, currency, method);

    let created = state
        .gateway
        .create_payment(&method, req.amount, &currency)
        .await
        .map_err(|e| {
            error!("Payment creation failed for user {}: {}", user_id, e);
            ApiError::Gateway(e)
        })?;

    let status = if created.succeeded() {
        PaymentStatus::Success
    } else {
        PaymentStatus::Failed
    };
    let redirect_url = created.approval_url().map(str::to_string);

    let amount = req.amount;
    let payment = blocking(move || {
        state
            .db
            .insert_payment(user_id, amount, status, &method, &created.id)
    })
    .await?;

    info!("Payment {} recorded as {}", payment.id, payment.status.as_str());
    Ok((StatusCode::CREATED, Json(PaymentResponse::new(payment, redirect_url))))
}

/// The caller's own payments, oldest first.
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let user_id = caller.user_id.ok_or(AuthError::InvalidToken)?;
    let payments = blocking(move || state.db.get_payments_for_user(user_id)).await?;
    Ok(Json(
        payments
            .into_iter()
            .map(|p| PaymentResponse::new(p, None))
            .collect(),
    ))
}
