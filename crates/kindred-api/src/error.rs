use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use kindred_core::{CampaignError, ErrorClass, GatewayError, RefundError};
use kindred_types::api::ErrorBody;

use crate::middleware::AuthError;

const INTERNAL_DETAIL: &str = "Internal server error";

/// Every failure a handler can return. Converts into a `{detail, code}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error(transparent)]
    Refund(#[from] RefundError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unable to process payment with the payment provider")]
    Gateway(#[source] GatewayError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Campaign(e) => (class_status(e.class()), e.code()),
            Self::Refund(e) => (class_status(e.class()), e.code()),
            Self::Auth(e) => (e.status(), e.code()),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_FAILURE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

fn class_status(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Gateway => StatusCode::BAD_GATEWAY,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{} {}: {:?}", status.as_u16(), code, self);
            INTERNAL_DETAIL.to_string()
        } else {
            if status.is_server_error() {
                error!("{} {}: {:?}", status.as_u16(), code, self);
            } else {
                warn!("{} {}: {}", status.as_u16(), code, self);
            }
            self.to_string()
        };

        let mut response = (status, Json(ErrorBody { detail, code: code.to_string() })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
