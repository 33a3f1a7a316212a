//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use linkguard_billing::BillingError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The notification could not be authenticated; Stripe shows the body in its dashboard
    #[error("Webhook Error: {0}")]
    Webhook(#[from] BillingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Webhook(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
