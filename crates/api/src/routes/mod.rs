//! API routes

pub mod webhook;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook::webhook))
        .with_state(state)
}
