//! REST API endpoints
//!
//! - `POST /api/people`: add a person (and its outbox event) atomically
//! - `GET /api/people`: all people, newest first
//! - `GET /api/outbox`: latest outbox events
//! - `GET /api/processed`: latest processed-log entries

mod error;
mod handlers;

pub use error::ApiError;

use axum::{routing::get, Router};
use outbox_relay_domain::outbox::{OutboxStore, TransactionalWriter};
use outbox_relay_domain::processing::ProcessedLog;
use std::sync::Arc;

/// Handles shared by the API handlers
#[derive(Clone)]
pub struct ApiState {
    pub writer: Arc<dyn TransactionalWriter>,
    pub store: Arc<dyn OutboxStore>,
    pub processed: Arc<dyn ProcessedLog>,
}

impl ApiState {
    pub fn new(
        writer: Arc<dyn TransactionalWriter>,
        store: Arc<dyn OutboxStore>,
        processed: Arc<dyn ProcessedLog>,
    ) -> Self {
        Self {
            writer,
            store,
            processed,
        }
    }
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/api/people",
            get(handlers::list_people).post(handlers::add_person),
        )
        .route("/api/outbox", get(handlers::list_outbox))
        .route("/api/processed", get(handlers::list_processed))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
