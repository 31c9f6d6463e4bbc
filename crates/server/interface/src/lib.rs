//! Outbox Relay - Interface Layer
//!
//! HTTP surface over the transactional writer, the outbox store and the
//! processed log.

pub mod http;

pub use http::{api_router, ApiState};
