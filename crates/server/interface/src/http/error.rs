use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use outbox_relay_domain::outbox::WriteError;
use outbox_relay_domain::people::PersonValidationError;
use serde_json::json;
use tracing::error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected input, answered with 400
    #[error("Invalid person: {0}")]
    Validation(#[from] PersonValidationError),

    /// Store or log failure, answered with 500 and a fixed message
    #[error("{message}: {source}")]
    Internal {
        message: &'static str,
        #[source]
        source: BoxError,
    },
}

impl ApiError {
    /// Map an error into a 500 carrying `message` as the public body.
    pub fn internal<E>(message: &'static str) -> impl FnOnce(E) -> Self
    where
        E: Into<BoxError>,
    {
        move |source| ApiError::Internal {
            message,
            source: source.into(),
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Invalid(invalid) => ApiError::Validation(invalid),
            other => ApiError::internal("Failed to add person")(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(invalid) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": invalid.to_string() })),
            )
                .into_response(),
            ApiError::Internal { message, source } => {
                error!(error = %source, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
