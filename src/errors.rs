// Error taxonomy shared by the store gateway, service clients and HTTP
// adapters. Adapters classify by the outermost kind; the wrapped anyhow
// cause is only ever logged, never echoed to clients.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Reason strings surfaced inside validation payloads.
pub const REASON_INVALID: &str = "invalid";
pub const REASON_TAKEN: &str = "taken";
pub const REASON_NOT_EXISTS: &str = "not_exists";

/// Field-to-reason mapping returned with a 400 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    pub fn single(field: &str, reason: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), reason.to_string());
        ValidationErrors(fields)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request")]
    Invalid(ValidationErrors),
    #[error("not found")]
    NotFound,
    #[error("already taken")]
    Taken,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn internal<E>(err: E, context: &'static str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Internal(anyhow::Error::new(err).context(context))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(fields) => (StatusCode::BAD_REQUEST, Json(fields)).into_response(),
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            // bot creation rewrites Taken into a field payload before it
            // gets here
            ApiError::Taken => (
                StatusCode::BAD_REQUEST,
                Json(ValidationErrors::single("resource", REASON_TAKEN)),
            )
                .into_response(),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Internal(cause) => {
                tracing::error!(error = %format!("{cause:#}"), "internal error");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
