// =============================================================================
// Query errors — rendered as structured JSON bodies
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::types::IndicatorName;

#[derive(Debug, Error)]
pub enum QueryError {
    /// `n` was zero, negative or not an integer.
    #[error("plz provide n>0")]
    InvalidN,

    #[error("unknown indicator '{0}', choose from: {choices}", choices = IndicatorName::choices())]
    UnknownIndicator(String),

    /// Snapshot missing or unreadable. The cause is logged, never returned.
    #[error("snapshot not available")]
    SnapshotUnavailable,
}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidN | Self::UnknownIndicator(_) => StatusCode::BAD_REQUEST,
            Self::SnapshotUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::InvalidN | Self::UnknownIndicator(_) => {
                serde_json::json!({ "query value error": self.to_string() })
            }
            Self::SnapshotUnavailable => serde_json::json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}
