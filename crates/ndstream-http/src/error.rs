//! HTTP mapping for codec errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ndstream_core::NdjsonError;
use tracing::warn;

/// Error body, shaped like the rest of our JSON APIs.
#[derive(serde::Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// An [`NdjsonError`] turned into an HTTP response.
#[derive(Debug)]
pub struct NdjsonRejection(pub NdjsonError);

impl NdjsonRejection {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }

    pub fn into_inner(self) -> NdjsonError {
        self.0
    }
}

impl From<NdjsonError> for NdjsonRejection {
    fn from(err: NdjsonError) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for NdjsonRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for NdjsonRejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Status code for a codec error.
pub fn status_for(err: &NdjsonError) -> StatusCode {
    match err {
        NdjsonError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
        NdjsonError::UnsupportedMediaType(_) | NdjsonError::UnsupportedCharset(_) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        NdjsonError::Decode { .. } | NdjsonError::LineTooLong { .. } => StatusCode::BAD_REQUEST,
        NdjsonError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for NdjsonRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "ndjson request failed");
        }
        (
            status,
            Json(ErrorBody {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
