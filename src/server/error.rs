use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_typed_multipart::TypedMultipartError;

use super::types::ErrorResponse;
use crate::error::DetectError;
use crate::media::ValidationError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API error: 400 for rejected uploads, 500 for everything else.
pub struct AppError(pub DetectError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorResponse {
            error: self.0.title().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<DetectError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// A form the multipart extractor could not read. Bodies cut off by the
/// transport limit report `413` from the extractor.
pub fn form_error(err: TypedMultipartError, limit: usize) -> ValidationError {
    if err.get_status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::BodyTooLarge { limit }
    } else {
        ValidationError::MalformedForm(err.to_string())
    }
}

/// Rewrite the plain-text `413` of the body limit layer as a JSON `400`.
pub async fn body_too_large(State(limit): State<usize>, res: Response) -> Response {
    if res.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return res;
    }
    AppError::from(ValidationError::BodyTooLarge { limit }).into_response()
}
