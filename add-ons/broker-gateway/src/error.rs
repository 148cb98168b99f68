//! Maps [`CorrelatedError`] onto the OSB JSON error body and HTTP status (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::CorrelatedError;
use serde::Serialize;

#[derive(Serialize)]
struct OsbErrorBody {
    error: &'static str,
    description: String,
}

pub struct HttpError(pub CorrelatedError);

impl From<CorrelatedError> for HttpError {
    fn from(e: CorrelatedError) -> Self {
        HttpError(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = OsbErrorBody { error: self.0.key, description: self.0.message };
        (status, Json(body)).into_response()
    }
}
