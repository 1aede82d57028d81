use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use folio_market_data::FetchResult;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
///
/// Bodies carry a stable code only; upstream provider messages stay in the
/// logs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("every provider is rate limited")]
    RateLimited,
    #[error("no provider could serve the request")]
    Unavailable,
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ApiError {
    /// The error for a result that carries no data.
    pub fn for_empty<T>(result: &FetchResult<T>) -> Self {
        if result.rate_limited() {
            ApiError::RateLimited
        } else {
            ApiError::Unavailable
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RateLimited => "rate_limited",
            ApiError::Unavailable => "unavailable",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(reason) => Some(reason.clone()),
            _ => None,
        };
        let body = Json(ErrorBody {
            error: self.code(),
            message,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
