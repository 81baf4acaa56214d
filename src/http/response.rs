//! Error responses.
//!
//! Every failure leaves the service as `{"detail": "..."}` with a non-2xx
//! status. Handler faults (500s) also attach a [`HandlerFault`] extension so
//! the observability middleware can put the error on the request's complete
//! log and server span.

use std::any::Any;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::datastore::ProbeError;
use crate::observability::ErrorInfo;
use crate::upstream::UpstreamError;

/// Error details of a request that ended in a handler fault.
#[derive(Debug, Clone)]
pub struct HandlerFault(pub ErrorInfo);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("{store} error: {source}")]
    Datastore {
        store: &'static str,
        #[source]
        source: ProbeError,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Upstream(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Datastore { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProbeError> for ApiError {
    fn from(source: ProbeError) -> Self {
        ApiError::Datastore {
            store: source.store(),
            source,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(json!({ "detail": self.to_string() }))).into_response();
        if status.is_server_error() && !matches!(self, ApiError::Upstream(_)) {
            response
                .extensions_mut()
                .insert(HandlerFault(ErrorInfo::from_error(&self)));
        }
        response
    }
}

/// Converts a caught panic into a 500. Used with `CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    let fault = ErrorInfo::new(
        "panic",
        message.clone(),
        std::backtrace::Backtrace::capture().to_string(),
    );
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        json!({ "detail": format!("Internal server error: {message}") }).to_string(),
    )
        .into_response();
    response.extensions_mut().insert(HandlerFault(fault));
    response
}
