use std::backtrace::Backtrace;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::producer::SendError;

/// Broad class of an unhandled error, used by middleware to pick a recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The SPA shell has not been built or deployed yet. Usually transient.
    DefaultPageNotReady,
    BadRequest,
    Publish,
    /// Raised with an explicit status code.
    Declared,
}

/// Errors raised by HTTP stages.
///
/// Converting one into a response does not render a body. The status is set
/// and an [`UnhandledError`] extension is attached for the outer middleware
/// to retry or render.
#[derive(Debug, Error)]
pub enum WebError {
    #[error(
        "The SPA default page middleware could not return the default page '{path}' because it was not found"
    )]
    DefaultPageNotReady { path: String },
    #[error("{0}")]
    BadRequest(String),
    #[error("failed to publish message: {0}")]
    Publish(#[from] SendError),
    #[error("{message}")]
    Declared { status: StatusCode, message: String },
}

impl WebError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebError::DefaultPageNotReady { .. } => ErrorKind::DefaultPageNotReady,
            WebError::BadRequest(_) => ErrorKind::BadRequest,
            WebError::Publish(_) => ErrorKind::Publish,
            WebError::Declared { .. } => ErrorKind::Declared,
        }
    }

    /// The declared status code, or 500 when the error does not carry one.
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Declared { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Response extension describing an error no stage has handled yet.
#[derive(Debug, Clone)]
pub struct UnhandledError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub message: String,
    /// Captured for server errors only, subject to `RUST_BACKTRACE`.
    /// Symbols are resolved when the trace is rendered.
    pub stack_trace: Option<Arc<Backtrace>>,
}

impl UnhandledError {
    /// The stack trace as text, empty when none was captured.
    pub fn stack_trace_text(&self) -> String {
        self.stack_trace
            .as_ref()
            .map(|trace| trace.to_string())
            .unwrap_or_default()
    }
}

impl From<&WebError> for UnhandledError {
    fn from(err: &WebError) -> Self {
        let status = err.status();
        Self {
            kind: err.kind(),
            status,
            message: err.to_string(),
            stack_trace: status
                .is_server_error()
                .then(|| Arc::new(Backtrace::capture())),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let unhandled = UnhandledError::from(&self);
        let mut response = unhandled.status.into_response();
        response.extensions_mut().insert(unhandled);
        response
    }
}
