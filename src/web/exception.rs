use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use super::environment::HostEnvironment;
use super::error::UnhandledError;

/// Outermost middleware: turn an [`UnhandledError`] into a JSON body.
///
/// The status is the error's declared status (500 when none). The stack
/// trace is included only where the environment exposes error details.
pub async fn render_unhandled_errors(
    State(environment): State<HostEnvironment>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(unhandled) = response.extensions_mut().remove::<UnhandledError>() else {
        return response;
    };

    error!(
        status = unhandled.status.as_u16(),
        kind = ?unhandled.kind,
        message = %unhandled.message,
        "Unhandled error"
    );

    let body = if environment.exposes_error_details() {
        json!({ "message": unhandled.message, "stackTrace": unhandled.stack_trace_text() })
    } else {
        json!({ "message": unhandled.message })
    };
    (unhandled.status, Json(body)).into_response()
}
