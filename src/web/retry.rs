//! Redirect-based retry for a SPA shell that is not ready yet.
//!
//! While the front-end build is still being produced the default page is
//! missing and the fallback stage fails with
//! [`ErrorKind::DefaultPageNotReady`]. Instead of surfacing a 500 straight
//! away, the client is redirected back to the same URL with a `retry-count`
//! query parameter, up to [`MAX_RETRIES`] times, one [`RETRY_DELAY`] apart.

use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use super::error::{ErrorKind, UnhandledError};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_KEY: &str = "retry-count";
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Middleware: retry by redirect when the default page is not ready.
///
/// Any other response, including the transient failure once the bound is
/// reached, is returned unchanged.
pub async fn retry_default_page(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_owned);

    let response = next.run(request).await;

    let transient = response
        .extensions()
        .get::<UnhandledError>()
        .is_some_and(|e| e.kind == ErrorKind::DefaultPageNotReady);
    if !transient {
        return response;
    }

    let pairs = parse_query(query.as_deref());
    let attempt = retry_count(&pairs);
    if attempt >= MAX_RETRIES {
        warn!(path = %path, attempt, "Default page still not ready, giving up");
        return response;
    }

    tokio::time::sleep(RETRY_DELAY).await;

    let location = retry_location(&path, pairs, attempt + 1);
    info!(location = %location, attempt = attempt + 1, "Default page not ready, redirecting");
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default()
}

/// Current attempt number. Missing or unparseable values count as zero.
fn retry_count(pairs: &[(String, String)]) -> u32 {
    pairs
        .iter()
        .find(|(key, _)| key == RETRY_KEY)
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

/// Same path and query, with `retry-count` set to `attempt`.
fn retry_location(path: &str, mut pairs: Vec<(String, String)>, attempt: u32) -> String {
    pairs.retain(|(key, _)| key != RETRY_KEY);
    pairs.push((RETRY_KEY.to_string(), attempt.to_string()));
    match serde_urlencoded::to_string(&pairs) {
        Ok(query) => format!("{path}?{query}"),
        Err(_) => format!("{path}?{RETRY_KEY}={attempt}"),
    }
}
