//! HTTP host: group submission endpoint, SPA shell, and error middleware.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /api/groups`: publish `GroupCreated`. Body = `{ "name", "isActive" }`, returns 202.
//! - `GET /health`: `{ "ok": true, "environment": ... }`.
//! - anything else: the SPA's `index.html`.
//!
//! ## Errors
//!
//! Handlers return [`WebError`]. Its response carries an [`UnhandledError`]
//! extension instead of a body; [`retry_default_page`] may turn a missing
//! default page into a redirect, and [`render_unhandled_errors`] renders
//! whatever is left as JSON.

mod environment;
mod error;
mod exception;
mod retry;
mod routes;

pub use environment::HostEnvironment;
pub use error::{ErrorKind, UnhandledError, WebError};
pub use exception::render_unhandled_errors;
pub use retry::{retry_default_page, MAX_RETRIES, RETRY_DELAY, RETRY_KEY};
pub use routes::{router, AppState, CreateGroupRequest};

/// Serve the router at the given address until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "HTTP host listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
