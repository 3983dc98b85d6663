use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get as get_route;
use axum::Router;

use group_ingest::web::{render_unhandled_errors, HostEnvironment, WebError};

use crate::support::{app, get, json_body};

fn declared_error_app(environment: HostEnvironment) -> Router {
    Router::new()
        .route(
            "/conflict",
            get_route(|| async {
                Err::<(), _>(WebError::Declared {
                    status: StatusCode::CONFLICT,
                    message: "group already exists".into(),
                })
            }),
        )
        .route(
            "/bad",
            get_route(|| async { Err::<(), _>(WebError::BadRequest("name is required".into())) }),
        )
        .route("/fine", get_route(|| async { "fine" }))
        .layer(middleware::from_fn_with_state(
            environment,
            render_unhandled_errors,
        ))
}

#[tokio::test]
async fn development_body_has_message_and_stack_trace() {
    let response = get(app(HostEnvironment::parse("Development")), "/?retry-count=3").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let fields = body.as_object().unwrap();
    assert_eq!(fields.len(), 2);
    assert!(fields["message"].is_string());
    assert!(fields["stackTrace"].is_string());
}

#[tokio::test]
async fn production_body_has_only_the_message() {
    let response = get(app(HostEnvironment::parse("Production")), "/?retry-count=3").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    let fields = body.as_object().unwrap();
    assert_eq!(fields.len(), 1);
    assert!(fields["message"].is_string());
}

#[tokio::test]
async fn declared_status_code_is_kept() {
    let response = get(declared_error_app(HostEnvironment::Production), "/conflict").await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["message"], "group already exists");
    assert!(body.get("stackTrace").is_none());
}

#[tokio::test]
async fn client_errors_render_without_a_stack_trace() {
    let response = get(declared_error_app(HostEnvironment::Development), "/bad").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "name is required");
    assert_eq!(body["stackTrace"], "");
}

#[tokio::test]
async fn successful_responses_pass_through() {
    let response = get(declared_error_app(HostEnvironment::Development), "/fine").await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"fine");
}
