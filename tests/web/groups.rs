use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use group_ingest::bus::{InMemoryBroker, TopicClient, TopicSettings};
use group_ingest::envelope;
use group_ingest::events::GroupCreated;
use group_ingest::producer::TopicEventService;
use group_ingest::web::HostEnvironment;

use crate::support::{app_with, get, json_body, post_json, RecordingMessageService};

#[tokio::test]
async fn posted_group_is_sent_to_the_message_service() {
    let messages = Arc::new(RecordingMessageService::default());
    let app = app_with(messages.clone(), HostEnvironment::Production);

    let response = post_json(app, "/api/groups", r#"{"name":"Surface","isActive":true}"#).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(messages.sent(), vec![GroupCreated::new("Surface", true)]);
}

#[tokio::test]
async fn is_active_defaults_to_true() {
    let messages = Arc::new(RecordingMessageService::default());
    let app = app_with(messages.clone(), HostEnvironment::Production);

    let response = post_json(app, "/api/groups", r#"{"name":"Xbox"}"#).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(messages.sent(), vec![GroupCreated::new("Xbox", true)]);
}

#[tokio::test]
async fn posted_group_lands_on_the_topic() {
    let broker = InMemoryBroker::new();
    let client = Arc::new(TopicClient::new(
        TopicSettings::new("memory://web-tests", "groups"),
        Arc::new(broker.clone()),
    ));
    let app = app_with(
        Arc::new(TopicEventService::new(client.clone())),
        HostEnvironment::Production,
    );

    let response = post_json(app, "/api/groups", r#"{"name":"HoloLens","isActive":false}"#).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delivery = client.receive(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(delivery.envelope.message_type(), Some("GroupCreated"));
    let event: GroupCreated = envelope::decode(&delivery.envelope).unwrap();
    assert_eq!(event, GroupCreated::new("HoloLens", false));
}

#[tokio::test]
async fn publish_failure_is_a_server_error() {
    let broker = InMemoryBroker::new();
    broker.reject_sends(true);
    let client = Arc::new(TopicClient::new(
        TopicSettings::new("memory://web-tests", "groups"),
        Arc::new(broker.clone()),
    ));
    let app = app_with(
        Arc::new(TopicEventService::new(client)),
        HostEnvironment::Production,
    );

    let response = post_json(app, "/api/groups", r#"{"name":"Surface"}"#).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("failed to publish message"));
    assert_eq!(broker.pending("groups").await, 0);
}

#[tokio::test]
async fn health_reports_environment() {
    let app = app_with(
        Arc::new(RecordingMessageService::default()),
        HostEnvironment::parse("development"),
    );

    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["environment"], "Development");
}
