//! Failure paths: nothing is acknowledged, each failure is reported once.

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use group_ingest::bus::{Delivery, InMemoryBroker, TopicClient};
use group_ingest::consumer::{
    subscribe, DeliveryContext, ExceptionAction, ExceptionContext, FaultHandler,
    GroupIngestHandler, MessageHandler, ProcessingError,
};
use group_ingest::envelope::{Envelope, CONTENT_KIND};
use group_ingest::events::GroupCreated;
use group_ingest::producer::MessageService;
use group_ingest::store::InMemoryRecordStore;

use crate::support::{
    fast_options, producer, topic_client, wait_until, RecordingFaultHandler, TOPIC,
};

/// One delivery attempt per message, so an abandon dead-letters it.
fn single_attempt_broker() -> InMemoryBroker {
    InMemoryBroker::with_limits(Duration::from_secs(30), 1)
}

#[tokio::test]
async fn commit_failure_is_reported_once_and_never_acknowledged() {
    let broker = single_attempt_broker();
    let store = InMemoryRecordStore::new();
    store.fail_commits(true);
    let faults = RecordingFaultHandler::new();

    producer(&broker)
        .send(&GroupCreated::new("Surface", true))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("fault report", || faults.count() == 1).await;
    let stats = subscription.shutdown().await;

    assert!(broker.completed_lock_tokens(TOPIC).await.is_empty());
    assert!(broker.completed(TOPIC).await.is_empty());
    assert_eq!(broker.dead_lettered(TOPIC).await.len(), 1);
    assert!(store.groups().unwrap().is_empty());
    assert_eq!(store.commit_calls(), 1);

    let reported = faults.faults();
    assert_eq!(reported.len(), 1);
    let fault = &reported[0];
    assert!(fault.message.starts_with("persistence failed"), "{}", fault.message);
    assert_eq!(fault.context.action, ExceptionAction::UserCallback);
    assert_eq!(fault.context.entity_path, TOPIC);
    assert_eq!(fault.context.endpoint, "memory://pipeline-tests/");
    assert_eq!(fault.context.sequence_number, Some(1));

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn new_message_for_an_existing_group_is_reported_not_acknowledged() {
    let broker = single_attempt_broker();
    let store = InMemoryRecordStore::seeded();
    let faults = RecordingFaultHandler::new();

    producer(&broker)
        .send(&GroupCreated::new("Surface", false))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("fault report", || faults.count() == 1).await;
    let stats = subscription.shutdown().await;

    assert_eq!(store.commit_calls(), 1);
    assert!(broker.completed_lock_tokens(TOPIC).await.is_empty());
    assert_eq!(broker.dead_lettered(TOPIC).await.len(), 1);
    let reported = faults.faults();
    assert!(reported[0].message.contains("Surface"), "{}", reported[0].message);
    assert_eq!(reported[0].context.action, ExceptionAction::UserCallback);
    assert!(store.find_by_name("Surface").unwrap().unwrap().is_active);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn undecodable_payload_is_reported_and_not_persisted() {
    let broker = single_attempt_broker();
    let store = InMemoryRecordStore::new();
    let faults = RecordingFaultHandler::new();

    topic_client(&broker)
        .publish(Envelope::new("raw-1", CONTENT_KIND, b"not an envelope".to_vec()))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("fault report", || faults.count() == 1).await;
    let stats = subscription.shutdown().await;

    assert_eq!(store.add_calls(), 0);
    assert_eq!(store.commit_calls(), 0);
    assert!(broker.completed_lock_tokens(TOPIC).await.is_empty());
    assert_eq!(broker.dead_lettered(TOPIC).await.len(), 1);
    assert!(faults.faults()[0].message.starts_with("decode failed"));
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn blank_group_name_is_rejected() {
    let broker = single_attempt_broker();
    let store = InMemoryRecordStore::new();
    let faults = RecordingFaultHandler::new();

    producer(&broker)
        .send(&GroupCreated::new("   ", true))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("fault report", || faults.count() == 1).await;
    subscription.shutdown().await;

    assert_eq!(store.add_calls(), 0);
    assert!(faults.faults()[0].message.starts_with("rejected"));
    assert!(broker.completed(TOPIC).await.is_empty());
}

#[tokio::test]
async fn failed_message_is_redelivered_until_it_succeeds() {
    // Enough attempts that the message cannot be dead-lettered while failing.
    let broker = InMemoryBroker::with_limits(Duration::from_secs(30), 100_000);
    let store = InMemoryRecordStore::new();
    store.fail_commits(true);
    let faults = RecordingFaultHandler::new();

    producer(&broker)
        .send(&GroupCreated::new("Xbox", true))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("first failure", || faults.count() >= 1).await;
    store.fail_commits(false);
    wait_until("stored group", || {
        store.find_by_name("Xbox").unwrap().is_some()
    })
    .await;
    let stats = subscription.shutdown().await;

    assert_eq!(broker.completed_lock_tokens(TOPIC).await.len(), 1);
    assert!(broker.dead_lettered(TOPIC).await.is_empty());
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, faults.count());
}

/// Panics on its first invocation, completes afterwards.
struct PanicOnceHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl MessageHandler for PanicOnceHandler {
    async fn handle(
        &self,
        delivery: &Delivery,
        client: &TopicClient,
        _context: &DeliveryContext,
    ) -> Result<(), ProcessingError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("handler exploded");
        }
        client.complete(&delivery.lock_token).await?;
        Ok(())
    }
}

#[tokio::test]
async fn handler_panic_is_reported_and_pump_keeps_going() {
    let broker = InMemoryBroker::new();
    let faults = RecordingFaultHandler::new();
    let service = producer(&broker);
    service.send(&GroupCreated::new("Surface", true)).await.unwrap();
    service.send(&GroupCreated::new("Xbox", true)).await.unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(PanicOnceHandler {
            calls: AtomicUsize::new(0),
        }),
        faults.clone(),
        fast_options(),
    );

    wait_until("panic report", || faults.count() == 1).await;
    let mut completed = 0;
    for _ in 0..400 {
        completed = broker.completed(TOPIC).await.len();
        if completed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stats = subscription.shutdown().await;

    assert_eq!(completed, 1);
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 1);
    let fault = &faults.faults()[0];
    assert_eq!(fault.context.action, ExceptionAction::UserCallback);
    assert!(fault.message.contains("handler exploded"));
}

#[tokio::test]
async fn receive_failures_are_reported_and_retried() {
    let broker = InMemoryBroker::new();
    broker.refuse_connections(true);
    let store = InMemoryRecordStore::new();
    let faults = RecordingFaultHandler::new();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        faults.clone(),
        fast_options(),
    );

    wait_until("receive failure", || faults.count() >= 1).await;
    broker.refuse_connections(false);
    producer(&broker)
        .send(&GroupCreated::new("HoloLens", false))
        .await
        .unwrap();

    wait_until("stored group", || store.commit_calls() == 1).await;
    subscription.shutdown().await;

    assert!(store.find_by_name("HoloLens").unwrap().is_some());
    for fault in faults.faults() {
        assert_eq!(fault.context.action, ExceptionAction::Receive);
        assert_eq!(fault.context.sequence_number, None);
    }
}

/// Fails every delivery, but only after its lock has expired.
struct OutlivesLockHandler {
    hold: Duration,
}

#[async_trait]
impl MessageHandler for OutlivesLockHandler {
    async fn handle(
        &self,
        _delivery: &Delivery,
        _client: &TopicClient,
        _context: &DeliveryContext,
    ) -> Result<(), ProcessingError> {
        tokio::time::sleep(self.hold).await;
        Err(ProcessingError::Rejected("nope".into()))
    }
}

#[tokio::test]
async fn failed_abandon_is_reported() {
    let broker = InMemoryBroker::with_limits(Duration::from_millis(20), 1);
    let faults = RecordingFaultHandler::new();

    producer(&broker)
        .send(&GroupCreated::new("Surface", true))
        .await
        .unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(OutlivesLockHandler {
            hold: Duration::from_millis(60),
        }),
        faults.clone(),
        fast_options(),
    );

    wait_until("handler and abandon faults", || faults.count() == 2).await;
    let stats = subscription.shutdown().await;

    let reported = faults.faults();
    assert_eq!(reported[0].context.action, ExceptionAction::UserCallback);
    assert!(reported[0].message.starts_with("rejected"));
    assert_eq!(reported[1].context.action, ExceptionAction::Abandon);
    assert_eq!(reported[1].context.sequence_number, Some(1));
    assert!(reported[1].message.contains("was lost"), "{}", reported[1].message);
    assert!(broker.completed_lock_tokens(TOPIC).await.is_empty());
    assert_eq!(stats.failed, 1);
}

/// A fault handler that always panics.
struct ExplodingFaultHandler;

impl FaultHandler for ExplodingFaultHandler {
    fn on_exception(&self, _error: &(dyn Error + Send + Sync + 'static), _context: &ExceptionContext) {
        panic!("fault handler exploded");
    }
}

#[tokio::test]
async fn panicking_fault_handler_does_not_stop_the_pump() {
    let broker = single_attempt_broker();
    let store = InMemoryRecordStore::new();
    let service = producer(&broker);
    service.send(&GroupCreated::new("", true)).await.unwrap();
    service.send(&GroupCreated::new("Surface", true)).await.unwrap();

    let subscription = subscribe(
        topic_client(&broker),
        Arc::new(GroupIngestHandler::new(store.clone())),
        Arc::new(ExplodingFaultHandler),
        fast_options(),
    );

    wait_until("stored group", || store.commit_calls() == 1).await;
    let stats = subscription.shutdown().await;

    assert!(store.find_by_name("Surface").unwrap().is_some());
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}
