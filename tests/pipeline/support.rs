//! Shared fixtures for pipeline tests.

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use group_ingest::bus::{InMemoryBroker, TopicClient, TopicSettings};
use group_ingest::consumer::{ConsumerOptions, ExceptionContext, FaultHandler};
use group_ingest::producer::TopicEventService;

pub const TOPIC: &str = "groups";
pub const CONNECTION_STRING: &str = "Endpoint=memory://pipeline-tests/;SharedAccessKeyName=test";

pub fn topic_client(broker: &InMemoryBroker) -> Arc<TopicClient> {
    Arc::new(TopicClient::new(
        TopicSettings::new(CONNECTION_STRING, TOPIC),
        Arc::new(broker.clone()),
    ))
}

pub fn producer(broker: &InMemoryBroker) -> TopicEventService {
    TopicEventService::new(topic_client(broker))
}

/// Short waits so tests don't idle on an empty topic.
pub fn fast_options() -> ConsumerOptions {
    ConsumerOptions::default()
        .with_receive_wait(Duration::from_millis(20))
        .with_receive_backoff(Duration::from_millis(10))
}

/// A reported fault, flattened for assertions.
#[derive(Debug, Clone)]
pub struct Fault {
    pub message: String,
    pub context: ExceptionContext,
}

/// Records every fault it is handed.
#[derive(Default)]
pub struct RecordingFaultHandler {
    faults: Mutex<Vec<Fault>>,
}

impl RecordingFaultHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.faults.lock().unwrap().len()
    }
}

impl FaultHandler for RecordingFaultHandler {
    fn on_exception(&self, error: &(dyn Error + Send + Sync + 'static), context: &ExceptionContext) {
        self.faults.lock().unwrap().push(Fault {
            message: error.to_string(),
            context: context.clone(),
        });
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
