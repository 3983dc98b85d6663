//! Message pump: bounded-concurrency receive loop with drain-on-shutdown.

use std::any::Any;
use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fault::{ExceptionAction, ExceptionContext, FaultHandler};
use super::handler::{DeliveryContext, MessageHandler, ProcessingError};
use super::options::ConsumerOptions;
use crate::bus::{Delivery, TopicClient, TransportError};

/// Counters collected while the pump runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    /// Deliveries received from the broker.
    pub received: usize,
    /// Deliveries processed and completed.
    pub completed: usize,
    /// Deliveries whose processing failed (decode, validation, persistence).
    pub failed: usize,
    /// Deliveries committed but not acknowledged.
    pub acknowledge_failed: usize,
    /// Deliveries handed back untouched because shutdown began.
    pub cancelled: usize,
    /// Handler invocations that panicked.
    pub panicked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryOutcome {
    Completed,
    Failed,
    AcknowledgeFailed,
    Cancelled,
}

#[derive(Debug, Error)]
#[error("message handler panicked: {0}")]
struct HandlerPanicked(String);

/// Shared pieces each in-flight delivery needs.
#[derive(Clone)]
struct Dispatcher {
    client: Arc<TopicClient>,
    handler: Arc<dyn MessageHandler>,
    fault_handler: Arc<dyn FaultHandler>,
    auto_complete: bool,
}

impl Dispatcher {
    fn context(&self, action: ExceptionAction, sequence_number: Option<u64>) -> ExceptionContext {
        let settings = self.client.settings();
        ExceptionContext {
            endpoint: settings.endpoint().to_string(),
            entity_path: settings.topic.clone(),
            action,
            sequence_number,
        }
    }

    /// Hand an error to the fault handler without letting it disturb the pump.
    fn report(
        &self,
        err: &(dyn Error + Send + Sync + 'static),
        action: ExceptionAction,
        sequence_number: Option<u64>,
    ) {
        let context = self.context(action, sequence_number);
        let reported = catch_unwind(AssertUnwindSafe(|| {
            self.fault_handler.on_exception(err, &context)
        }));
        if reported.is_err() {
            error!(error = %err, action = %action, "Fault handler panicked while reporting");
        }
    }

    async fn abandon(&self, delivery: &Delivery) {
        if let Err(e) = self.client.abandon(&delivery.lock_token).await {
            // The lock expires on its own; the message comes back either way.
            warn!(
                error = %e,
                sequence_number = delivery.sequence_number,
                "Failed to abandon delivery"
            );
            self.report(&e, ExceptionAction::Abandon, Some(delivery.sequence_number));
        }
    }

    async fn process(self, delivery: Delivery, cancel: CancellationToken) -> DeliveryOutcome {
        let sequence_number = delivery.sequence_number;
        let context = DeliveryContext::new(cancel, self.auto_complete);

        match self.handler.handle(&delivery, &self.client, &context).await {
            Ok(()) if self.auto_complete => {
                match self.client.complete(&delivery.lock_token).await {
                    Ok(()) => DeliveryOutcome::Completed,
                    Err(e) => {
                        self.report(&e, ExceptionAction::Complete, Some(sequence_number));
                        DeliveryOutcome::AcknowledgeFailed
                    }
                }
            }
            Ok(()) => DeliveryOutcome::Completed,
            Err(ProcessingError::Cancelled) => {
                info!(sequence_number, "Shutdown in progress, returning delivery to the broker");
                self.abandon(&delivery).await;
                DeliveryOutcome::Cancelled
            }
            Err(e) => {
                self.report(&e, e.action(), Some(sequence_number));
                if e.should_abandon() {
                    self.abandon(&delivery).await;
                }
                match e {
                    ProcessingError::Acknowledge(_) => DeliveryOutcome::AcknowledgeFailed,
                    _ => DeliveryOutcome::Failed,
                }
            }
        }
    }
}

/// Receives deliveries and runs the handler on at most `max_concurrent` of
/// them at a time.
///
/// Each delivery is handled by exactly one invocation. No ordering holds
/// across deliveries once `max_concurrent > 1`. When the cancellation token
/// fires, the pump stops receiving, waits for in-flight invocations, then
/// closes the topic client.
pub struct MessagePump {
    dispatcher: Dispatcher,
    options: ConsumerOptions,
}

impl MessagePump {
    pub fn new(
        client: Arc<TopicClient>,
        handler: Arc<dyn MessageHandler>,
        fault_handler: Arc<dyn FaultHandler>,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            dispatcher: Dispatcher {
                client,
                handler,
                fault_handler,
                auto_complete: options.auto_complete,
            },
            options,
        }
    }

    pub fn client(&self) -> &Arc<TopicClient> {
        &self.dispatcher.client
    }

    /// Run until `cancel` fires or the client is closed underneath the pump.
    pub async fn run(&self, cancel: CancellationToken) -> PumpStats {
        let client = &self.dispatcher.client;
        let max_concurrent = self.options.max_concurrent.max(1);
        let permits = Arc::new(Semaphore::new(max_concurrent));
        let mut in_flight: JoinSet<DeliveryOutcome> = JoinSet::new();
        let mut stats = PumpStats::default();

        info!(
            topic = %client.settings().topic,
            max_concurrent,
            auto_complete = self.options.auto_complete,
            "Starting message pump"
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                self.record(joined, &mut stats);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = client.receive(self.options.receive_wait) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    stats.received += 1;
                    debug!(sequence_number = delivery.sequence_number, "Dispatching delivery");
                    let dispatcher = self.dispatcher.clone();
                    let cancel = cancel.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        dispatcher.process(delivery, cancel).await
                    });
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    warn!("Topic client closed, stopping message pump");
                    break;
                }
                Err(e) => {
                    self.dispatcher.report(&e, ExceptionAction::Receive, None);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.options.receive_backoff) => {}
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "Draining in-flight deliveries");
        while let Some(joined) = in_flight.join_next().await {
            self.record(joined, &mut stats);
        }

        if let Err(e) = client.close().await {
            warn!(error = %e, "Failed to close topic client");
        }

        info!(
            received = stats.received,
            completed = stats.completed,
            failed = stats.failed,
            acknowledge_failed = stats.acknowledge_failed,
            cancelled = stats.cancelled,
            "Message pump stopped"
        );
        stats
    }

    fn record(&self, joined: Result<DeliveryOutcome, JoinError>, stats: &mut PumpStats) {
        match joined {
            Ok(DeliveryOutcome::Completed) => stats.completed += 1,
            Ok(DeliveryOutcome::Failed) => stats.failed += 1,
            Ok(DeliveryOutcome::AcknowledgeFailed) => stats.acknowledge_failed += 1,
            Ok(DeliveryOutcome::Cancelled) => stats.cancelled += 1,
            Err(join_error) => {
                stats.panicked += 1;
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                self.dispatcher.report(
                    &HandlerPanicked(message),
                    ExceptionAction::UserCallback,
                    None,
                );
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A running pump on a background task.
///
/// Dropping the handle signals the pump to stop without waiting for it.
pub struct Subscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<PumpStats>>,
}

impl Subscription {
    /// Spawn `pump` on the current runtime.
    pub fn spawn(pump: MessagePump) -> Self {
        Self::spawn_with_token(pump, CancellationToken::new())
    }

    /// Spawn `pump`, stopping when `cancel` (or the returned handle) fires.
    pub fn spawn_with_token(pump: MessagePump, cancel: CancellationToken) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move { pump.run(token).await });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Signal the pump to stop without waiting.
    pub fn signal_stop(&self) {
        self.cancel.cancel();
    }

    /// Stop receiving, wait for in-flight deliveries, and return the stats.
    pub async fn shutdown(mut self) -> PumpStats {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => match handle.await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(error = %e, "Message pump task failed");
                    PumpStats::default()
                }
            },
            None => PumpStats::default(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
