//! In-memory peek-lock broker for tests and single-process deployments.
//!
//! Behaves like a queue with lock-based manual acknowledgement:
//! - `receive` hands out the oldest ready message under a fresh lock token
//! - `complete` removes it for good
//! - `abandon`, or letting the lock expire, makes it ready again
//! - a message abandoned `max_delivery_count` times is dead-lettered
//!
//! Every connection opened through the factory is counted, which lets tests
//! observe how many connections a client really created.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::connection::{
    AcknowledgeError, Connection, ConnectionFactory, Delivery, LockToken, TopicSettings,
    TransportError,
};
use crate::envelope::Envelope;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone)]
struct StoredMessage {
    envelope: Envelope,
    sequence_number: u64,
    delivery_count: u32,
}

struct LockedMessage {
    message: StoredMessage,
    expires_at: Instant,
}

#[derive(Default)]
struct TopicQueue {
    next_sequence: u64,
    ready: VecDeque<StoredMessage>,
    locked: HashMap<LockToken, LockedMessage>,
    completed: Vec<Envelope>,
    dead_lettered: Vec<Envelope>,
    issued: Vec<LockToken>,
    completions: Vec<LockToken>,
}

impl TopicQueue {
    /// Return expired locks to the ready queue (or dead-letter them).
    fn reclaim_expired(&mut self, now: Instant, max_delivery_count: u32) {
        let expired: Vec<LockToken> = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in expired {
            if let Some(locked) = self.locked.remove(&token) {
                self.release(locked.message, max_delivery_count);
            }
        }
    }

    fn release(&mut self, message: StoredMessage, max_delivery_count: u32) {
        if message.delivery_count >= max_delivery_count {
            self.dead_lettered.push(message.envelope);
        } else {
            self.ready.push_front(message);
        }
    }

    /// Take a live lock, treating an expired one as already lost.
    fn take_lock(&mut self, token: &LockToken, now: Instant) -> Option<LockedMessage> {
        let live = self
            .locked
            .get(token)
            .is_some_and(|locked| locked.expires_at > now);
        if live {
            self.locked.remove(token)
        } else {
            None
        }
    }
}

struct BrokerState {
    lock_duration: Duration,
    max_delivery_count: u32,
    connections_opened: AtomicUsize,
    refuse_connections: AtomicBool,
    reject_sends: AtomicBool,
    topics: Mutex<HashMap<String, TopicQueue>>,
}

/// In-memory broker shared by every connection it opens.
///
/// `Clone` yields another handle to the same broker.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use group_ingest::bus::{InMemoryBroker, TopicClient, TopicSettings};
///
/// let broker = InMemoryBroker::new();
/// let client = TopicClient::new(
///     TopicSettings::new("memory://local", "groups"),
///     Arc::new(broker.clone()),
/// );
/// assert_eq!(broker.connections_opened(), 0);
/// # drop(client);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create a broker with a 30 second lock duration and 10 deliveries per message.
    pub fn new() -> Self {
        Self::with_limits(Duration::from_secs(30), 10)
    }

    /// Create a broker with explicit lock duration and max delivery count.
    pub fn with_limits(lock_duration: Duration, max_delivery_count: u32) -> Self {
        Self {
            state: Arc::new(BrokerState {
                lock_duration,
                max_delivery_count: max_delivery_count.max(1),
                connections_opened: AtomicUsize::new(0),
                refuse_connections: AtomicBool::new(false),
                reject_sends: AtomicBool::new(false),
                topics: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of connections opened through this broker.
    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::SeqCst)
    }

    /// Make subsequent connect attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent sends fail as broker rejections.
    pub fn reject_sends(&self, reject: bool) {
        self.state.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Messages ready for delivery on a topic.
    pub async fn pending(&self, topic: &str) -> usize {
        self.with_topic(topic, |queue| queue.ready.len()).await
    }

    /// Messages currently delivered and locked on a topic.
    pub async fn in_flight(&self, topic: &str) -> usize {
        self.with_topic(topic, |queue| queue.locked.len()).await
    }

    /// Envelopes completed on a topic, in completion order.
    pub async fn completed(&self, topic: &str) -> Vec<Envelope> {
        self.with_topic(topic, |queue| queue.completed.clone()).await
    }

    /// Envelopes moved to the dead-letter queue of a topic.
    pub async fn dead_lettered(&self, topic: &str) -> Vec<Envelope> {
        self.with_topic(topic, |queue| queue.dead_lettered.clone()).await
    }

    /// Every lock token handed out on a topic, in delivery order.
    pub async fn issued_lock_tokens(&self, topic: &str) -> Vec<LockToken> {
        self.with_topic(topic, |queue| queue.issued.clone()).await
    }

    /// Lock tokens that were successfully completed on a topic.
    pub async fn completed_lock_tokens(&self, topic: &str) -> Vec<LockToken> {
        self.with_topic(topic, |queue| queue.completions.clone()).await
    }

    async fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&TopicQueue) -> T) -> T {
        let mut topics = self.state.topics.lock().await;
        f(topics.entry(topic.to_string()).or_default())
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryBroker {
    async fn connect(
        &self,
        settings: &TopicSettings,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        // Yield so concurrent first users genuinely overlap with the connect.
        tokio::task::yield_now().await;

        if self.state.refuse_connections.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: settings.endpoint().to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if settings.topic.is_empty() {
            return Err(TransportError::Connect {
                endpoint: settings.endpoint().to_string(),
                reason: "topic name is empty".to_string(),
            });
        }

        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            topic: settings.topic.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct InMemoryConnection {
    state: Arc<BrokerState>,
    topic: String,
    closed: AtomicBool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    async fn try_receive(&self) -> Option<Delivery> {
        let mut topics = self.state.topics.lock().await;
        let queue = topics.entry(self.topic.clone()).or_default();
        let now = Instant::now();
        queue.reclaim_expired(now, self.state.max_delivery_count);

        let mut message = queue.ready.pop_front()?;
        message.delivery_count += 1;

        let lock_token = LockToken::new(Uuid::new_v4().to_string());
        queue.issued.push(lock_token.clone());
        queue.locked.insert(
            lock_token.clone(),
            LockedMessage {
                message: message.clone(),
                expires_at: now + self.state.lock_duration,
            },
        );

        Some(Delivery {
            envelope: message.envelope,
            lock_token,
            sequence_number: message.sequence_number,
            delivery_count: message.delivery_count,
        })
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.state.reject_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!(
                "topic {} is not accepting messages",
                self.topic
            )));
        }

        let mut topics = self.state.topics.lock().await;
        let queue = topics.entry(self.topic.clone()).or_default();
        queue.next_sequence += 1;
        let sequence_number = queue.next_sequence;
        queue.ready.push_back(StoredMessage {
            envelope,
            sequence_number,
            delivery_count: 0,
        });
        Ok(())
    }

    async fn receive(&self, max_wait: Duration) -> Result<Option<Delivery>, TransportError> {
        let deadline = Instant::now() + max_wait;

        loop {
            self.ensure_open()?;
            if let Some(delivery) = self.try_receive().await {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn complete(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError> {
        self.ensure_open()?;
        let mut topics = self.state.topics.lock().await;
        let queue = topics.entry(self.topic.clone()).or_default();

        let locked = queue
            .take_lock(lock_token, Instant::now())
            .ok_or_else(|| AcknowledgeError::LockLost(lock_token.clone()))?;
        queue.completed.push(locked.message.envelope);
        queue.completions.push(lock_token.clone());
        Ok(())
    }

    async fn abandon(&self, lock_token: &LockToken) -> Result<(), AcknowledgeError> {
        self.ensure_open()?;
        let mut topics = self.state.topics.lock().await;
        let queue = topics.entry(self.topic.clone()).or_default();

        let locked = queue
            .take_lock(lock_token, Instant::now())
            .ok_or_else(|| AcknowledgeError::LockLost(lock_token.clone()))?;
        queue.release(locked.message, self.state.max_delivery_count);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
