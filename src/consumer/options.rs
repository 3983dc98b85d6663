use std::time::Duration;

/// How the pump receives and settles messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Upper bound on concurrently running handler invocations (at least 1).
    pub max_concurrent: usize,
    /// Complete a delivery automatically after the handler returns `Ok`.
    ///
    /// Leave this off when the handler settles deliveries itself.
    pub auto_complete: bool,
    /// How long one receive call waits for a message.
    pub receive_wait: Duration,
    /// Pause after a failed receive before trying again.
    pub receive_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            auto_complete: false,
            receive_wait: Duration::from_secs(1),
            receive_backoff: Duration::from_secs(1),
        }
    }
}

impl ConsumerOptions {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_auto_complete(mut self, auto_complete: bool) -> Self {
        self.auto_complete = auto_complete;
        self
    }

    pub fn with_receive_wait(mut self, receive_wait: Duration) -> Self {
        self.receive_wait = receive_wait;
        self
    }

    pub fn with_receive_backoff(mut self, receive_backoff: Duration) -> Self {
        self.receive_backoff = receive_backoff;
        self
    }
}
