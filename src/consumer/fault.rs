//! Fault side-channel for errors escaping message processing or the pump.

use std::error::Error;
use std::fmt;

use tracing::error;

/// What the pump was doing when the error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    /// Receiving the next message from the broker
    Receive,
    /// Running the registered message handler
    UserCallback,
    /// Completing a delivery
    Complete,
    /// Abandoning a delivery
    Abandon,
}

impl fmt::Display for ExceptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionAction::Receive => "Receive",
            ExceptionAction::UserCallback => "UserCallback",
            ExceptionAction::Complete => "Complete",
            ExceptionAction::Abandon => "Abandon",
        };
        f.write_str(name)
    }
}

/// Broker-side context attached to every reported fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionContext {
    pub endpoint: String,
    pub entity_path: String,
    pub action: ExceptionAction,
    /// Sequence number of the delivery involved, if any
    pub sequence_number: Option<u64>,
}

/// Receives faults without affecting message flow.
///
/// Called synchronously from the pump, so implementations must return
/// quickly. A panic inside the handler is caught and logged.
pub trait FaultHandler: Send + Sync {
    fn on_exception(&self, error: &(dyn Error + Send + Sync + 'static), context: &ExceptionContext);
}

impl<F> FaultHandler for F
where
    F: Fn(&(dyn Error + Send + Sync + 'static), &ExceptionContext) + Send + Sync,
{
    fn on_exception(&self, error: &(dyn Error + Send + Sync + 'static), context: &ExceptionContext) {
        self(error, context)
    }
}

/// Logs each fault with its troubleshooting context.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFaultHandler;

impl FaultHandler for LoggingFaultHandler {
    fn on_exception(&self, err: &(dyn Error + Send + Sync + 'static), context: &ExceptionContext) {
        error!(
            error = %err,
            endpoint = %context.endpoint,
            entity_path = %context.entity_path,
            action = %context.action,
            sequence_number = ?context.sequence_number,
            "Message handler encountered an exception"
        );
    }
}
