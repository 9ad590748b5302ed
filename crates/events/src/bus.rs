//! Message publishing/subscription abstraction (mechanics only).
//!
//! The bus carries both inbound commands (from other services) and outbound status
//! events (to other services). It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels in tests/dev, a broker adapter in production
//! - **At-least-once delivery**: messages may be redelivered; consumers must tolerate duplicates
//! - **No ordering guarantees**: commands for the same character may arrive concurrently
//! - **No persistence**: the compartment store is the source of truth, not the bus
//!
//! Ordering between commands that touch the same compartment is provided by the
//! lock registry in `stowage-infra`, never by the bus.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to a message stream.
///
/// Each subscription gets a copy of every message published after it was created
/// (broadcast semantics). Subscriptions are meant to be drained by one thread.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(msg) => handle(msg),
///         Err(RecvTimeoutError::Timeout) => continue,  // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus closed
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic message bus (pub/sub abstraction).
///
/// ```text
/// other services ──commands──▶ bus ──▶ consumer ──▶ compartment engine
///                                                         │
/// other services ◀──status events── bus ◀── emitter ◀─────┘
/// ```
///
/// `publish()` can fail (bus full, broker unreachable). The engine publishes only
/// after its mutation is committed, so a publish failure never rolls back state;
/// it is logged by the caller and left to upstream redelivery.
///
/// Implementations must be `Send + Sync`; many command handlers publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
