use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use stowage_events::{EventBus, MessageEnvelope, Subscription};

use super::WorkerHandle;
use crate::catalog::Catalog;
use crate::consumer::{CommandConsumer, ConsumeError};
use crate::store::CompartmentStore;

/// Drains the inbound bus and hands every message to a [`CommandConsumer`].
///
/// Messages are processed on the runtime's blocking pool so that commands for
/// different compartments run concurrently; the compartment locks order the rest.
#[derive(Debug)]
pub struct CommandConsumerWorker;

impl CommandConsumerWorker {
    pub fn spawn<S, C, B, I>(
        name: &'static str,
        inbound: I,
        consumer: CommandConsumer<S, C, B>,
        runtime: Handle,
    ) -> io::Result<WorkerHandle>
    where
        S: CompartmentStore + 'static,
        C: Catalog + 'static,
        B: EventBus<MessageEnvelope<JsonValue>> + 'static,
        I: EventBus<MessageEnvelope<JsonValue>>,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = inbound.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, consumer, runtime))?;

        info!(worker = name, "command consumer started");
        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn worker_loop<S, C, B>(
    name: &'static str,
    sub: Subscription<MessageEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    consumer: CommandConsumer<S, C, B>,
    runtime: Handle,
) where
    S: CompartmentStore + 'static,
    C: Catalog + 'static,
    B: EventBus<MessageEnvelope<JsonValue>> + 'static,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                let consumer = consumer.clone();
                runtime.spawn_blocking(move || handle(name, &consumer, &envelope));
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(worker = name, "command consumer stopped");
}

fn handle<S, C, B>(
    name: &'static str,
    consumer: &CommandConsumer<S, C, B>,
    envelope: &MessageEnvelope<JsonValue>,
) where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    match consumer.consume(envelope) {
        Ok(outcome) => debug!(
            worker = name,
            topic = envelope.topic(),
            message_id = %envelope.message_id(),
            outcome = ?outcome,
            "message consumed"
        ),
        Err(err @ ConsumeError::Malformed { .. }) => warn!(
            worker = name,
            message_id = %envelope.message_id(),
            error = %err,
            "dropping malformed message"
        ),
        // Already logged and reported as an ERROR event by the engine.
        Err(ConsumeError::Engine(err)) => debug!(
            worker = name,
            message_id = %envelope.message_id(),
            error = %err,
            "message rejected"
        ),
    }
}
