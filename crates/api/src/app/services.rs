use std::io;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tracing::info;

use stowage_core::SystemClock;
use stowage_events::{InMemoryEventBus, MessageEnvelope};
use stowage_infra::workers::{CommandConsumerWorker, ReservationSweeper, WorkerHandle};
use stowage_infra::{
    CommandConsumer, CompartmentEngine, InMemoryCompartmentStore, InventoryConfig, ItemMetadata,
    LockRegistry, ReservationRegistry, StaticCatalog,
};

pub type Bus = Arc<InMemoryEventBus<MessageEnvelope<JsonValue>>>;

// In-memory wiring; the persistence and catalog seams stay generic in the engine.
pub type Engine = CompartmentEngine<Arc<InMemoryCompartmentStore>, Arc<StaticCatalog>, Bus>;

/// Everything the HTTP handlers and background workers share.
pub struct AppServices {
    pub engine: Arc<Engine>,
    /// Outbound status events and drop commands.
    pub outbound: Bus,
    /// Commands and upstream events addressed to this service.
    pub inbound: Bus,
}

/// Running background workers. Dropping this does not stop them; call `shutdown`.
pub struct Workers {
    handles: Vec<WorkerHandle>,
}

impl Workers {
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
    }
}

pub fn build_services(config: InventoryConfig, catalog: StaticCatalog) -> AppServices {
    let outbound: Bus = Arc::new(InMemoryEventBus::new());
    let inbound: Bus = Arc::new(InMemoryEventBus::new());

    let engine = CompartmentEngine::new(
        Arc::new(InMemoryCompartmentStore::new()),
        Arc::new(catalog),
        outbound.clone(),
        Arc::new(LockRegistry::new()),
        Arc::new(ReservationRegistry::new(Arc::new(SystemClock))),
        config,
    );

    AppServices {
        engine: Arc::new(engine),
        outbound,
        inbound,
    }
}

/// Catalog answering every stackable template with default stack metadata.
pub fn default_catalog() -> StaticCatalog {
    StaticCatalog::new().with_default_item(ItemMetadata::default())
}

impl AppServices {
    /// Start the inbound consumer and the reservation sweeper.
    pub fn start_workers(&self, runtime: Handle) -> io::Result<Workers> {
        let consumer = CommandConsumerWorker::spawn(
            "stowage-consumer",
            self.inbound.clone(),
            CommandConsumer::new(Arc::clone(&self.engine)),
            runtime,
        )?;
        let sweeper = ReservationSweeper::spawn(
            Arc::clone(self.engine.reservations()),
            self.engine.config().sweep_interval,
        )?;
        info!(
            sweep_interval_ms = self.engine.config().sweep_interval.as_millis() as u64,
            "background workers started"
        );

        Ok(Workers {
            handles: vec![consumer, sweeper],
        })
    }
}
