//! Infrastructure layer: compartment engine, registries, persistence seam, bus
//! consumers and background workers.

pub mod catalog;
pub mod config;
pub mod consumer;
pub mod emitter;
pub mod engine;
pub mod lock_registry;
pub mod reservation;
pub mod store;
pub mod workers;

pub use catalog::{Catalog, CatalogError, EquipmentTemplate, ItemMetadata, StaticCatalog};
pub use config::{ConfigError, InventoryConfig};
pub use consumer::{CommandConsumer, ConsumeError, ConsumeOutcome};
pub use emitter::{EventBuffer, RequestContext};
pub use engine::{CompartmentEngine, EngineError, ErrorKind};
pub use lock_registry::LockRegistry;
pub use reservation::{CompartmentKey, Reservation, ReservationRegistry, SlotKey};
pub use store::{CompartmentStore, InMemoryCompartmentStore, StoreError};

#[cfg(test)]
mod integration_tests;
