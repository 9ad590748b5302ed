//! Persistence boundary for compartments and assets.
//!
//! The engine treats storage as a tenant-keyed, transactional key/value store that
//! commits single-row writes atomically. Multi-row consistency comes from the
//! compartment lock held around every sequence of writes, not from the store.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryCompartmentStore;
pub use r#trait::{CompartmentStore, StoreError};
