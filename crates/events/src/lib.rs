//! Message bus mechanics shared by every inventory component.
//!
//! Nothing in here knows about compartments or assets: it only moves tenant-scoped
//! envelopes between publishers and subscribers.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;
pub mod message;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use envelope::MessageEnvelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use message::Message;
