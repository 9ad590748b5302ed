//! `stowage-core`: identifiers, errors, entity and clock primitives.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AssetId, CharacterId, CompartmentId, TemplateId, TenantId, TransactionId};
