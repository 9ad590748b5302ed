use thiserror::Error;

use stowage_core::{CharacterId, DomainError, TemplateId};
use stowage_inventory::{ErrorCode, InventoryType};

use crate::catalog::CatalogError;
use crate::store::StoreError;

/// Failure classes of engine operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Upstream,
    Transient,
}

/// Why a compartment operation did not happen.
///
/// Every variant other than `Upstream`/`Transient` is detected before the first
/// write, so nothing was committed when it is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("character {character_id} has no {inventory_type} compartment")]
    CompartmentNotFound {
        character_id: CharacterId,
        inventory_type: InventoryType,
    },

    #[error("asset not found{}", .slot.map(|s| format!(" at slot {s}")).unwrap_or_default())]
    AssetNotFound { slot: Option<i16> },

    #[error("compartment is full")]
    CompartmentFull,

    #[error("slot {slot} holds {available} available of template {item_id}, {requested} requested")]
    InsufficientQuantity {
        slot: i16,
        item_id: TemplateId,
        requested: u32,
        available: u32,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream lookup failed: {0}")]
    Upstream(#[from] CatalogError),

    #[error("persistence failed: {0}")]
    Transient(#[from] StoreError),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvalidId(msg)
            | DomainError::NotFound(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                EngineError::Conflict(msg)
            }
        }
    }
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn asset_not_found(slot: i16) -> Self {
        Self::AssetNotFound { slot: Some(slot) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::CompartmentNotFound { .. }
            | EngineError::AssetNotFound { .. } => ErrorKind::NotFound,
            EngineError::CompartmentFull
            | EngineError::InsufficientQuantity { .. }
            | EngineError::TypeMismatch(_)
            | EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Upstream(_) => ErrorKind::Upstream,
            EngineError::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Wire code carried in the compartment `ERROR` event.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::CompartmentNotFound { .. } => ErrorCode::CompartmentNotFound,
            EngineError::AssetNotFound { .. } => ErrorCode::AssetNotFound,
            EngineError::CompartmentFull => ErrorCode::InventoryFull,
            EngineError::InsufficientQuantity { .. } => ErrorCode::NotEnoughQuantity,
            EngineError::TypeMismatch(_) => ErrorCode::TypeMismatch,
            EngineError::Validation(_) => ErrorCode::InvalidRequest,
            EngineError::Conflict(_) => ErrorCode::SlotConflict,
            EngineError::Upstream(_) => ErrorCode::UpstreamFailure,
            EngineError::Transient(_) => ErrorCode::UnknownError,
        }
    }

    /// Slot the failure refers to, when there is one.
    pub fn slot(&self) -> Option<i16> {
        match self {
            EngineError::AssetNotFound { slot } => *slot,
            EngineError::InsufficientQuantity { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Item the failure refers to, when there is one.
    pub fn item_id(&self) -> Option<TemplateId> {
        match self {
            EngineError::InsufficientQuantity { item_id, .. } => Some(*item_id),
            _ => None,
        }
    }
}
