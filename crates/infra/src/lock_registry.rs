//! Per-compartment writer locks.
//!
//! One reader/writer lock per `(character, inventory type)`, created lazily and
//! shared by every engine in the process. Holding the write half serialises all
//! mutations of that compartment; nothing else orders concurrent commands.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use stowage_core::CharacterId;
use stowage_inventory::InventoryType;

type LockKey = (CharacterId, InventoryType);

#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: RwLock<HashMap<LockKey, Arc<RwLock<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a compartment, created on first use.
    ///
    /// Concurrent first calls for the same key always observe the same instance.
    pub fn acquire(&self, character_id: CharacterId, inventory_type: InventoryType) -> Arc<RwLock<()>> {
        let key = (character_id, inventory_type);

        if let Some(lock) = self
            .locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(lock);
        }

        let mut locks = self.locks.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Forget every lock of a character.
    ///
    /// In-flight holders keep their `Arc` and finish normally; later callers get a
    /// fresh lock.
    pub fn release(&self, character_id: CharacterId) {
        self.locks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(c, _), _| *c != character_id);
    }

    pub fn len(&self) -> usize {
        self.locks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
