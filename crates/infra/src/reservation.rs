//! Provisional holds on slot quantity.
//!
//! A reservation is the "prepare" half of a cross-service saga: it makes quantity
//! invisible to other commands until it is fulfilled, cancelled or expires. Holds
//! live only in memory; after a restart expiry and idempotent cancel recover.
//!
//! The registry never checks capacity or availability. The engine does that while
//! it holds the compartment lock, so what it reads here is consistent with the
//! mutation it is about to commit.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use stowage_core::{CharacterId, Clock, TemplateId, TenantId, TransactionId};
use stowage_inventory::InventoryType;

/// Identifies one compartment of one tenant's character.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CompartmentKey {
    pub tenant_id: TenantId,
    pub character_id: CharacterId,
    pub inventory_type: InventoryType,
}

impl CompartmentKey {
    pub fn new(tenant_id: TenantId, character_id: CharacterId, inventory_type: InventoryType) -> Self {
        Self {
            tenant_id,
            character_id,
            inventory_type,
        }
    }

    pub fn at(self, slot: i16) -> SlotKey {
        SlotKey {
            compartment: self,
            slot,
        }
    }
}

/// Identifies one slot of a compartment; the unit holds are keyed by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub compartment: CompartmentKey,
    pub slot: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Transaction id of the reserving saga; also the idempotency key.
    pub id: TransactionId,
    pub item_id: TemplateId,
    pub quantity: u32,
    pub expiry: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("reservation {id} not found at slot {slot}")]
    NotFound { id: TransactionId, slot: i16 },
}

pub struct ReservationRegistry {
    holds: RwLock<HashMap<SlotKey, Vec<Reservation>>>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for ReservationRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReservationRegistry")
            .field("keys", &self.key_count())
            .finish_non_exhaustive()
    }
}

impl ReservationRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            holds: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Register a hold that expires `ttl` from now.
    ///
    /// A hold with the same id at the same slot is replaced, so a redelivered
    /// reserve request does not count twice.
    pub fn add(
        &self,
        key: SlotKey,
        id: TransactionId,
        item_id: TemplateId,
        quantity: u32,
        ttl: Duration,
    ) -> Reservation {
        let reservation = Reservation {
            id,
            item_id,
            quantity,
            expiry: self.clock.now() + ttl,
        };

        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);
        let list = holds.entry(key).or_default();
        list.retain(|r| r.id != id);
        list.push(reservation);
        reservation
    }

    /// Remove the hold `id` from a slot.
    pub fn remove(&self, key: SlotKey, id: TransactionId) -> Result<Reservation, ReservationError> {
        let not_found = ReservationError::NotFound { id, slot: key.slot };
        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);

        let list = holds.get_mut(&key).ok_or(not_found.clone())?;
        let idx = list.iter().position(|r| r.id == id).ok_or(not_found)?;
        let removed = list.remove(idx);
        if list.is_empty() {
            holds.remove(&key);
        }
        Ok(removed)
    }

    /// Exchange the complete hold lists of two slots.
    pub fn swap(&self, compartment: CompartmentKey, slot_a: i16, slot_b: i16) {
        if slot_a == slot_b {
            return;
        }
        let (a, b) = (compartment.at(slot_a), compartment.at(slot_b));
        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);
        let from_a = holds.remove(&a);
        let from_b = holds.remove(&b);
        if let Some(list) = from_a {
            holds.insert(b, list);
        }
        if let Some(list) = from_b {
            holds.insert(a, list);
        }
    }

    /// Move hold lists along a set of `(old, new)` slot changes in one step.
    pub fn relocate(&self, compartment: CompartmentKey, moves: &[(i16, i16)]) {
        if moves.is_empty() {
            return;
        }
        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);

        let lifted: Vec<(i16, Vec<Reservation>)> = moves
            .iter()
            .filter_map(|(from, to)| holds.remove(&compartment.at(*from)).map(|l| (*to, l)))
            .collect();

        for (to, list) in lifted {
            holds.entry(compartment.at(to)).or_default().extend(list);
        }
    }

    /// Sum of active hold quantities at a slot.
    pub fn total_reserved(&self, key: SlotKey) -> u32 {
        self.total_reserved_excluding(key, None)
    }

    /// Like [`total_reserved`](Self::total_reserved) but ignoring the hold `id`.
    ///
    /// Used when a command fulfils its own hold: its quantity is about to be
    /// consumed by that very command.
    pub fn total_reserved_excluding(&self, key: SlotKey, id: Option<TransactionId>) -> u32 {
        let now = self.clock.now();
        let holds = self.holds.read().unwrap_or_else(PoisonError::into_inner);
        holds
            .get(&key)
            .map(|list| {
                list.iter()
                    .filter(|r| r.is_active_at(now) && Some(r.id) != id)
                    .map(|r| r.quantity)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Active holds at a slot.
    pub fn holds(&self, key: SlotKey) -> Vec<Reservation> {
        let now = self.clock.now();
        let holds = self.holds.read().unwrap_or_else(PoisonError::into_inner);
        holds
            .get(&key)
            .map(|list| list.iter().filter(|r| r.is_active_at(now)).copied().collect())
            .unwrap_or_default()
    }

    pub fn find(&self, key: SlotKey, id: TransactionId) -> Option<Reservation> {
        let holds = self.holds.read().unwrap_or_else(PoisonError::into_inner);
        holds.get(&key)?.iter().find(|r| r.id == id).copied()
    }

    pub fn has_active(&self, key: SlotKey) -> bool {
        self.total_reserved(key) > 0
    }

    /// Drop every expired hold; slots left without holds are forgotten.
    ///
    /// Returns the number of holds removed.
    pub fn expire_sweep(&self) -> usize {
        let now = self.clock.now();
        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        holds.retain(|_, list| {
            let before = list.len();
            list.retain(|r| r.is_active_at(now));
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Drop every hold of a character (teardown). Returns the number removed.
    pub fn remove_all_for_character(&self, tenant_id: TenantId, character_id: CharacterId) -> usize {
        let mut holds = self.holds.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        holds.retain(|key, list| {
            let owned = key.compartment.tenant_id == tenant_id
                && key.compartment.character_id == character_id;
            if owned {
                removed += list.len();
            }
            !owned
        });
        removed
    }

    pub fn key_count(&self) -> usize {
        self.holds.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
