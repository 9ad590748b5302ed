//! Compartment engine: the single mutation path for character inventories.
//!
//! Every mutating operation runs the same pipeline:
//!
//! ```text
//! acquire (character, inventory type) lock
//!   ↓
//! load compartment, validate the whole request   ── failure: nothing written
//!   ↓
//! commit writes to the store, queue status events
//!   ↓
//! release lock
//!   ↓
//! publish queued events (and an ERROR event if the operation failed)
//! ```
//!
//! Reads bypass the lock and return whatever the store last committed.

mod arrangement;
mod assets;
pub mod error;
mod lifecycle;
mod movement;
mod pickup;
mod reservations;

pub use error::{EngineError, ErrorKind};
pub use movement::CHARACTER_DROP_TYPE;

use std::sync::{Arc, PoisonError};

use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use stowage_core::{CharacterId, CompartmentId, TenantId, TransactionId};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{Asset, Compartment, CompartmentStatusBody, ErrorBody, InventoryType};

use crate::catalog::Catalog;
use crate::config::InventoryConfig;
use crate::emitter::{EventBuffer, RequestContext};
use crate::lock_registry::LockRegistry;
use crate::reservation::{CompartmentKey, ReservationRegistry, SlotKey};
use crate::store::CompartmentStore;

pub struct CompartmentEngine<S, C, B> {
    store: S,
    catalog: C,
    bus: B,
    locks: Arc<LockRegistry>,
    reservations: Arc<ReservationRegistry>,
    config: InventoryConfig,
}

impl<S, C, B> CompartmentEngine<S, C, B> {
    pub fn new(
        store: S,
        catalog: C,
        bus: B,
        locks: Arc<LockRegistry>,
        reservations: Arc<ReservationRegistry>,
        config: InventoryConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            bus,
            locks,
            reservations,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn reservations(&self) -> &Arc<ReservationRegistry> {
        &self.reservations
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }
}

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    pub fn get_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<Option<Compartment>, EngineError> {
        Ok(self.store.get_compartment(tenant_id, compartment_id)?)
    }

    pub fn find_compartment(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<Option<Compartment>, EngineError> {
        Ok(self
            .store
            .find_compartment(tenant_id, character_id, inventory_type)?)
    }

    pub fn list_compartments(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
    ) -> Result<Vec<Compartment>, EngineError> {
        Ok(self.store.list_compartments(tenant_id, character_id)?)
    }

    /// Quantity of the asset at `slot` not covered by live holds.
    pub fn available_quantity(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
        inventory_type: InventoryType,
        slot: i16,
    ) -> Result<u32, EngineError> {
        let compartment = self
            .find_compartment(tenant_id, character_id, inventory_type)?
            .ok_or(EngineError::CompartmentNotFound {
                character_id,
                inventory_type,
            })?;
        let asset = compartment
            .asset_at(slot)
            .ok_or(EngineError::asset_not_found(slot))?;
        let key = CompartmentKey::new(tenant_id, character_id, inventory_type).at(slot);
        Ok(self.available(key, asset, None))
    }

    /// Run `op` under the compartment lock and publish what it queued afterwards.
    fn execute<T>(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        operation: &'static str,
        op: impl FnOnce(&mut EventBuffer) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut events = EventBuffer::new(ctx);
        let lock = self.locks.acquire(character_id, inventory_type);
        let result = {
            let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
            op(&mut events)
        };

        // Anything queued was committed, even if a later write failed.
        let published = events.flush(&self.bus);

        match &result {
            Ok(_) => debug!(
                tenant_id = %ctx.tenant_id,
                transaction_id = %ctx.transaction_id,
                character_id = %character_id,
                inventory_type = %inventory_type,
                operation,
                published,
                "compartment operation committed"
            ),
            Err(err) => self.report_failure(ctx, character_id, Some(inventory_type), operation, err),
        }
        result
    }

    /// Log a failed operation and announce it with a compartment `ERROR` event.
    ///
    /// Without an inventory type, or without a stored compartment, the event
    /// carries the nil compartment id.
    fn report_failure(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: Option<InventoryType>,
        operation: &'static str,
        err: &EngineError,
    ) {
        let inventory_type_field = inventory_type.map(tracing::field::display);
        match err.kind() {
            ErrorKind::Upstream | ErrorKind::Transient => error!(
                tenant_id = %ctx.tenant_id,
                transaction_id = %ctx.transaction_id,
                character_id = %character_id,
                inventory_type = inventory_type_field,
                operation,
                error = %err,
                "compartment operation failed"
            ),
            ErrorKind::NotFound | ErrorKind::Validation | ErrorKind::Conflict => warn!(
                tenant_id = %ctx.tenant_id,
                transaction_id = %ctx.transaction_id,
                character_id = %character_id,
                inventory_type = inventory_type_field,
                operation,
                error = %err,
                "compartment operation rejected"
            ),
        }

        let compartment_id = inventory_type
            .and_then(|inventory_type| {
                self.store
                    .find_compartment(ctx.tenant_id, character_id, inventory_type)
                    .ok()
                    .flatten()
            })
            .map(|c| c.id())
            .unwrap_or_else(CompartmentId::nil);

        let mut events = EventBuffer::new(ctx);
        events.compartment(
            character_id,
            compartment_id,
            CompartmentStatusBody::Error(ErrorBody {
                error_code: err.code(),
                slot: err.slot(),
                item_id: err.item_id(),
            }),
        );
        events.flush(&self.bus);
    }

    fn load(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<Compartment, EngineError> {
        self.store
            .find_compartment(ctx.tenant_id, character_id, inventory_type)?
            .ok_or(EngineError::CompartmentNotFound {
                character_id,
                inventory_type,
            })
    }

    /// Quantity at `key` not held by anyone but `fulfilling`.
    fn available(&self, key: SlotKey, asset: &Asset, fulfilling: Option<TransactionId>) -> u32 {
        asset
            .quantity()
            .saturating_sub(self.reservations.total_reserved_excluding(key, fulfilling))
    }

    /// Drop the hold `id` placed at `key`, if any; the caller is consuming it.
    fn fulfil(&self, key: SlotKey, id: TransactionId) {
        if let Ok(hold) = self.reservations.remove(key, id) {
            debug!(
                transaction_id = %id,
                slot = key.slot,
                quantity = hold.quantity,
                "reservation fulfilled"
            );
        }
    }

    /// Take `quantity` off `asset`, deleting it when nothing is left.
    ///
    /// Returns the remaining asset, if any.
    fn debit(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        asset: Asset,
        quantity: u32,
    ) -> Result<Option<Asset>, EngineError> {
        if quantity >= asset.quantity() {
            self.store
                .delete_asset(ctx.tenant_id, asset.compartment_id(), asset.id())?;
            events.asset_deleted(character_id, &asset);
            return Ok(None);
        }
        let remaining = asset.quantity() - quantity;
        let updated = asset.with_quantity(remaining);
        self.store.update_asset(ctx.tenant_id, &updated)?;
        events.asset_quantity_changed(character_id, &updated);
        Ok(Some(updated))
    }
}

fn compartment_key(
    ctx: RequestContext,
    character_id: CharacterId,
    inventory_type: InventoryType,
) -> CompartmentKey {
    CompartmentKey::new(ctx.tenant_id, character_id, inventory_type)
}

fn source_asset(compartment: &Compartment, slot: i16) -> Result<Asset, EngineError> {
    compartment
        .asset_at(slot)
        .cloned()
        .ok_or(EngineError::asset_not_found(slot))
}
