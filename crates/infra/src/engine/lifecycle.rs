use serde_json::Value as JsonValue;
use tracing::info;

use stowage_core::{CharacterId, CompartmentId};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{CapacityBody, Compartment, CompartmentStatusBody, InventoryType};

use super::{CompartmentEngine, EngineError};
use crate::catalog::Catalog;
use crate::emitter::RequestContext;
use crate::store::CompartmentStore;

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Create the `inventory_type` compartment of a character.
    ///
    /// Idempotent: an existing compartment is returned unchanged and no event is
    /// emitted.
    pub fn create_compartment(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        capacity: u32,
    ) -> Result<Compartment, EngineError> {
        self.execute(ctx, character_id, inventory_type, "create_compartment", |events| {
            if let Some(existing) =
                self.store
                    .find_compartment(ctx.tenant_id, character_id, inventory_type)?
            {
                return Ok(existing);
            }
            if capacity == 0 || capacity > self.config.max_capacity {
                return Err(EngineError::validation(format!(
                    "capacity {capacity} is outside 1..={}",
                    self.config.max_capacity
                )));
            }

            let compartment = self.store.insert_compartment(
                ctx.tenant_id,
                Compartment::new(CompartmentId::new(), character_id, inventory_type, capacity),
            )?;
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::Created(CapacityBody {
                    inventory_type,
                    capacity,
                }),
            );
            Ok(compartment)
        })
    }

    /// Create all five compartments of a new character with default capacities.
    pub fn create_character_compartments(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
    ) -> Result<Vec<Compartment>, EngineError> {
        let compartments = InventoryType::ALL
            .into_iter()
            .map(|t| {
                self.create_compartment(
                    ctx,
                    character_id,
                    t,
                    self.config.default_capacity.for_type(t),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            tenant_id = %ctx.tenant_id,
            character_id = %character_id,
            "character compartments created"
        );
        Ok(compartments)
    }

    /// Delete one compartment and every asset in it. Returns false if it did not exist.
    pub fn delete_compartment(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<bool, EngineError> {
        self.execute(ctx, character_id, inventory_type, "delete_compartment", |events| {
            let Some(compartment) =
                self.store
                    .find_compartment(ctx.tenant_id, character_id, inventory_type)?
            else {
                return Ok(false);
            };

            for asset in compartment.assets() {
                self.store
                    .delete_asset(ctx.tenant_id, compartment.id(), asset.id())?;
                events.asset_deleted(character_id, asset);
            }
            self.store.delete_compartment(ctx.tenant_id, compartment.id())?;
            events.compartment(character_id, compartment.id(), CompartmentStatusBody::Deleted);
            Ok(true)
        })
    }

    /// Tear down everything a character owns: compartments, holds and locks.
    ///
    /// Returns the number of compartments deleted.
    pub fn delete_character(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
    ) -> Result<usize, EngineError> {
        let mut deleted = 0;
        for inventory_type in InventoryType::ALL {
            if self.delete_compartment(ctx, character_id, inventory_type)? {
                deleted += 1;
            }
        }
        let holds = self
            .reservations
            .remove_all_for_character(ctx.tenant_id, character_id);
        self.locks.release(character_id);

        info!(
            tenant_id = %ctx.tenant_id,
            character_id = %character_id,
            compartments = deleted,
            holds,
            "character inventory deleted"
        );
        Ok(deleted)
    }

    /// Grow a compartment by `amount` slots. Returns the new capacity.
    pub fn increase_capacity(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        amount: u32,
    ) -> Result<u32, EngineError> {
        self.execute(ctx, character_id, inventory_type, "increase_capacity", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            if amount == 0 {
                return Err(EngineError::validation("capacity increase must be positive"));
            }
            let capacity = compartment
                .capacity()
                .checked_add(amount)
                .filter(|c| *c <= self.config.max_capacity)
                .ok_or_else(|| {
                    EngineError::validation(format!(
                        "capacity {} + {amount} exceeds the maximum of {}",
                        compartment.capacity(),
                        self.config.max_capacity
                    ))
                })?;

            self.store
                .update_capacity(ctx.tenant_id, compartment.id(), capacity)?;
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::CapacityChanged(CapacityBody {
                    inventory_type,
                    capacity,
                }),
            );
            Ok(capacity)
        })
    }
}
