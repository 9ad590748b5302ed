use serde_json::Value as JsonValue;
use tracing::info;

use stowage_core::CharacterId;
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    Asset, CreateAssetBody, DropCommand, DropReserved, InventoryType, NewAsset, ReferenceData,
};

use super::{CompartmentEngine, EngineError};
use crate::catalog::Catalog;
use crate::emitter::{EventBuffer, RequestContext};
use crate::store::CompartmentStore;

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Move a drop reserved for this character into its inventory.
    ///
    /// On success the map service is asked to finish the pick up; on failure it
    /// is asked to release the drop again.
    pub fn attempt_pick_up(
        &self,
        ctx: RequestContext,
        reserved: DropReserved,
    ) -> Result<Vec<Asset>, EngineError> {
        if reserved.is_equipment() {
            self.attempt_equipment_pick_up(ctx, reserved).map(|a| vec![a])
        } else {
            self.attempt_item_pick_up(ctx, reserved)
        }
    }

    /// Pick up a stackable (or freshly rolled) item by template and quantity.
    pub fn attempt_item_pick_up(
        &self,
        ctx: RequestContext,
        reserved: DropReserved,
    ) -> Result<Vec<Asset>, EngineError> {
        let result = match InventoryType::from_template(reserved.item_id) {
            Ok(inventory_type) => {
                self.execute(ctx, reserved.character_id, inventory_type, "pick_up_item", |events| {
                    let compartment = self.load(ctx, reserved.character_id, inventory_type)?;
                    let body = CreateAssetBody {
                        template_id: reserved.item_id,
                        quantity: reserved.quantity,
                        slot: 0,
                        expiration: None,
                        owner_id: 0,
                        flag: 0,
                        rechargeable: false,
                    };
                    self.create_in(ctx, events, reserved.character_id, &compartment, &body)
                })
            }
            Err(err) => {
                let err = EngineError::from(err);
                self.report_failure(ctx, reserved.character_id, None, "pick_up_item", &err);
                Err(err)
            }
        };
        self.settle_pick_up(ctx, &reserved, result)
    }

    /// Pick up an existing piece of equipment, keeping its rolled attributes.
    pub fn attempt_equipment_pick_up(
        &self,
        ctx: RequestContext,
        reserved: DropReserved,
    ) -> Result<Asset, EngineError> {
        let inventory_type = InventoryType::Equip;
        let result = self.execute(
            ctx,
            reserved.character_id,
            inventory_type,
            "pick_up_equipment",
            |events| {
                let compartment = self.load(ctx, reserved.character_id, inventory_type)?;
                if InventoryType::from_template(reserved.item_id)? != inventory_type {
                    return Err(EngineError::type_mismatch(format!(
                        "template {} is not equipment",
                        reserved.item_id
                    )));
                }
                let slot = compartment
                    .next_free_slot()
                    .ok_or(EngineError::CompartmentFull)?;
                let data = self.catalog.equipment(reserved.equipment_id)?;

                let asset = self.store.insert_asset(
                    ctx.tenant_id,
                    compartment.id(),
                    NewAsset::new(slot, reserved.item_id, ReferenceData::Equipable(data))
                        .with_reference_id(reserved.equipment_id),
                )?;
                events.asset_created(reserved.character_id, &asset);
                Ok(asset)
            },
        );
        self.settle_pick_up(ctx, &reserved, result)
    }

    /// Tell the map service how the pick up ended.
    fn settle_pick_up<T>(
        &self,
        ctx: RequestContext,
        reserved: &DropReserved,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let character_id: CharacterId = reserved.character_id;
        let command = match &result {
            Ok(_) => DropCommand::request_pick_up(ctx.transaction_id, character_id, reserved.drop_id),
            Err(err) => {
                info!(
                    transaction_id = %ctx.transaction_id,
                    character_id = %character_id,
                    drop_id = reserved.drop_id,
                    error = %err,
                    "pick up failed; releasing drop"
                );
                DropCommand::cancel_reservation(ctx.transaction_id, character_id, reserved.drop_id)
            }
        };
        let mut events = EventBuffer::new(ctx);
        events.drop_command(command);
        events.flush(&self.bus);
        result
    }
}
