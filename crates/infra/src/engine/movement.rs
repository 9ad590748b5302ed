use serde_json::Value as JsonValue;

use stowage_core::CharacterId;
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    Asset, DropBody, DropCommand, InventoryType, MoveBody, ReferenceType, SpawnFromCharacterBody,
};

use super::{CompartmentEngine, EngineError, compartment_key, source_asset};
use crate::catalog::{Catalog, CatalogError};
use crate::emitter::{EventBuffer, RequestContext};
use crate::reservation::CompartmentKey;
use crate::store::CompartmentStore;

/// Drop type of items a character throws on the ground.
pub const CHARACTER_DROP_TYPE: u8 = 2;

/// Offset from a regular equipped slot to its cash-cosmetic counterpart.
const CASH_SLOT_OFFSET: i16 = 100;

fn ensure_equip_compartment(inventory_type: InventoryType) -> Result<(), EngineError> {
    if inventory_type != InventoryType::Equip {
        return Err(EngineError::type_mismatch(format!(
            "{inventory_type} assets cannot be equipped"
        )));
    }
    Ok(())
}

/// Two assets pour into each other instead of swapping.
fn stacks_merge(source: &Asset, target: &Asset) -> bool {
    source.template_id() == target.template_id()
        && source.reference_type() == target.reference_type()
        && source.is_stackable()
        && !source.reference().is_rechargeable()
        && !target.reference().is_rechargeable()
}

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Move equipment from the grid onto the character.
    ///
    /// Destination 0 picks the template's preferred slot. Whatever was equipped
    /// there goes back to the vacated grid slot. Returns the equipped slot.
    pub fn equip(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: MoveBody,
    ) -> Result<i16, EngineError> {
        self.execute(ctx, character_id, inventory_type, "equip", |events| {
            ensure_equip_compartment(inventory_type)?;
            let compartment = self.load(ctx, character_id, inventory_type)?;
            if body.source <= 0 {
                return Err(EngineError::validation(format!(
                    "slot {} is not an inventory slot",
                    body.source
                )));
            }
            let asset = source_asset(&compartment, body.source)?;
            let Some(equipable) = asset.reference().equipable() else {
                return Err(EngineError::type_mismatch(format!(
                    "asset at slot {} is not equipment",
                    body.source
                )));
            };

            let destination = if body.destination != 0 {
                if body.destination > 0 {
                    return Err(EngineError::validation(format!(
                        "slot {} is not an equipped slot",
                        body.destination
                    )));
                }
                body.destination
            } else {
                let template_id = asset.template_id();
                let preferred = self
                    .catalog
                    .slot_destinations(template_id)?
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        CatalogError::Malformed(format!(
                            "template {template_id} has no equipped slot"
                        ))
                    })?;
                if equipable.cash || self.catalog.is_cash_equipment(template_id)? {
                    preferred.checked_sub(CASH_SLOT_OFFSET).ok_or_else(|| {
                        CatalogError::Malformed(format!(
                            "template {template_id} has no cash slot for {preferred}"
                        ))
                    })?
                } else {
                    preferred
                }
            };

            let occupant = compartment.asset_at(destination).cloned();
            let key = compartment_key(ctx, character_id, inventory_type);
            self.swap_into(ctx, events, character_id, key, asset, destination, occupant)?;
            Ok(destination)
        })
    }

    /// Move equipment from the character back into the grid.
    ///
    /// Falls back to the lowest free slot when the destination is 0 or taken.
    pub fn unequip(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: MoveBody,
    ) -> Result<i16, EngineError> {
        self.execute(ctx, character_id, inventory_type, "unequip", |events| {
            ensure_equip_compartment(inventory_type)?;
            let compartment = self.load(ctx, character_id, inventory_type)?;
            if body.source >= 0 {
                return Err(EngineError::validation(format!(
                    "slot {} is not an equipped slot",
                    body.source
                )));
            }
            let asset = source_asset(&compartment, body.source)?;
            let destination = if compartment.is_slot_free(body.destination) {
                body.destination
            } else {
                compartment
                    .next_free_slot()
                    .ok_or(EngineError::CompartmentFull)?
            };

            let key = compartment_key(ctx, character_id, inventory_type);
            self.swap_into(ctx, events, character_id, key, asset, destination, None)?;
            Ok(destination)
        })
    }

    /// Move an asset between two grid slots.
    ///
    /// An empty destination is a plain move. Same-template stacks merge up to the
    /// stack limit. Anything else swaps places.
    pub fn move_asset(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: MoveBody,
    ) -> Result<(), EngineError> {
        self.execute(ctx, character_id, inventory_type, "move", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let (source, destination) = (body.source, body.destination);
            if source <= 0 || destination <= 0 {
                return Err(EngineError::validation(format!(
                    "move from {source} to {destination} leaves the grid"
                )));
            }
            if source == destination {
                return Err(EngineError::validation(format!(
                    "move from {source} to itself"
                )));
            }
            compartment.ensure_slot_in_range(destination)?;
            let asset = source_asset(&compartment, source)?;
            let key = compartment_key(ctx, character_id, inventory_type);

            match compartment.asset_at(destination).cloned() {
                Some(target) if stacks_merge(&asset, &target) => {
                    let slot_max = self.catalog.item_metadata(asset.template_id())?.slot_max;
                    if target.quantity() >= slot_max {
                        return self.swap_into(
                            ctx,
                            events,
                            character_id,
                            key,
                            asset,
                            destination,
                            Some(target),
                        );
                    }
                    self.merge_into(ctx, events, character_id, key, asset, target, slot_max)
                }
                occupant => self.swap_into(
                    ctx,
                    events,
                    character_id,
                    key,
                    asset,
                    destination,
                    occupant,
                ),
            }
        })
    }

    /// Put `asset` at `destination`, sending `occupant` to the vacated slot.
    /// Holds travel with their assets.
    #[allow(clippy::too_many_arguments)]
    fn swap_into(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        key: CompartmentKey,
        asset: Asset,
        destination: i16,
        occupant: Option<Asset>,
    ) -> Result<(), EngineError> {
        let source = asset.slot();
        let moved = asset.with_slot(destination);
        self.store.update_asset(ctx.tenant_id, &moved)?;
        events.asset_moved(character_id, &moved, source);

        if let Some(occupant) = occupant {
            let back = occupant.with_slot(source);
            self.store.update_asset(ctx.tenant_id, &back)?;
            events.asset_moved(character_id, &back, destination);
        }
        self.reservations.swap(key, source, destination);
        Ok(())
    }

    /// Pour as much of `source` into `target` as the stack limit allows.
    #[allow(clippy::too_many_arguments)]
    fn merge_into(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        key: CompartmentKey,
        source: Asset,
        target: Asset,
        slot_max: u32,
    ) -> Result<(), EngineError> {
        let poured = (slot_max - target.quantity()).min(source.quantity());
        let left = source.quantity() - poured;
        let reserved = self.reservations.total_reserved(key.at(source.slot()));
        if reserved > left {
            return Err(EngineError::conflict(format!(
                "slot {} has {reserved} reserved; merging would leave {left}",
                source.slot()
            )));
        }

        let total = target.quantity() + poured;
        let merged = target.with_quantity(total);
        self.store.update_asset(ctx.tenant_id, &merged)?;
        events.asset_quantity_changed(character_id, &merged);

        if left == 0 {
            self.store
                .delete_asset(ctx.tenant_id, source.compartment_id(), source.id())?;
            events.asset_deleted(character_id, &source);
        } else {
            let remaining = source.with_quantity(left);
            self.store.update_asset(ctx.tenant_id, &remaining)?;
            events.asset_quantity_changed(character_id, &remaining);
        }
        Ok(())
    }

    /// Throw `quantity` of the asset at `source` onto the map.
    ///
    /// The asset leaves the compartment here; the drop itself is spawned by the
    /// map service in response to the queued spawn command.
    pub fn drop_asset(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: DropBody,
    ) -> Result<(), EngineError> {
        self.execute(ctx, character_id, inventory_type, "drop", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            if body.source == 0 {
                return Err(EngineError::validation("slot 0 holds nothing"));
            }
            let asset = source_asset(&compartment, body.source)?;
            if body.quantity == 0 {
                return Err(EngineError::validation("drop quantity must be positive"));
            }
            if !asset.is_stackable() && body.quantity != 1 {
                return Err(EngineError::validation(format!(
                    "asset at slot {} is a single piece",
                    body.source
                )));
            }
            let key = compartment_key(ctx, character_id, inventory_type).at(body.source);
            let available = self.available(key, &asset, Some(ctx.transaction_id));
            if body.quantity > available {
                return Err(EngineError::InsufficientQuantity {
                    slot: body.source,
                    item_id: asset.template_id(),
                    requested: body.quantity,
                    available,
                });
            }

            let item_id = asset.template_id();
            let equipment_id = if asset.reference_type() == ReferenceType::Equipable {
                asset.reference_id()
            } else {
                0
            };

            self.fulfil(key, ctx.transaction_id);
            self.debit(ctx, events, character_id, asset, body.quantity)?;
            events.drop_command(DropCommand::spawn(
                ctx.transaction_id,
                character_id,
                SpawnFromCharacterBody {
                    world_id: body.world_id,
                    channel_id: body.channel_id,
                    map_id: body.map_id,
                    instance: body.instance,
                    item_id,
                    equipment_id,
                    quantity: body.quantity,
                    drop_type: CHARACTER_DROP_TYPE,
                    x: body.x,
                    y: body.y,
                    owner_id: character_id,
                    owner_party_id: 0,
                    dropper_id: character_id,
                },
            ));
            Ok(())
        })
    }
}
