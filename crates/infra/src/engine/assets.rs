use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stowage_core::{CharacterId, TemplateId};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    AcceptBody, AcceptedBody, Asset, CashData, Compartment, CompartmentStatusBody,
    ConsumableData, CreateAssetBody, DestroyBody, EquipableData, InventoryType, NewAsset,
    ReferenceData, ReferenceType, ReleaseBody, ReleasedBody, StackableData,
};

use super::{CompartmentEngine, EngineError, compartment_key, source_asset};
use crate::catalog::Catalog;
use crate::emitter::{EventBuffer, RequestContext};
use crate::store::CompartmentStore;

/// Where an incoming quantity of one template lands.
#[derive(Debug, Default)]
struct StackPlacement {
    /// Existing stacks and their quantity after topping up.
    top_ups: Vec<(Asset, u32)>,
    /// Free slots and the quantity of the new stack created there.
    new_stacks: Vec<(i16, u32)>,
}

/// Spread `quantity` over existing stacks (when `merge`) and then free slots.
///
/// `requested_slot`, when free, is used before any other free slot.
fn plan_stack_placement(
    compartment: &Compartment,
    template_id: TemplateId,
    quantity: u32,
    slot_max: u32,
    requested_slot: i16,
    merge: bool,
) -> Result<StackPlacement, EngineError> {
    let mut remaining = quantity;
    let mut placement = StackPlacement::default();

    if merge {
        for stack in compartment.stacks_of(template_id) {
            if remaining == 0 {
                break;
            }
            if stack.reference().is_rechargeable() {
                continue;
            }
            let room = slot_max.saturating_sub(stack.quantity());
            if room == 0 {
                continue;
            }
            let added = room.min(remaining);
            placement.top_ups.push((stack.clone(), stack.quantity() + added));
            remaining -= added;
        }
    }

    let mut open = compartment.open_slots();
    if let Some(pos) = open.iter().position(|s| *s == requested_slot) {
        let slot = open.remove(pos);
        open.insert(0, slot);
    }
    let mut open = open.into_iter();
    while remaining > 0 {
        let slot = open.next().ok_or(EngineError::CompartmentFull)?;
        let size = remaining.min(slot_max);
        placement.new_stacks.push((slot, size));
        remaining -= size;
    }
    Ok(placement)
}

/// `requested` if it is a free grid slot, otherwise the lowest free one.
fn pick_slot(compartment: &Compartment, requested: i16) -> Result<i16, EngineError> {
    if compartment.is_slot_free(requested) {
        return Ok(requested);
    }
    compartment.next_free_slot().ok_or(EngineError::CompartmentFull)
}

fn ensure_template_matches(
    inventory_type: InventoryType,
    template_id: TemplateId,
) -> Result<(), EngineError> {
    let belongs_to = InventoryType::from_template(template_id)?;
    if belongs_to != inventory_type {
        return Err(EngineError::type_mismatch(format!(
            "template {template_id} belongs in {belongs_to}, not {inventory_type}"
        )));
    }
    Ok(())
}

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Materialise new assets from a template.
    ///
    /// Stackable quantity first tops up existing stacks of the template, then
    /// fills new stacks of at most the template's stack limit.
    pub fn create_asset(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: CreateAssetBody,
    ) -> Result<Vec<Asset>, EngineError> {
        self.execute(ctx, character_id, inventory_type, "create_asset", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            self.create_in(ctx, events, character_id, &compartment, &body)
        })
    }

    /// Body of `create_asset`; the caller holds the compartment lock.
    pub(super) fn create_in(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        compartment: &Compartment,
        body: &CreateAssetBody,
    ) -> Result<Vec<Asset>, EngineError> {
        let inventory_type = compartment.inventory_type();
        let template_id = body.template_id;
        ensure_template_matches(inventory_type, template_id)?;
        if body.quantity == 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        if body.slot < 0 {
            return Err(EngineError::validation(format!(
                "assets are created in the grid, not slot {}",
                body.slot
            )));
        }

        let reference_type = ReferenceType::for_template(inventory_type, template_id);
        match reference_type {
            ReferenceType::Equipable => {
                if body.quantity != 1 {
                    return Err(EngineError::validation(
                        "equipment is created one piece at a time",
                    ));
                }
                let slot = pick_slot(compartment, body.slot)?;
                let created = self.catalog.create_equipment(template_id)?;
                let reference = ReferenceData::Equipable(EquipableData {
                    owner_id: body.owner_id,
                    flag: body.flag,
                    ..created.data
                });
                let asset = self.store.insert_asset(
                    ctx.tenant_id,
                    compartment.id(),
                    NewAsset::new(slot, template_id, reference)
                        .with_expiration(body.expiration)
                        .with_reference_id(created.equipment_id),
                )?;
                events.asset_created(character_id, &asset);
                Ok(vec![asset])
            }
            ReferenceType::Pet => {
                if body.quantity != 1 {
                    return Err(EngineError::validation("pets are created one at a time"));
                }
                let slot = pick_slot(compartment, body.slot)?;
                let mut pet = self.catalog.create_pet(template_id, body.owner_id)?;
                pet.flag = body.flag;
                let asset = self.store.insert_asset(
                    ctx.tenant_id,
                    compartment.id(),
                    NewAsset::new(slot, template_id, ReferenceData::Pet(pet))
                        .with_expiration(body.expiration),
                )?;
                events.asset_created(character_id, &asset);
                Ok(vec![asset])
            }
            ReferenceType::Consumable
            | ReferenceType::Setup
            | ReferenceType::Etc
            | ReferenceType::Cash => {
                let metadata = self.catalog.item_metadata(template_id)?;
                let rechargeable = reference_type == ReferenceType::Consumable
                    && (body.rechargeable || metadata.rechargeable);
                let merge = reference_type != ReferenceType::Cash && !rechargeable;

                let placement = plan_stack_placement(
                    compartment,
                    template_id,
                    body.quantity,
                    metadata.slot_max,
                    body.slot,
                    merge,
                )?;
                let references = placement
                    .new_stacks
                    .iter()
                    .map(|(_, quantity)| {
                        self.stack_reference(reference_type, template_id, *quantity, body, rechargeable)
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                self.commit_placement(
                    ctx,
                    events,
                    character_id,
                    compartment,
                    template_id,
                    placement,
                    references,
                    body.expiration,
                )
            }
        }
    }

    fn stack_reference(
        &self,
        reference_type: ReferenceType,
        template_id: TemplateId,
        quantity: u32,
        body: &CreateAssetBody,
        rechargeable: bool,
    ) -> Result<ReferenceData, EngineError> {
        let stackable = StackableData {
            quantity,
            owner_id: body.owner_id,
            flag: body.flag,
        };
        match reference_type {
            ReferenceType::Consumable => Ok(ReferenceData::Consumable(ConsumableData {
                quantity,
                owner_id: body.owner_id,
                flag: body.flag,
                rechargeable,
            })),
            ReferenceType::Setup => Ok(ReferenceData::Setup(stackable)),
            ReferenceType::Etc => Ok(ReferenceData::Etc(stackable)),
            ReferenceType::Cash => {
                let cash = self.catalog.create_cash_item(template_id, quantity)?;
                Ok(ReferenceData::Cash(CashData {
                    owner_id: body.owner_id,
                    flag: body.flag,
                    ..cash
                }))
            }
            ReferenceType::Equipable | ReferenceType::Pet => Err(EngineError::type_mismatch(
                format!("template {template_id} does not stack"),
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_placement(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        compartment: &Compartment,
        template_id: TemplateId,
        placement: StackPlacement,
        references: Vec<ReferenceData>,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<Vec<Asset>, EngineError> {
        let mut touched = Vec::with_capacity(placement.top_ups.len() + references.len());
        for (stack, quantity) in placement.top_ups {
            let updated = stack.with_quantity(quantity);
            self.store.update_asset(ctx.tenant_id, &updated)?;
            events.asset_quantity_changed(character_id, &updated);
            touched.push(updated);
        }
        for ((slot, _), reference) in placement.new_stacks.into_iter().zip(references) {
            let created = self.store.insert_asset(
                ctx.tenant_id,
                compartment.id(),
                NewAsset::new(slot, template_id, reference).with_expiration(expiration),
            )?;
            events.asset_created(character_id, &created);
            touched.push(created);
        }
        Ok(touched)
    }

    /// Use up one unit of the stack at `source`.
    ///
    /// A hold placed by the same transaction is fulfilled by the consumption.
    pub fn consume(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        source: i16,
    ) -> Result<Option<Asset>, EngineError> {
        self.execute(ctx, character_id, inventory_type, "consume", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let asset = source_asset(&compartment, source)?;
            if asset.reference_type() != ReferenceType::Consumable {
                return Err(EngineError::type_mismatch(format!(
                    "asset at slot {source} is not a consumable"
                )));
            }
            let key = compartment_key(ctx, character_id, inventory_type).at(source);
            let available = self.available(key, &asset, Some(ctx.transaction_id));
            if available == 0 {
                return Err(EngineError::InsufficientQuantity {
                    slot: source,
                    item_id: asset.template_id(),
                    requested: 1,
                    available,
                });
            }

            self.fulfil(key, ctx.transaction_id);
            self.debit(ctx, events, character_id, asset, 1)
        })
    }

    /// Remove `quantity` (0 means all) of the asset at `source`.
    pub fn destroy(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: DestroyBody,
    ) -> Result<Option<Asset>, EngineError> {
        self.execute(ctx, character_id, inventory_type, "destroy", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let asset = source_asset(&compartment, body.source)?;
            let quantity = if body.quantity == 0 {
                asset.quantity()
            } else {
                body.quantity
            };
            if !asset.is_stackable() && quantity != 1 {
                return Err(EngineError::validation(format!(
                    "asset at slot {} is a single piece",
                    body.source
                )));
            }
            let key = compartment_key(ctx, character_id, inventory_type).at(body.source);
            let available = self.available(key, &asset, Some(ctx.transaction_id));
            if quantity > available {
                return Err(EngineError::InsufficientQuantity {
                    slot: body.source,
                    item_id: asset.template_id(),
                    requested: quantity,
                    available,
                });
            }

            self.fulfil(key, ctx.transaction_id);
            self.debit(ctx, events, character_id, asset, quantity)
        })
    }

    /// Refill a rechargeable stack to its template's stack limit.
    pub fn recharge(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        source: i16,
    ) -> Result<Asset, EngineError> {
        self.execute(ctx, character_id, inventory_type, "recharge", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let asset = source_asset(&compartment, source)?;
            if !asset.reference().is_rechargeable() {
                return Err(EngineError::type_mismatch(format!(
                    "asset at slot {source} is not rechargeable"
                )));
            }
            let slot_max = self.catalog.item_metadata(asset.template_id())?.slot_max;
            if asset.quantity() >= slot_max {
                return Ok(asset);
            }

            let recharged = asset.with_quantity(slot_max);
            self.store.update_asset(ctx.tenant_id, &recharged)?;
            events.asset_quantity_changed(character_id, &recharged);
            Ok(recharged)
        })
    }

    /// Take in an asset handed over by another holder (storage, trade, shop).
    ///
    /// Stackable quantity joins a stack of the same template that can hold all of
    /// it; otherwise the asset takes the lowest free slot.
    pub fn accept(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: AcceptBody,
    ) -> Result<Asset, EngineError> {
        self.execute(ctx, character_id, inventory_type, "accept", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            ensure_template_matches(inventory_type, body.template_id)?;
            let expected = ReferenceType::for_template(inventory_type, body.template_id);
            if body.reference.reference_type() != expected {
                return Err(EngineError::type_mismatch(format!(
                    "template {} expects {expected:?} data",
                    body.template_id
                )));
            }

            let quantity = body.reference.quantity().unwrap_or(1);
            if quantity == 0 {
                return Err(EngineError::validation("quantity must be positive"));
            }

            let mergeable = matches!(
                expected,
                ReferenceType::Consumable | ReferenceType::Setup | ReferenceType::Etc
            ) && !body.reference.is_rechargeable();
            let target = if mergeable {
                let slot_max = self.catalog.item_metadata(body.template_id)?.slot_max;
                if quantity > slot_max {
                    return Err(EngineError::validation(format!(
                        "{quantity} of template {} exceeds its stack limit of {slot_max}",
                        body.template_id
                    )));
                }
                compartment
                    .stacks_of(body.template_id)
                    .into_iter()
                    .find_map(|s| {
                        let total = s.quantity().checked_add(quantity)?;
                        (!s.reference().is_rechargeable() && total <= slot_max)
                            .then(|| (s.clone(), total))
                    })
            } else {
                None
            };

            let asset = match target {
                Some((stack, total)) => {
                    let merged = stack.with_quantity(total);
                    self.store.update_asset(ctx.tenant_id, &merged)?;
                    events.asset_quantity_changed(character_id, &merged);
                    merged
                }
                None => {
                    let slot = compartment
                        .next_free_slot()
                        .ok_or(EngineError::CompartmentFull)?;
                    let created = self.store.insert_asset(
                        ctx.tenant_id,
                        compartment.id(),
                        NewAsset::new(slot, body.template_id, body.reference.clone())
                            .with_expiration(body.expiration)
                            .with_reference_id(body.reference_id),
                    )?;
                    events.asset_created(character_id, &created);
                    created
                }
            };

            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::Accepted(AcceptedBody {
                    inventory_type,
                    asset_id: asset.id(),
                    slot: asset.slot(),
                }),
            );
            Ok(asset)
        })
    }

    /// Hand an asset over to another holder, removing it from this compartment.
    ///
    /// Fails with a conflict while holds of other transactions cover the asset.
    pub fn release(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: ReleaseBody,
    ) -> Result<Asset, EngineError> {
        self.execute(ctx, character_id, inventory_type, "release", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let asset = compartment
                .asset(body.asset_id)
                .cloned()
                .ok_or(EngineError::AssetNotFound { slot: None })?;
            let key = compartment_key(ctx, character_id, inventory_type).at(asset.slot());
            let held_by_others = self
                .reservations
                .total_reserved_excluding(key, Some(ctx.transaction_id));
            if held_by_others > 0 {
                return Err(EngineError::conflict(format!(
                    "asset {} has {held_by_others} reserved by other transactions",
                    asset.id()
                )));
            }

            self.fulfil(key, ctx.transaction_id);
            self.store
                .delete_asset(ctx.tenant_id, compartment.id(), asset.id())?;
            events.asset_deleted(character_id, &asset);
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::Released(ReleasedBody {
                    inventory_type,
                    asset_id: asset.id(),
                }),
            );
            Ok(asset)
        })
    }
}
