use std::collections::HashMap;

use serde_json::Value as JsonValue;

use stowage_core::{CharacterId, TemplateId};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    Compartment, CompartmentStatusBody, InventoryType, TypeBody, compact_and_sort, plan_merge,
};

use super::{CompartmentEngine, EngineError, compartment_key};
use crate::catalog::Catalog;
use crate::emitter::{EventBuffer, RequestContext};
use crate::store::CompartmentStore;

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Pack the grid into slots `1..=n` ordered by template. Returns how many
    /// assets moved.
    pub fn compact_and_sort(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<usize, EngineError> {
        self.execute(ctx, character_id, inventory_type, "compact_and_sort", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            let moved = self.apply_sort(ctx, events, character_id, &compartment)?;
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::SortComplete(TypeBody { inventory_type }),
            );
            Ok(moved)
        })
    }

    /// Fold partial stacks of the same template together, then compact and sort.
    ///
    /// Rechargeable stacks and stacks under an active hold are left alone.
    pub fn merge_and_compact(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<(), EngineError> {
        self.execute(ctx, character_id, inventory_type, "merge_and_compact", |events| {
            let mut compartment = self.load(ctx, character_id, inventory_type)?;
            let key = compartment_key(ctx, character_id, inventory_type);

            let mut limits: HashMap<TemplateId, u32> = HashMap::new();
            for asset in compartment.placed_assets() {
                if asset.is_stackable() && !limits.contains_key(&asset.template_id()) {
                    let metadata = self.catalog.item_metadata(asset.template_id())?;
                    limits.insert(asset.template_id(), metadata.slot_max);
                }
            }

            let plan = plan_merge(
                compartment.assets(),
                |a| {
                    !a.reference().is_rechargeable()
                        && !self.reservations.has_active(key.at(a.slot()))
                },
                |t| limits.get(&t).copied().unwrap_or(1),
            );

            for (asset_id, quantity) in plan.quantity_changes {
                let asset = compartment
                    .asset(asset_id)
                    .cloned()
                    .ok_or(EngineError::AssetNotFound { slot: None })?
                    .with_quantity(quantity);
                self.store.update_asset(ctx.tenant_id, &asset)?;
                events.asset_quantity_changed(character_id, &asset);
                compartment.replace_asset(asset);
            }
            for asset_id in plan.removals {
                if let Some(asset) = compartment.remove_asset(asset_id) {
                    self.store
                        .delete_asset(ctx.tenant_id, compartment.id(), asset_id)?;
                    events.asset_deleted(character_id, &asset);
                }
            }
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::MergeComplete(TypeBody { inventory_type }),
            );

            self.apply_sort(ctx, events, character_id, &compartment)?;
            events.compartment(
                character_id,
                compartment.id(),
                CompartmentStatusBody::SortComplete(TypeBody { inventory_type }),
            );
            Ok(())
        })
    }

    fn apply_sort(
        &self,
        ctx: RequestContext,
        events: &mut EventBuffer,
        character_id: CharacterId,
        compartment: &Compartment,
    ) -> Result<usize, EngineError> {
        let moves = compact_and_sort(compartment.assets());
        for step in &moves {
            let asset = compartment
                .asset(step.asset_id)
                .cloned()
                .ok_or(EngineError::asset_not_found(step.from))?
                .with_slot(step.to);
            self.store.update_asset(ctx.tenant_id, &asset)?;
            events.asset_moved(character_id, &asset, step.from);
        }

        let relocations: Vec<(i16, i16)> = moves.iter().map(|m| (m.from, m.to)).collect();
        self.reservations.relocate(
            compartment_key(ctx, character_id, compartment.inventory_type()),
            &relocations,
        );
        Ok(moves.len())
    }
}
