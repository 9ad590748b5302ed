use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tracing::debug;

use stowage_core::{CharacterId, CompartmentId, TemplateId};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    CancelReservationBody, CompartmentStatusBody, InventoryType, RequestReserveBody,
    ReservationBody,
};

use super::{CompartmentEngine, EngineError, compartment_key};
use crate::catalog::Catalog;
use crate::emitter::RequestContext;
use crate::reservation::Reservation;
use crate::store::CompartmentStore;

impl<S, C, B> CompartmentEngine<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    /// Place holds for every requested `(slot, item, quantity)` or for none.
    ///
    /// Lines naming the same slot are summed. Holds are keyed by the request's
    /// transaction id, so a redelivered request replaces its own holds instead of
    /// stacking on top of them.
    pub fn request_reserve(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: RequestReserveBody,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.execute(ctx, character_id, inventory_type, "request_reserve", |events| {
            let compartment = self.load(ctx, character_id, inventory_type)?;
            if body.items.is_empty() {
                return Err(EngineError::validation("nothing to reserve"));
            }

            let mut requested: BTreeMap<i16, (TemplateId, u32)> = BTreeMap::new();
            for item in &body.items {
                if item.quantity == 0 {
                    return Err(EngineError::validation(format!(
                        "reservation of slot {} must be positive",
                        item.source
                    )));
                }
                let line = requested.entry(item.source).or_insert((item.item_id, 0));
                if line.0 != item.item_id {
                    return Err(EngineError::validation(format!(
                        "slot {} requested as both {} and {}",
                        item.source, line.0, item.item_id
                    )));
                }
                line.1 = line.1.checked_add(item.quantity).ok_or_else(|| {
                    EngineError::validation(format!(
                        "reservation of slot {} exceeds any stack",
                        item.source
                    ))
                })?;
            }

            let key = compartment_key(ctx, character_id, inventory_type);
            for (slot, (item_id, quantity)) in &requested {
                let asset = compartment
                    .asset_at(*slot)
                    .ok_or(EngineError::asset_not_found(*slot))?;
                if asset.template_id() != *item_id {
                    return Err(EngineError::type_mismatch(format!(
                        "slot {slot} holds {}, not {item_id}",
                        asset.template_id()
                    )));
                }
                let available = self.available(key.at(*slot), asset, Some(ctx.transaction_id));
                if *quantity > available {
                    return Err(EngineError::InsufficientQuantity {
                        slot: *slot,
                        item_id: *item_id,
                        requested: *quantity,
                        available,
                    });
                }
            }

            let mut placed = Vec::with_capacity(requested.len());
            for (slot, (item_id, quantity)) in requested {
                let hold = self.reservations.add(
                    key.at(slot),
                    ctx.transaction_id,
                    item_id,
                    quantity,
                    self.config.reservation_ttl,
                );
                events.compartment(
                    character_id,
                    compartment.id(),
                    CompartmentStatusBody::Reserved(ReservationBody {
                        reservation_id: hold.id,
                        item_id,
                        slot,
                        quantity,
                    }),
                );
                placed.push(hold);
            }
            Ok(placed)
        })
    }

    /// Release a hold. Cancelling a hold that is already gone succeeds silently.
    ///
    /// The hold id defaults to the command's transaction id.
    pub fn cancel_reservation(
        &self,
        ctx: RequestContext,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: CancelReservationBody,
    ) -> Result<Option<Reservation>, EngineError> {
        self.execute(ctx, character_id, inventory_type, "cancel_reservation", |events| {
            let compartment_id = self
                .store
                .find_compartment(ctx.tenant_id, character_id, inventory_type)?
                .map(|c| c.id())
                .unwrap_or_else(CompartmentId::nil);
            let id = body.reservation_id.unwrap_or(ctx.transaction_id);
            let key = compartment_key(ctx, character_id, inventory_type).at(body.slot);
            let Ok(hold) = self.reservations.remove(key, id) else {
                debug!(
                    transaction_id = %id,
                    character_id = %character_id,
                    slot = body.slot,
                    "reservation already released"
                );
                return Ok(None);
            };

            events.compartment(
                character_id,
                compartment_id,
                CompartmentStatusBody::ReservationCancelled(ReservationBody {
                    reservation_id: hold.id,
                    item_id: hold.item_id,
                    slot: body.slot,
                    quantity: hold.quantity,
                }),
            );
            Ok(Some(hold))
        })
    }
}
