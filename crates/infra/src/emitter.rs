//! Event emission layer.
//!
//! Outbound messages produced while a command runs are buffered and published only
//! after the compartment lock is released. A publish failure is logged and dropped:
//! the mutation is already committed and upstream redelivery owns retries.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::error;

use stowage_core::{CharacterId, CompartmentId, TenantId, TransactionId};
use stowage_events::{EventBus, Message, MessageEnvelope};
use stowage_inventory::{
    Asset, AssetStatusEvent, CompartmentStatusBody, CompartmentStatusEvent, DropCommand,
};

/// Tenant and causal transaction of the command being executed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, transaction_id: TransactionId) -> Self {
        Self {
            tenant_id,
            transaction_id,
        }
    }
}

/// Messages queued by one unit of work.
#[derive(Debug)]
pub struct EventBuffer {
    ctx: RequestContext,
    pending: Vec<MessageEnvelope<JsonValue>>,
}

impl EventBuffer {
    pub fn new(ctx: RequestContext) -> Self {
        Self {
            ctx,
            pending: Vec::new(),
        }
    }

    pub fn push<M: Message + Serialize>(&mut self, message: M) {
        match MessageEnvelope::encode(self.ctx.tenant_id, self.ctx.transaction_id, &message) {
            Ok(envelope) => self.pending.push(envelope),
            Err(err) => error!(
                message_type = message.message_type(),
                topic = message.topic(),
                error = %err,
                "failed to encode outbound message"
            ),
        }
    }

    pub fn asset_created(&mut self, character_id: CharacterId, asset: &Asset) {
        self.push(AssetStatusEvent::created(self.ctx.transaction_id, character_id, asset));
    }

    pub fn asset_deleted(&mut self, character_id: CharacterId, asset: &Asset) {
        self.push(AssetStatusEvent::deleted(self.ctx.transaction_id, character_id, asset));
    }

    pub fn asset_moved(&mut self, character_id: CharacterId, asset: &Asset, old_slot: i16) {
        self.push(AssetStatusEvent::moved(
            self.ctx.transaction_id,
            character_id,
            asset,
            old_slot,
        ));
    }

    pub fn asset_quantity_changed(&mut self, character_id: CharacterId, asset: &Asset) {
        self.push(AssetStatusEvent::quantity_changed(
            self.ctx.transaction_id,
            character_id,
            asset,
        ));
    }

    pub fn compartment(
        &mut self,
        character_id: CharacterId,
        compartment_id: CompartmentId,
        body: CompartmentStatusBody,
    ) {
        self.push(CompartmentStatusEvent::new(
            self.ctx.transaction_id,
            character_id,
            compartment_id,
            body,
        ));
    }

    pub fn drop_command(&mut self, command: DropCommand) {
        self.push(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Publish everything in order. Returns how many messages the bus accepted.
    pub fn flush<B>(self, bus: &B) -> usize
    where
        B: EventBus<MessageEnvelope<JsonValue>> + ?Sized,
    {
        let mut published = 0;
        for envelope in self.pending {
            let topic = envelope.topic().to_string();
            match bus.publish(envelope) {
                Ok(()) => published += 1,
                Err(err) => error!(
                    tenant_id = %self.ctx.tenant_id,
                    transaction_id = %self.ctx.transaction_id,
                    topic = %topic,
                    error = ?err,
                    "failed to publish outbound message"
                ),
            }
        }
        published
    }
}
