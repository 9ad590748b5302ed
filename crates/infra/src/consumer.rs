//! Inbound message routing.
//!
//! Decodes bus envelopes into compartment commands, drop reservations and
//! character lifecycle events, and drives the engine with them. Delivery is
//! at-least-once; every handler tolerates redelivery.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use stowage_events::topic::{
    COMMAND_TOPIC_COMPARTMENT, EVENT_TOPIC_CHARACTER_STATUS, EVENT_TOPIC_DROP_STATUS,
};
use stowage_events::{EventBus, MessageEnvelope};
use stowage_inventory::{
    CharacterStatus, CharacterStatusEvent, CommandBody, CompartmentCommand, DropStatusEvent,
    RawCommand,
};

use crate::catalog::Catalog;
use crate::emitter::RequestContext;
use crate::engine::{CompartmentEngine, EngineError};
use crate::store::CompartmentStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Handled,
    /// Not addressed to this service, or a type it does not act on.
    Ignored,
}

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("malformed message on {topic}: {reason}")]
    Malformed { topic: String, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ConsumeError {
    fn malformed(topic: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub struct CommandConsumer<S, C, B> {
    engine: Arc<CompartmentEngine<S, C, B>>,
}

impl<S, C, B> Clone for CommandConsumer<S, C, B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S, C, B> CommandConsumer<S, C, B>
where
    S: CompartmentStore,
    C: Catalog,
    B: EventBus<MessageEnvelope<JsonValue>>,
{
    pub fn new(engine: Arc<CompartmentEngine<S, C, B>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<CompartmentEngine<S, C, B>> {
        &self.engine
    }

    pub fn consume(
        &self,
        envelope: &MessageEnvelope<JsonValue>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        match envelope.topic() {
            COMMAND_TOPIC_COMPARTMENT => self.on_compartment_command(envelope),
            EVENT_TOPIC_DROP_STATUS => self.on_drop_status(envelope),
            EVENT_TOPIC_CHARACTER_STATUS => self.on_character_status(envelope),
            _ => Ok(ConsumeOutcome::Ignored),
        }
    }

    fn on_compartment_command(
        &self,
        envelope: &MessageEnvelope<JsonValue>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        let raw: RawCommand = envelope
            .decode()
            .map_err(|e| ConsumeError::malformed(envelope.topic(), e))?;
        let command = match raw.decode() {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(command_type = %raw.command_type, "ignoring unknown command type");
                return Ok(ConsumeOutcome::Ignored);
            }
            Err(err) => return Err(ConsumeError::malformed(envelope.topic(), err)),
        };

        let ctx = RequestContext::new(envelope.tenant_id(), command.transaction_id);
        self.dispatch(ctx, command)?;
        Ok(ConsumeOutcome::Handled)
    }

    /// Route a decoded command to its engine operation.
    pub fn dispatch(
        &self,
        ctx: RequestContext,
        command: CompartmentCommand,
    ) -> Result<(), EngineError> {
        let engine = &self.engine;
        let (character_id, inventory_type) = (command.character_id, command.inventory_type);
        match command.body {
            CommandBody::Equip(body) => engine
                .equip(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::Unequip(body) => engine
                .unequip(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::Move(body) => engine.move_asset(ctx, character_id, inventory_type, body),
            CommandBody::Drop(body) => engine.drop_asset(ctx, character_id, inventory_type, body),
            CommandBody::RequestReserve(body) => engine
                .request_reserve(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::CancelReservation(body) => engine
                .cancel_reservation(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::Consume(body) => engine
                .consume(ctx, character_id, inventory_type, body.source)
                .map(|_| ()),
            CommandBody::Destroy(body) => engine
                .destroy(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::CreateAsset(body) => engine
                .create_asset(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::Recharge(body) => engine
                .recharge(ctx, character_id, inventory_type, body.source)
                .map(|_| ()),
            CommandBody::IncreaseCapacity(body) => engine
                .increase_capacity(ctx, character_id, inventory_type, body.amount)
                .map(|_| ()),
            CommandBody::Sort => engine
                .compact_and_sort(ctx, character_id, inventory_type)
                .map(|_| ()),
            CommandBody::Merge => engine.merge_and_compact(ctx, character_id, inventory_type),
            CommandBody::Accept(body) => engine
                .accept(ctx, character_id, inventory_type, body)
                .map(|_| ()),
            CommandBody::Release(body) => engine
                .release(ctx, character_id, inventory_type, body)
                .map(|_| ()),
        }
    }

    fn on_drop_status(
        &self,
        envelope: &MessageEnvelope<JsonValue>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        let event: DropStatusEvent = envelope
            .decode()
            .map_err(|e| ConsumeError::malformed(envelope.topic(), e))?;
        let Some(reserved) = event
            .as_reserved()
            .map_err(|e| ConsumeError::malformed(envelope.topic(), e))?
        else {
            return Ok(ConsumeOutcome::Ignored);
        };

        let ctx = RequestContext::new(envelope.tenant_id(), event.transaction_id);
        self.engine.attempt_pick_up(ctx, reserved)?;
        Ok(ConsumeOutcome::Handled)
    }

    fn on_character_status(
        &self,
        envelope: &MessageEnvelope<JsonValue>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        let event: CharacterStatusEvent = envelope
            .decode()
            .map_err(|e| ConsumeError::malformed(envelope.topic(), e))?;
        let ctx = RequestContext::new(envelope.tenant_id(), event.transaction_id);

        match event.status() {
            Some(CharacterStatus::Created) => {
                self.engine
                    .create_character_compartments(ctx, event.character_id)?;
            }
            Some(CharacterStatus::Deleted) => {
                self.engine.delete_character(ctx, event.character_id)?;
            }
            None => return Ok(ConsumeOutcome::Ignored),
        }
        Ok(ConsumeOutcome::Handled)
    }
}
