//! Inbound compartment commands.
//!
//! Commands arrive as a loosely typed [`RawCommand`] (`type` + JSON `body`) and are
//! decoded into a closed [`CompartmentCommand`]. Unknown `type` values decode to
//! `None` so newer producers never break older consumers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stowage_core::{AssetId, CharacterId, DomainError, TemplateId, TransactionId};
use stowage_events::Message;
use stowage_events::topic::COMMAND_TOPIC_COMPARTMENT;

use crate::inventory_type::InventoryType;
use crate::reference::ReferenceData;

/// Wire discriminators of inbound compartment commands.
pub mod command_type {
    pub const EQUIP: &str = "EQUIP";
    pub const UNEQUIP: &str = "UNEQUIP";
    pub const MOVE: &str = "MOVE";
    pub const DROP: &str = "DROP";
    pub const REQUEST_RESERVE: &str = "REQUEST_RESERVE";
    pub const CANCEL_RESERVATION: &str = "CANCEL_RESERVATION";
    pub const CONSUME: &str = "CONSUME";
    pub const DESTROY: &str = "DESTROY";
    pub const CREATE_ASSET: &str = "CREATE_ASSET";
    pub const RECHARGE: &str = "RECHARGE";
    pub const INCREASE_CAPACITY: &str = "INCREASE_CAPACITY";
    pub const SORT: &str = "SORT";
    pub const MERGE: &str = "MERGE";
    pub const ACCEPT: &str = "ACCEPT";
    pub const RELEASE: &str = "RELEASE";

    pub const ALL: [&str; 15] = [
        EQUIP,
        UNEQUIP,
        MOVE,
        DROP,
        REQUEST_RESERVE,
        CANCEL_RESERVATION,
        CONSUME,
        DESTROY,
        CREATE_ASSET,
        RECHARGE,
        INCREASE_CAPACITY,
        SORT,
        MERGE,
        ACCEPT,
        RELEASE,
    ];
}

#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error("malformed {command_type} body: {source}")]
    Body {
        command_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    InventoryType(#[from] DomainError),
}

/// Command as it travels on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommand {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    pub inventory_type: u8,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub body: JsonValue,
}

impl RawCommand {
    /// Decode into a typed command. `Ok(None)` means the type is not one we handle.
    pub fn decode(&self) -> Result<Option<CompartmentCommand>, CommandDecodeError> {
        let Some(command_type) = command_type::ALL
            .iter()
            .copied()
            .find(|t| *t == self.command_type)
        else {
            return Ok(None);
        };

        let inventory_type = InventoryType::try_from(self.inventory_type)?;
        let body = CommandBody::decode(command_type, &self.body)?;

        Ok(Some(CompartmentCommand {
            transaction_id: self.transaction_id,
            character_id: self.character_id,
            inventory_type,
            body,
        }))
    }
}

impl Message for RawCommand {
    fn topic(&self) -> &'static str {
        COMMAND_TOPIC_COMPARTMENT
    }

    fn key(&self) -> String {
        self.character_id.to_string()
    }

    fn message_type(&self) -> &'static str {
        command_type::ALL
            .iter()
            .copied()
            .find(|t| *t == self.command_type)
            .unwrap_or("UNKNOWN")
    }
}

/// A decoded command addressed to one compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct CompartmentCommand {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    pub inventory_type: InventoryType,
    pub body: CommandBody,
}

impl CompartmentCommand {
    pub fn new(
        transaction_id: TransactionId,
        character_id: CharacterId,
        inventory_type: InventoryType,
        body: CommandBody,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            inventory_type,
            body,
        }
    }

    /// Re-encode for the wire.
    pub fn to_raw(&self) -> Result<RawCommand, serde_json::Error> {
        Ok(RawCommand {
            transaction_id: self.transaction_id,
            character_id: self.character_id,
            inventory_type: self.inventory_type.code(),
            command_type: self.body.command_type().to_string(),
            body: self.body.to_json()?,
        })
    }
}

/// Source and destination slot of a relocation (equip, unequip, move).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBody {
    pub source: i16,
    /// `0` lets the engine choose (equip: catalog destination, unequip: next free slot).
    #[serde(default)]
    pub destination: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropBody {
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    #[serde(default)]
    pub instance: u32,
    pub source: i16,
    pub quantity: u32,
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveItem {
    pub source: i16,
    pub item_id: TemplateId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReserveBody {
    pub items: Vec<ReserveItem>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationBody {
    pub slot: i16,
    /// Defaults to the command's transaction id.
    #[serde(default)]
    pub reservation_id: Option<TransactionId>,
}

/// Body of commands that address a single source slot (consume, recharge).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBody {
    pub source: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyBody {
    pub source: i16,
    /// `0` destroys the whole stack.
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetBody {
    pub template_id: TemplateId,
    #[serde(default = "one")]
    pub quantity: u32,
    /// `0` picks the next free slot.
    #[serde(default)]
    pub slot: i16,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
    #[serde(default)]
    pub rechargeable: bool,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseCapacityBody {
    pub amount: u32,
}

/// An asset handed over from another owner, carrying its full reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub template_id: TemplateId,
    #[serde(default)]
    pub reference_id: u32,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub reference: ReferenceData,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBody {
    pub asset_id: AssetId,
}

/// Typed command payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandBody {
    Equip(MoveBody),
    Unequip(MoveBody),
    Move(MoveBody),
    Drop(DropBody),
    RequestReserve(RequestReserveBody),
    CancelReservation(CancelReservationBody),
    Consume(SourceBody),
    Destroy(DestroyBody),
    CreateAsset(CreateAssetBody),
    Recharge(SourceBody),
    IncreaseCapacity(IncreaseCapacityBody),
    Sort,
    Merge,
    Accept(AcceptBody),
    Release(ReleaseBody),
}

impl CommandBody {
    pub fn command_type(&self) -> &'static str {
        use crate::command::command_type as t;
        match self {
            CommandBody::Equip(_) => t::EQUIP,
            CommandBody::Unequip(_) => t::UNEQUIP,
            CommandBody::Move(_) => t::MOVE,
            CommandBody::Drop(_) => t::DROP,
            CommandBody::RequestReserve(_) => t::REQUEST_RESERVE,
            CommandBody::CancelReservation(_) => t::CANCEL_RESERVATION,
            CommandBody::Consume(_) => t::CONSUME,
            CommandBody::Destroy(_) => t::DESTROY,
            CommandBody::CreateAsset(_) => t::CREATE_ASSET,
            CommandBody::Recharge(_) => t::RECHARGE,
            CommandBody::IncreaseCapacity(_) => t::INCREASE_CAPACITY,
            CommandBody::Sort => t::SORT,
            CommandBody::Merge => t::MERGE,
            CommandBody::Accept(_) => t::ACCEPT,
            CommandBody::Release(_) => t::RELEASE,
        }
    }

    fn decode(command_type: &'static str, body: &JsonValue) -> Result<Self, CommandDecodeError> {
        use crate::command::command_type as t;
        let decoded = match command_type {
            t::EQUIP => CommandBody::Equip(parse(command_type, body)?),
            t::UNEQUIP => CommandBody::Unequip(parse(command_type, body)?),
            t::MOVE => CommandBody::Move(parse(command_type, body)?),
            t::DROP => CommandBody::Drop(parse(command_type, body)?),
            t::REQUEST_RESERVE => CommandBody::RequestReserve(parse(command_type, body)?),
            t::CANCEL_RESERVATION => CommandBody::CancelReservation(parse(command_type, body)?),
            t::CONSUME => CommandBody::Consume(parse(command_type, body)?),
            t::DESTROY => CommandBody::Destroy(parse(command_type, body)?),
            t::CREATE_ASSET => CommandBody::CreateAsset(parse(command_type, body)?),
            t::RECHARGE => CommandBody::Recharge(parse(command_type, body)?),
            t::INCREASE_CAPACITY => CommandBody::IncreaseCapacity(parse(command_type, body)?),
            t::SORT => CommandBody::Sort,
            t::MERGE => CommandBody::Merge,
            t::ACCEPT => CommandBody::Accept(parse(command_type, body)?),
            _ => CommandBody::Release(parse(command_type, body)?),
        };
        Ok(decoded)
    }

    fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            CommandBody::Equip(b) | CommandBody::Unequip(b) | CommandBody::Move(b) => {
                serde_json::to_value(b)
            }
            CommandBody::Drop(b) => serde_json::to_value(b),
            CommandBody::RequestReserve(b) => serde_json::to_value(b),
            CommandBody::CancelReservation(b) => serde_json::to_value(b),
            CommandBody::Consume(b) | CommandBody::Recharge(b) => serde_json::to_value(b),
            CommandBody::Destroy(b) => serde_json::to_value(b),
            CommandBody::CreateAsset(b) => serde_json::to_value(b),
            CommandBody::IncreaseCapacity(b) => serde_json::to_value(b),
            CommandBody::Sort | CommandBody::Merge => Ok(JsonValue::Object(Default::default())),
            CommandBody::Accept(b) => serde_json::to_value(b),
            CommandBody::Release(b) => serde_json::to_value(b),
        }
    }
}

fn parse<T: DeserializeOwned>(
    command_type: &'static str,
    body: &JsonValue,
) -> Result<T, CommandDecodeError> {
    T::deserialize(body).map_err(|source| CommandDecodeError::Body {
        command_type,
        source,
    })
}
