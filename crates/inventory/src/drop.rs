//! Messages exchanged with the map/drop service.
//!
//! Dropping is a saga: the compartment is debited first and a spawn command is sent
//! afterwards (at least attempted, never rolled back). Picking up runs the other way:
//! the drop service grants a reservation, the pickup is attempted here, and either a
//! pick-up confirmation or a cancellation goes back.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stowage_core::{CharacterId, TemplateId, TransactionId};
use stowage_events::Message;
use stowage_events::topic::{COMMAND_TOPIC_DROP, EVENT_TOPIC_DROP_STATUS};

/// Status type of a granted pickup reservation.
pub const DROP_STATUS_RESERVED: &str = "RESERVED";

/// Outbound command for the drop service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCommand {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    #[serde(flatten)]
    pub body: DropCommandBody,
}

impl DropCommand {
    pub fn spawn(
        transaction_id: TransactionId,
        character_id: CharacterId,
        body: SpawnFromCharacterBody,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            body: DropCommandBody::SpawnFromCharacter(body),
        }
    }

    pub fn request_pick_up(
        transaction_id: TransactionId,
        character_id: CharacterId,
        drop_id: u32,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            body: DropCommandBody::RequestPickUp(PickUpBody {
                drop_id,
                character_id,
            }),
        }
    }

    /// Compensation after a pickup could not be completed.
    pub fn cancel_reservation(
        transaction_id: TransactionId,
        character_id: CharacterId,
        drop_id: u32,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            body: DropCommandBody::CancelReservation(PickUpBody {
                drop_id,
                character_id,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropCommandBody {
    SpawnFromCharacter(SpawnFromCharacterBody),
    RequestPickUp(PickUpBody),
    CancelReservation(PickUpBody),
}

/// Everything the drop service needs to materialise a dropped item on the map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnFromCharacterBody {
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    pub instance: u32,
    pub item_id: TemplateId,
    /// Reference id of the equipment; `0` for plain items.
    pub equipment_id: u32,
    pub quantity: u32,
    pub drop_type: u8,
    pub x: i16,
    pub y: i16,
    pub owner_id: CharacterId,
    pub owner_party_id: u32,
    pub dropper_id: CharacterId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickUpBody {
    pub drop_id: u32,
    pub character_id: CharacterId,
}

impl Message for DropCommand {
    fn topic(&self) -> &'static str {
        COMMAND_TOPIC_DROP
    }

    fn key(&self) -> String {
        self.character_id.to_string()
    }

    fn message_type(&self) -> &'static str {
        match self.body {
            DropCommandBody::SpawnFromCharacter(_) => "SPAWN_FROM_CHARACTER",
            DropCommandBody::RequestPickUp(_) => "REQUEST_PICK_UP",
            DropCommandBody::CancelReservation(_) => "CANCEL_RESERVATION",
        }
    }
}

/// Inbound status event from the drop service.
///
/// Only `RESERVED` concerns this service; other types are ignored by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropStatusEvent {
    pub transaction_id: TransactionId,
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(default)]
    pub body: JsonValue,
}

impl DropStatusEvent {
    pub fn reserved(
        transaction_id: TransactionId,
        reserved: &DropReserved,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            transaction_id,
            status_type: DROP_STATUS_RESERVED.to_string(),
            body: serde_json::to_value(reserved)?,
        })
    }

    /// The granted reservation, if this is a `RESERVED` event.
    pub fn as_reserved(&self) -> Result<Option<DropReserved>, serde_json::Error> {
        if self.status_type != DROP_STATUS_RESERVED {
            return Ok(None);
        }
        DropReserved::deserialize(&self.body).map(Some)
    }
}

impl Message for DropStatusEvent {
    fn topic(&self) -> &'static str {
        EVENT_TOPIC_DROP_STATUS
    }

    fn key(&self) -> String {
        self.body
            .get("characterId")
            .and_then(JsonValue::as_u64)
            .map(|id| id.to_string())
            .unwrap_or_default()
    }

    fn message_type(&self) -> &'static str {
        if self.status_type == DROP_STATUS_RESERVED {
            DROP_STATUS_RESERVED
        } else {
            "UNKNOWN"
        }
    }
}

/// A pickup claim granted by the drop service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropReserved {
    pub drop_id: u32,
    pub character_id: CharacterId,
    pub item_id: TemplateId,
    /// `0` for plain items; otherwise the equipment to materialise.
    #[serde(default)]
    pub equipment_id: u32,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

impl DropReserved {
    pub fn is_equipment(&self) -> bool {
        self.equipment_id != 0
    }
}
