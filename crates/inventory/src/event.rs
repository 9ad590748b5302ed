//! Outbound status events.
//!
//! Every event carries the transaction id of the command that caused it, so callers
//! can correlate request → reservation → commit/abort across services.

use serde::{Deserialize, Serialize};

use stowage_core::{AssetId, CharacterId, CompartmentId, TemplateId, TransactionId};
use stowage_events::Message;
use stowage_events::topic::{EVENT_TOPIC_ASSET_STATUS, EVENT_TOPIC_COMPARTMENT_STATUS};

use crate::asset::Asset;
use crate::inventory_type::InventoryType;
use crate::reference::ReferenceData;

/// Status change of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatusEvent {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    pub compartment_id: CompartmentId,
    pub asset_id: AssetId,
    pub template_id: TemplateId,
    pub slot: i16,
    #[serde(flatten)]
    pub body: AssetStatusBody,
}

impl AssetStatusEvent {
    /// Event describing `asset` as it is *after* the change.
    pub fn new(
        transaction_id: TransactionId,
        character_id: CharacterId,
        asset: &Asset,
        body: AssetStatusBody,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            compartment_id: asset.compartment_id(),
            asset_id: asset.id(),
            template_id: asset.template_id(),
            slot: asset.slot(),
            body,
        }
    }

    pub fn created(transaction_id: TransactionId, character_id: CharacterId, asset: &Asset) -> Self {
        Self::new(
            transaction_id,
            character_id,
            asset,
            AssetStatusBody::Created(asset.reference().clone()),
        )
    }

    pub fn deleted(transaction_id: TransactionId, character_id: CharacterId, asset: &Asset) -> Self {
        Self::new(transaction_id, character_id, asset, AssetStatusBody::Deleted)
    }

    pub fn moved(
        transaction_id: TransactionId,
        character_id: CharacterId,
        asset: &Asset,
        old_slot: i16,
    ) -> Self {
        Self::new(
            transaction_id,
            character_id,
            asset,
            AssetStatusBody::Moved(MovedBody { old_slot }),
        )
    }

    pub fn quantity_changed(
        transaction_id: TransactionId,
        character_id: CharacterId,
        asset: &Asset,
    ) -> Self {
        Self::new(
            transaction_id,
            character_id,
            asset,
            AssetStatusBody::QuantityChanged(QuantityBody {
                quantity: asset.quantity(),
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatusBody {
    Created(ReferenceData),
    Deleted,
    Moved(MovedBody),
    QuantityChanged(QuantityBody),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedBody {
    pub old_slot: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityBody {
    pub quantity: u32,
}

impl Message for AssetStatusEvent {
    fn topic(&self) -> &'static str {
        EVENT_TOPIC_ASSET_STATUS
    }

    fn key(&self) -> String {
        self.character_id.to_string()
    }

    fn message_type(&self) -> &'static str {
        match self.body {
            AssetStatusBody::Created(_) => "CREATED",
            AssetStatusBody::Deleted => "DELETED",
            AssetStatusBody::Moved(_) => "MOVED",
            AssetStatusBody::QuantityChanged(_) => "QUANTITY_CHANGED",
        }
    }
}

/// Status change of a compartment (or a failure to change it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompartmentStatusEvent {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    pub compartment_id: CompartmentId,
    #[serde(flatten)]
    pub body: CompartmentStatusBody,
}

impl CompartmentStatusEvent {
    pub fn new(
        transaction_id: TransactionId,
        character_id: CharacterId,
        compartment_id: CompartmentId,
        body: CompartmentStatusBody,
    ) -> Self {
        Self {
            transaction_id,
            character_id,
            compartment_id,
            body,
        }
    }

    /// Failure report. `compartment_id` is nil when the compartment itself is missing.
    pub fn error(
        transaction_id: TransactionId,
        character_id: CharacterId,
        compartment_id: CompartmentId,
        error_code: ErrorCode,
    ) -> Self {
        Self::new(
            transaction_id,
            character_id,
            compartment_id,
            CompartmentStatusBody::Error(ErrorBody {
                error_code,
                slot: None,
                item_id: None,
            }),
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, CompartmentStatusBody::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompartmentStatusBody {
    Created(CapacityBody),
    Deleted,
    CapacityChanged(CapacityBody),
    Reserved(ReservationBody),
    ReservationCancelled(ReservationBody),
    MergeComplete(TypeBody),
    SortComplete(TypeBody),
    Accepted(AcceptedBody),
    Released(ReleasedBody),
    Error(ErrorBody),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityBody {
    #[serde(rename = "type")]
    pub inventory_type: InventoryType,
    pub capacity: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationBody {
    pub reservation_id: TransactionId,
    pub item_id: TemplateId,
    pub slot: i16,
    pub quantity: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBody {
    #[serde(rename = "type")]
    pub inventory_type: InventoryType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedBody {
    #[serde(rename = "type")]
    pub inventory_type: InventoryType,
    pub asset_id: AssetId,
    pub slot: i16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasedBody {
    #[serde(rename = "type")]
    pub inventory_type: InventoryType,
    pub asset_id: AssetId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<TemplateId>,
}

/// Wire error codes carried in compartment `ERROR` events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CompartmentNotFound,
    AssetNotFound,
    InventoryFull,
    NotEnoughQuantity,
    TypeMismatch,
    InvalidRequest,
    SlotConflict,
    UpstreamFailure,
    UnknownError,
}

impl Message for CompartmentStatusEvent {
    fn topic(&self) -> &'static str {
        EVENT_TOPIC_COMPARTMENT_STATUS
    }

    fn key(&self) -> String {
        self.character_id.to_string()
    }

    fn message_type(&self) -> &'static str {
        match self.body {
            CompartmentStatusBody::Created(_) => "CREATED",
            CompartmentStatusBody::Deleted => "DELETED",
            CompartmentStatusBody::CapacityChanged(_) => "CAPACITY_CHANGED",
            CompartmentStatusBody::Reserved(_) => "RESERVED",
            CompartmentStatusBody::ReservationCancelled(_) => "RESERVATION_CANCELLED",
            CompartmentStatusBody::MergeComplete(_) => "MERGE_COMPLETE",
            CompartmentStatusBody::SortComplete(_) => "SORT_COMPLETE",
            CompartmentStatusBody::Accepted(_) => "ACCEPTED",
            CompartmentStatusBody::Released(_) => "RELEASED",
            CompartmentStatusBody::Error(_) => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::NewAsset;
    use crate::reference::StackableData;

    fn etc_asset() -> Asset {
        Asset::new(
            AssetId(11),
            CompartmentId::new(),
            NewAsset::new(
                4,
                TemplateId(4000000),
                ReferenceData::Etc(StackableData {
                    quantity: 6,
                    owner_id: 0,
                    flag: 0,
                }),
            ),
        )
    }

    #[test]
    fn moved_event_carries_old_and_new_slot() {
        let asset = etc_asset();
        let event = AssetStatusEvent::moved(TransactionId::new(), CharacterId(1), &asset, 9);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MOVED");
        assert_eq!(json["slot"], 4);
        assert_eq!(json["body"]["oldSlot"], 9);
        assert_eq!(json["assetId"], 11);
        assert_eq!(event.message_type(), "MOVED");
    }

    #[test]
    fn created_event_embeds_reference_data() {
        let event = AssetStatusEvent::created(TransactionId::new(), CharacterId(1), &etc_asset());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CREATED");
        assert_eq!(json["body"]["referenceType"], "etc");
        assert_eq!(json["body"]["referenceData"]["quantity"], 6);
    }

    #[test]
    fn error_event_uses_screaming_codes_and_omits_empty_fields() {
        let event = CompartmentStatusEvent::error(
            TransactionId::new(),
            CharacterId(1),
            CompartmentId::nil(),
            ErrorCode::NotEnoughQuantity,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["body"]["errorCode"], "NOT_ENOUGH_QUANTITY");
        assert!(json["body"].get("slot").is_none());
        assert!(event.is_error());
    }

    #[test]
    fn capacity_body_uses_numeric_type() {
        let event = CompartmentStatusEvent::new(
            TransactionId::new(),
            CharacterId(2),
            CompartmentId::new(),
            CompartmentStatusBody::Created(CapacityBody {
                inventory_type: InventoryType::Use,
                capacity: 24,
            }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CREATED");
        assert_eq!(json["body"]["type"], 2);
        assert_eq!(json["body"]["capacity"], 24);
        assert_eq!(event.topic(), EVENT_TOPIC_COMPARTMENT_STATUS);
    }
}
