use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stowage_core::{CharacterId, TransactionId};
use stowage_events::Message;
use stowage_events::topic::EVENT_TOPIC_CHARACTER_STATUS;

/// Character lifecycle transitions that affect inventory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CharacterStatus {
    Created,
    Deleted,
}

/// Inbound character status event. Types other than `CREATED`/`DELETED` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStatusEvent {
    pub transaction_id: TransactionId,
    pub character_id: CharacterId,
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(default)]
    pub body: JsonValue,
}

impl CharacterStatusEvent {
    pub fn new(
        transaction_id: TransactionId,
        character_id: CharacterId,
        status: CharacterStatus,
    ) -> Self {
        let status_type = match status {
            CharacterStatus::Created => "CREATED",
            CharacterStatus::Deleted => "DELETED",
        };
        Self {
            transaction_id,
            character_id,
            status_type: status_type.to_string(),
            body: JsonValue::Object(Default::default()),
        }
    }

    pub fn status(&self) -> Option<CharacterStatus> {
        match self.status_type.as_str() {
            "CREATED" => Some(CharacterStatus::Created),
            "DELETED" => Some(CharacterStatus::Deleted),
            _ => None,
        }
    }
}

impl Message for CharacterStatusEvent {
    fn topic(&self) -> &'static str {
        EVENT_TOPIC_CHARACTER_STATUS
    }

    fn key(&self) -> String {
        self.character_id.to_string()
    }

    fn message_type(&self) -> &'static str {
        match self.status() {
            Some(CharacterStatus::Created) => "CREATED",
            Some(CharacterStatus::Deleted) => "DELETED",
            None => "UNKNOWN",
        }
    }
}
