use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stowage_core::{TenantId, TransactionId};

use crate::message::Message;

/// Envelope for a message on the bus, carrying tenant + routing metadata.
///
/// Notes:
/// - **Multi-tenancy** is enforced here via `tenant_id`; payloads never carry it.
/// - `transaction_id` correlates a causal chain across services (request →
///   reservation → commit/abort).
/// - `key` is the partition key (the character id); messages with the same key
///   are *not* assumed to be delivered in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope<P> {
    message_id: Uuid,
    tenant_id: TenantId,
    transaction_id: TransactionId,
    topic: String,
    key: String,
    payload: P,
}

impl<P> MessageEnvelope<P> {
    pub fn new(
        tenant_id: TenantId,
        transaction_id: TransactionId,
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: P,
    ) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            tenant_id,
            transaction_id,
            topic: topic.into(),
            key: key.into(),
            payload,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl MessageEnvelope<JsonValue> {
    /// Serialize a typed message into a JSON envelope routed by the message itself.
    pub fn encode<M>(
        tenant_id: TenantId,
        transaction_id: TransactionId,
        message: &M,
    ) -> Result<Self, serde_json::Error>
    where
        M: Message + Serialize,
    {
        let payload = serde_json::to_value(message)?;
        Ok(Self::new(
            tenant_id,
            transaction_id,
            message.topic(),
            message.key(),
            payload,
        ))
    }

    /// Deserialize the JSON payload into a typed shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
