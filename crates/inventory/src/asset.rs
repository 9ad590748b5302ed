use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::{AssetId, CompartmentId, Entity, TemplateId};

use crate::reference::{ReferenceData, ReferenceType};

/// One item instance in a compartment.
///
/// Slots are signed: positive slots are placed in the compartment grid, negative
/// slots encode equipped positions, and `0` means "not placed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    id: AssetId,
    compartment_id: CompartmentId,
    slot: i16,
    template_id: TemplateId,
    expiration: Option<DateTime<Utc>>,
    reference_id: u32,
    #[serde(flatten)]
    reference: ReferenceData,
}

impl Asset {
    pub fn new(id: AssetId, compartment_id: CompartmentId, new: NewAsset) -> Self {
        Self {
            id,
            compartment_id,
            slot: new.slot,
            template_id: new.template_id,
            expiration: new.expiration,
            reference_id: new.reference_id,
            reference: new.reference,
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn compartment_id(&self) -> CompartmentId {
        self.compartment_id
    }

    pub fn slot(&self) -> i16 {
        self.slot
    }

    pub fn template_id(&self) -> TemplateId {
        self.template_id
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn reference_id(&self) -> u32 {
        self.reference_id
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn reference_type(&self) -> ReferenceType {
        self.reference.reference_type()
    }

    pub fn is_stackable(&self) -> bool {
        self.reference.is_stackable()
    }

    /// Quantity held; always 1 for non-stackable shapes.
    pub fn quantity(&self) -> u32 {
        self.reference.quantity().unwrap_or(1)
    }

    pub fn is_equipped(&self) -> bool {
        self.slot < 0
    }

    pub fn is_placed(&self) -> bool {
        self.slot > 0
    }

    pub fn with_slot(self, slot: i16) -> Self {
        Self { slot, ..self }
    }

    pub fn with_quantity(self, quantity: u32) -> Self {
        Self {
            reference: self.reference.with_quantity(quantity),
            ..self
        }
    }

    /// Replace the reference payload wholesale (equipment attribute updates).
    pub fn with_reference(self, reference: ReferenceData) -> Self {
        Self { reference, ..self }
    }
}

impl Entity for Asset {
    type Id = AssetId;

    fn id(&self) -> AssetId {
        self.id
    }
}

/// An asset that has not been persisted yet (no id assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub slot: i16,
    pub template_id: TemplateId,
    pub expiration: Option<DateTime<Utc>>,
    pub reference_id: u32,
    #[serde(flatten)]
    pub reference: ReferenceData,
}

impl NewAsset {
    pub fn new(slot: i16, template_id: TemplateId, reference: ReferenceData) -> Self {
        Self {
            slot,
            template_id,
            expiration: None,
            reference_id: 0,
            reference,
        }
    }

    pub fn with_expiration(mut self, expiration: Option<DateTime<Utc>>) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_reference_id(mut self, reference_id: u32) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn quantity(&self) -> u32 {
        self.reference.quantity().unwrap_or(1)
    }
}
