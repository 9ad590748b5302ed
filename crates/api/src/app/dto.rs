use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::{AssetId, CharacterId, CompartmentId, TemplateId};
use stowage_inventory::{Asset, Compartment, InventoryType, ReferenceData};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CompartmentQuery {
    #[serde(rename = "type")]
    pub inventory_type: u8,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompartmentResponse {
    pub id: CompartmentId,
    pub character_id: CharacterId,
    #[serde(rename = "type")]
    pub inventory_type: InventoryType,
    pub capacity: u32,
    pub assets: Vec<AssetResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub id: AssetId,
    pub slot: i16,
    pub template_id: TemplateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    pub reference_id: u32,
    #[serde(flatten)]
    pub reference: ReferenceData,
}

impl From<&Asset> for AssetResponse {
    fn from(a: &Asset) -> Self {
        Self {
            id: a.id(),
            slot: a.slot(),
            template_id: a.template_id(),
            expiration: a.expiration(),
            reference_id: a.reference_id(),
            reference: a.reference().clone(),
        }
    }
}

impl From<&Compartment> for CompartmentResponse {
    fn from(c: &Compartment) -> Self {
        let mut assets: Vec<AssetResponse> = c.assets().iter().map(AssetResponse::from).collect();
        assets.sort_by_key(|a| (a.slot, a.id));
        Self {
            id: c.id(),
            character_id: c.character_id(),
            inventory_type: c.inventory_type(),
            capacity: c.capacity(),
            assets,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub character_id: CharacterId,
    pub compartments: Vec<CompartmentResponse>,
}

impl InventoryResponse {
    pub fn new(character_id: CharacterId, compartments: &[Compartment]) -> Self {
        Self {
            character_id,
            compartments: compartments.iter().map(CompartmentResponse::from).collect(),
        }
    }
}
