//! Reference data: the type-specific payload an asset carries.
//!
//! `ReferenceData` is a closed union. The discriminator (`referenceType`) selects
//! exactly one payload shape, and every consumer matches exhaustively. Whether a
//! shape has a quantity is an explicit capability (`quantity()` returns `None` for
//! non-stackable shapes) rather than a runtime type check.

use serde::{Deserialize, Serialize};

use stowage_core::TemplateId;

use crate::inventory_type::InventoryType;

/// Discriminator of the reference-data union.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Equipable,
    Consumable,
    Setup,
    Etc,
    Cash,
    Pet,
}

/// Pet templates are cash templates in this range.
const PET_TEMPLATES: core::ops::RangeInclusive<u32> = 5_000_000..=5_000_999;

impl ReferenceType {
    /// Reference shape used for a template stored in a compartment of `inventory_type`.
    pub fn for_template(inventory_type: InventoryType, template_id: TemplateId) -> Self {
        match inventory_type {
            InventoryType::Equip => ReferenceType::Equipable,
            InventoryType::Use => ReferenceType::Consumable,
            InventoryType::Setup => ReferenceType::Setup,
            InventoryType::Etc => ReferenceType::Etc,
            InventoryType::Cash if PET_TEMPLATES.contains(&template_id.value()) => {
                ReferenceType::Pet
            }
            InventoryType::Cash => ReferenceType::Cash,
        }
    }

    pub const fn is_stackable(self) -> bool {
        match self {
            ReferenceType::Equipable | ReferenceType::Pet => false,
            ReferenceType::Consumable
            | ReferenceType::Setup
            | ReferenceType::Etc
            | ReferenceType::Cash => true,
        }
    }
}

/// Authoritative equipment attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EquipableStatistics {
    pub strength: u16,
    pub dexterity: u16,
    pub intelligence: u16,
    pub luck: u16,
    pub hp: u16,
    pub mp: u16,
    pub weapon_attack: u16,
    pub magic_attack: u16,
    pub weapon_defense: u16,
    pub magic_defense: u16,
    pub accuracy: u16,
    pub avoidability: u16,
    pub hands: u16,
    pub speed: u16,
    pub jump: u16,
    pub slots: u16,
    pub level: u8,
    pub experience: u32,
    pub hammers_applied: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipableData {
    pub statistics: EquipableStatistics,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
    /// Cash-shop equipment is worn in the cash equip slots (offset by -100).
    #[serde(default)]
    pub cash: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumableData {
    pub quantity: u32,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
    /// Reusable items (throwing stars, bullets) refill instead of being re-bought.
    #[serde(default)]
    pub rechargeable: bool,
}

/// Payload shared by setup and etc items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackableData {
    pub quantity: u32,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashData {
    pub cash_id: u64,
    pub quantity: u32,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
    #[serde(default)]
    pub purchased_by: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetData {
    pub cash_id: u64,
    #[serde(default)]
    pub owner_id: u32,
    #[serde(default)]
    pub flag: u16,
    pub name: String,
    pub level: u8,
    pub closeness: u16,
    pub fullness: u8,
    /// Position among summoned pets; `-1` when not summoned.
    pub pet_slot: i8,
}

/// Type-specific asset payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "referenceType",
    content = "referenceData",
    rename_all = "snake_case"
)]
pub enum ReferenceData {
    Equipable(EquipableData),
    Consumable(ConsumableData),
    Setup(StackableData),
    Etc(StackableData),
    Cash(CashData),
    Pet(PetData),
}

impl ReferenceData {
    pub fn reference_type(&self) -> ReferenceType {
        match self {
            ReferenceData::Equipable(_) => ReferenceType::Equipable,
            ReferenceData::Consumable(_) => ReferenceType::Consumable,
            ReferenceData::Setup(_) => ReferenceType::Setup,
            ReferenceData::Etc(_) => ReferenceType::Etc,
            ReferenceData::Cash(_) => ReferenceType::Cash,
            ReferenceData::Pet(_) => ReferenceType::Pet,
        }
    }

    pub fn is_stackable(&self) -> bool {
        self.reference_type().is_stackable()
    }

    /// Stack counter, present only on stackable shapes.
    pub fn quantity(&self) -> Option<u32> {
        match self {
            ReferenceData::Equipable(_) | ReferenceData::Pet(_) => None,
            ReferenceData::Consumable(d) => Some(d.quantity),
            ReferenceData::Setup(d) | ReferenceData::Etc(d) => Some(d.quantity),
            ReferenceData::Cash(d) => Some(d.quantity),
        }
    }

    /// Replace the stack counter. Non-stackable shapes are returned unchanged.
    pub fn with_quantity(self, quantity: u32) -> Self {
        match self {
            ReferenceData::Consumable(d) => ReferenceData::Consumable(ConsumableData { quantity, ..d }),
            ReferenceData::Setup(d) => ReferenceData::Setup(StackableData { quantity, ..d }),
            ReferenceData::Etc(d) => ReferenceData::Etc(StackableData { quantity, ..d }),
            ReferenceData::Cash(d) => ReferenceData::Cash(CashData { quantity, ..d }),
            other @ (ReferenceData::Equipable(_) | ReferenceData::Pet(_)) => other,
        }
    }

    pub fn owner_id(&self) -> u32 {
        match self {
            ReferenceData::Equipable(d) => d.owner_id,
            ReferenceData::Consumable(d) => d.owner_id,
            ReferenceData::Setup(d) | ReferenceData::Etc(d) => d.owner_id,
            ReferenceData::Cash(d) => d.owner_id,
            ReferenceData::Pet(d) => d.owner_id,
        }
    }

    pub fn flag(&self) -> u16 {
        match self {
            ReferenceData::Equipable(d) => d.flag,
            ReferenceData::Consumable(d) => d.flag,
            ReferenceData::Setup(d) | ReferenceData::Etc(d) => d.flag,
            ReferenceData::Cash(d) => d.flag,
            ReferenceData::Pet(d) => d.flag,
        }
    }

    pub fn is_rechargeable(&self) -> bool {
        matches!(self, ReferenceData::Consumable(d) if d.rechargeable)
    }

    pub fn equipable(&self) -> Option<&EquipableData> {
        match self {
            ReferenceData::Equipable(d) => Some(d),
            _ => None,
        }
    }
}
