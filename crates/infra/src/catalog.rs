//! Reference-data collaborators.
//!
//! Slot destinations, equipment attributes, stack limits and cash/pet records are
//! owned by other services. The engine sees them only as synchronous lookups; a
//! failed lookup is an upstream error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use stowage_core::TemplateId;
use stowage_inventory::{CashData, EquipableData, EquipableStatistics, PetData};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("template {0} is unknown to the catalog")]
    UnknownTemplate(TemplateId),

    #[error("equipment {0} is unknown to the catalog")]
    UnknownEquipment(u32),

    #[error("catalog returned malformed data: {0}")]
    Malformed(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Stack metadata of consumable, setup, etc and cash templates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    /// Largest quantity a single stack may hold.
    pub slot_max: u32,
    pub rechargeable: bool,
}

impl Default for ItemMetadata {
    fn default() -> Self {
        Self {
            slot_max: 100,
            rechargeable: false,
        }
    }
}

/// A freshly materialised piece of equipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEquipment {
    pub equipment_id: u32,
    pub data: EquipableData,
}

pub trait Catalog: Send + Sync {
    /// Equipped slots a template can be worn in, most preferred first.
    fn slot_destinations(&self, template_id: TemplateId) -> Result<Vec<i16>, CatalogError>;

    /// Whether a template is cash-shop equipment.
    fn is_cash_equipment(&self, template_id: TemplateId) -> Result<bool, CatalogError>;

    /// Roll a new piece of equipment from its template.
    fn create_equipment(&self, template_id: TemplateId) -> Result<CreatedEquipment, CatalogError>;

    /// Authoritative attributes of an existing piece of equipment.
    fn equipment(&self, equipment_id: u32) -> Result<EquipableData, CatalogError>;

    fn item_metadata(&self, template_id: TemplateId) -> Result<ItemMetadata, CatalogError>;

    fn create_cash_item(&self, template_id: TemplateId, quantity: u32) -> Result<CashData, CatalogError>;

    fn create_pet(&self, template_id: TemplateId, owner_id: u32) -> Result<PetData, CatalogError>;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn slot_destinations(&self, template_id: TemplateId) -> Result<Vec<i16>, CatalogError> {
        (**self).slot_destinations(template_id)
    }

    fn is_cash_equipment(&self, template_id: TemplateId) -> Result<bool, CatalogError> {
        (**self).is_cash_equipment(template_id)
    }

    fn create_equipment(&self, template_id: TemplateId) -> Result<CreatedEquipment, CatalogError> {
        (**self).create_equipment(template_id)
    }

    fn equipment(&self, equipment_id: u32) -> Result<EquipableData, CatalogError> {
        (**self).equipment(equipment_id)
    }

    fn item_metadata(&self, template_id: TemplateId) -> Result<ItemMetadata, CatalogError> {
        (**self).item_metadata(template_id)
    }

    fn create_cash_item(&self, template_id: TemplateId, quantity: u32) -> Result<CashData, CatalogError> {
        (**self).create_cash_item(template_id, quantity)
    }

    fn create_pet(&self, template_id: TemplateId, owner_id: u32) -> Result<PetData, CatalogError> {
        (**self).create_pet(template_id, owner_id)
    }
}

/// Equipment template registered with a [`StaticCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentTemplate {
    pub slots: Vec<i16>,
    pub cash: bool,
    pub statistics: EquipableStatistics,
}

/// Catalog backed by in-process tables.
///
/// Intended for tests/dev and for seeding a standalone server.
#[derive(Debug)]
pub struct StaticCatalog {
    equipment_templates: HashMap<TemplateId, EquipmentTemplate>,
    items: HashMap<TemplateId, ItemMetadata>,
    pet_names: HashMap<TemplateId, String>,
    default_item: Option<ItemMetadata>,
    created_equipment: RwLock<HashMap<u32, EquipableData>>,
    next_equipment_id: AtomicU32,
    next_cash_id: AtomicU64,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self {
            equipment_templates: HashMap::new(),
            items: HashMap::new(),
            pet_names: HashMap::new(),
            default_item: None,
            created_equipment: RwLock::new(HashMap::new()),
            next_equipment_id: AtomicU32::new(1),
            next_cash_id: AtomicU64::new(1),
        }
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equipment(mut self, template_id: TemplateId, template: EquipmentTemplate) -> Self {
        self.equipment_templates.insert(template_id, template);
        self
    }

    pub fn with_item(mut self, template_id: TemplateId, metadata: ItemMetadata) -> Self {
        self.items.insert(template_id, metadata);
        self
    }

    pub fn with_pet(mut self, template_id: TemplateId, name: impl Into<String>) -> Self {
        self.pet_names.insert(template_id, name.into());
        self
    }

    /// Metadata answered for item templates that were never registered.
    pub fn with_default_item(mut self, metadata: ItemMetadata) -> Self {
        self.default_item = Some(metadata);
        self
    }

    /// Register an existing piece of equipment (e.g. one lying on a map).
    pub fn with_existing_equipment(self, equipment_id: u32, data: EquipableData) -> Self {
        if let Ok(mut created) = self.created_equipment.write() {
            created.insert(equipment_id, data);
        }
        self.next_equipment_id
            .fetch_max(equipment_id.saturating_add(1), Ordering::Relaxed);
        self
    }

    fn equipment_template(&self, template_id: TemplateId) -> Result<&EquipmentTemplate, CatalogError> {
        self.equipment_templates
            .get(&template_id)
            .ok_or(CatalogError::UnknownTemplate(template_id))
    }
}

impl Catalog for StaticCatalog {
    fn slot_destinations(&self, template_id: TemplateId) -> Result<Vec<i16>, CatalogError> {
        let slots = &self.equipment_template(template_id)?.slots;
        if slots.iter().any(|s| *s >= 0) {
            return Err(CatalogError::Malformed(format!(
                "template {template_id} lists a non-equipped destination slot"
            )));
        }
        Ok(slots.clone())
    }

    fn is_cash_equipment(&self, template_id: TemplateId) -> Result<bool, CatalogError> {
        Ok(self.equipment_template(template_id)?.cash)
    }

    fn create_equipment(&self, template_id: TemplateId) -> Result<CreatedEquipment, CatalogError> {
        let template = self.equipment_template(template_id)?;
        let data = EquipableData {
            statistics: template.statistics.clone(),
            owner_id: 0,
            flag: 0,
            cash: template.cash,
        };

        let equipment_id = self.next_equipment_id.fetch_add(1, Ordering::Relaxed);
        self.created_equipment
            .write()
            .map_err(|_| CatalogError::Unavailable("equipment table poisoned".to_string()))?
            .insert(equipment_id, data.clone());

        Ok(CreatedEquipment { equipment_id, data })
    }

    fn equipment(&self, equipment_id: u32) -> Result<EquipableData, CatalogError> {
        self.created_equipment
            .read()
            .map_err(|_| CatalogError::Unavailable("equipment table poisoned".to_string()))?
            .get(&equipment_id)
            .cloned()
            .ok_or(CatalogError::UnknownEquipment(equipment_id))
    }

    fn item_metadata(&self, template_id: TemplateId) -> Result<ItemMetadata, CatalogError> {
        let metadata = self
            .items
            .get(&template_id)
            .copied()
            .or(self.default_item)
            .ok_or(CatalogError::UnknownTemplate(template_id))?;
        if metadata.slot_max == 0 {
            return Err(CatalogError::Malformed(format!(
                "template {template_id} has a stack limit of zero"
            )));
        }
        Ok(metadata)
    }

    fn create_cash_item(&self, template_id: TemplateId, quantity: u32) -> Result<CashData, CatalogError> {
        self.item_metadata(template_id).map(|_| ())?;
        Ok(CashData {
            cash_id: self.next_cash_id.fetch_add(1, Ordering::Relaxed),
            quantity,
            owner_id: 0,
            flag: 0,
            purchased_by: 0,
        })
    }

    fn create_pet(&self, template_id: TemplateId, owner_id: u32) -> Result<PetData, CatalogError> {
        let name = self
            .pet_names
            .get(&template_id)
            .cloned()
            .ok_or(CatalogError::UnknownTemplate(template_id))?;
        Ok(PetData {
            cash_id: self.next_cash_id.fetch_add(1, Ordering::Relaxed),
            owner_id,
            flag: 0,
            name,
            level: 1,
            closeness: 0,
            fullness: 100,
            pet_slot: -1,
        })
    }
}
