use serde::{Deserialize, Serialize};

use stowage_core::{
    AssetId, CharacterId, CompartmentId, DomainError, DomainResult, Entity, TemplateId,
    entity::find_by_id,
};

use crate::asset::Asset;
use crate::inventory_type::InventoryType;

/// One inventory tab of a character: a capacity plus the assets inside it.
///
/// Invariants (upheld by the engine, checked by `validate`):
/// - every asset references this compartment's id
/// - no two assets share the same positive slot
/// - positive slots lie within `1..=capacity`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    id: CompartmentId,
    character_id: CharacterId,
    inventory_type: InventoryType,
    capacity: u32,
    assets: Vec<Asset>,
}

impl Compartment {
    pub fn new(
        id: CompartmentId,
        character_id: CharacterId,
        inventory_type: InventoryType,
        capacity: u32,
    ) -> Self {
        Self {
            id,
            character_id,
            inventory_type,
            capacity,
            assets: Vec::new(),
        }
    }

    pub fn with_assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn id(&self) -> CompartmentId {
        self.id
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn inventory_type(&self) -> InventoryType {
        self.inventory_type
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, id: AssetId) -> Option<&Asset> {
        find_by_id(&self.assets, id)
    }

    /// The asset occupying `slot` (lowest id first if the slot is doubly occupied).
    pub fn asset_at(&self, slot: i16) -> Option<&Asset> {
        self.assets
            .iter()
            .filter(|a| a.slot() == slot)
            .min_by_key(|a| a.id())
    }

    /// Assets placed in the grid, ordered by slot then id.
    pub fn placed_assets(&self) -> Vec<&Asset> {
        let mut placed: Vec<&Asset> = self.assets.iter().filter(|a| a.is_placed()).collect();
        placed.sort_by_key(|a| (a.slot(), a.id()));
        placed
    }

    /// Placed, stackable assets of `template_id`, ordered by slot then id.
    pub fn stacks_of(&self, template_id: TemplateId) -> Vec<&Asset> {
        self.placed_assets()
            .into_iter()
            .filter(|a| a.template_id() == template_id && a.is_stackable())
            .collect()
    }

    pub fn is_slot_in_range(&self, slot: i16) -> bool {
        slot > 0 && u32::from(slot.unsigned_abs()) <= self.capacity
    }

    pub fn is_slot_free(&self, slot: i16) -> bool {
        self.is_slot_in_range(slot) && self.asset_at(slot).is_none()
    }

    /// Lowest free positive slot, if any.
    pub fn next_free_slot(&self) -> Option<i16> {
        let upper = i16::try_from(self.capacity).unwrap_or(i16::MAX);
        (1..=upper).find(|s| self.asset_at(*s).is_none())
    }

    /// Free positive slots in ascending order.
    pub fn open_slots(&self) -> Vec<i16> {
        let upper = i16::try_from(self.capacity).unwrap_or(i16::MAX);
        (1..=upper).filter(|s| self.asset_at(*s).is_none()).collect()
    }

    /// Number of free positive slots.
    pub fn free_slots(&self) -> usize {
        let occupied = self
            .placed_assets()
            .iter()
            .filter(|a| self.is_slot_in_range(a.slot()))
            .map(|a| a.slot())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        (self.capacity as usize).saturating_sub(occupied)
    }

    pub fn is_full(&self) -> bool {
        self.free_slots() == 0
    }

    pub fn ensure_slot_in_range(&self, slot: i16) -> DomainResult<()> {
        if self.is_slot_in_range(slot) {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "slot {slot} is outside 1..={} of the {} compartment",
                self.capacity, self.inventory_type
            )))
        }
    }

    /// Check the structural invariants of the compartment.
    pub fn validate(&self) -> DomainResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for asset in &self.assets {
            if asset.compartment_id() != self.id {
                return Err(DomainError::invariant(format!(
                    "asset {} references compartment {}",
                    asset.id(),
                    asset.compartment_id()
                )));
            }
            if asset.is_placed() && !seen.insert(asset.slot()) {
                return Err(DomainError::invariant(format!(
                    "slot {} is occupied twice",
                    asset.slot()
                )));
            }
        }
        Ok(())
    }

    // State transitions used by stores when committing engine decisions.

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }

    pub fn insert_asset(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    /// Replace the asset with the same id. Returns false if it is absent.
    pub fn replace_asset(&mut self, asset: Asset) -> bool {
        match self.assets.iter_mut().find(|a| a.id() == asset.id()) {
            Some(existing) => {
                *existing = asset;
                true
            }
            None => false,
        }
    }

    pub fn remove_asset(&mut self, id: AssetId) -> Option<Asset> {
        let idx = self.assets.iter().position(|a| a.id() == id)?;
        Some(self.assets.remove(idx))
    }
}

impl Entity for Compartment {
    type Id = CompartmentId;

    fn id(&self) -> CompartmentId {
        self.id
    }
}
