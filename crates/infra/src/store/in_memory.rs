use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use stowage_core::{AssetId, CharacterId, CompartmentId, TenantId};
use stowage_inventory::{Asset, Compartment, InventoryType, NewAsset};

use super::r#trait::{CompartmentStore, StoreError};

/// In-memory compartment store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryCompartmentStore {
    compartments: RwLock<HashMap<(TenantId, CompartmentId), Compartment>>,
    next_asset_id: AtomicU32,
}

impl Default for InMemoryCompartmentStore {
    fn default() -> Self {
        Self {
            compartments: RwLock::new(HashMap::new()),
            next_asset_id: AtomicU32::new(1),
        }
    }
}

impl InMemoryCompartmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_compartment<T>(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        f: impl FnOnce(&mut Compartment) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut map = self.compartments.write().map_err(|_| StoreError::Poisoned)?;
        let compartment = map
            .get_mut(&(tenant_id, compartment_id))
            .ok_or(StoreError::MissingCompartment(compartment_id))?;
        f(compartment)
    }
}

impl CompartmentStore for InMemoryCompartmentStore {
    fn get_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError> {
        let map = self.compartments.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&(tenant_id, compartment_id)).cloned())
    }

    fn find_compartment(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<Option<Compartment>, StoreError> {
        let map = self.compartments.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map
            .iter()
            .find(|((t, _), c)| {
                *t == tenant_id
                    && c.character_id() == character_id
                    && c.inventory_type() == inventory_type
            })
            .map(|(_, c)| c.clone()))
    }

    fn list_compartments(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
    ) -> Result<Vec<Compartment>, StoreError> {
        let map = self.compartments.read().map_err(|_| StoreError::Poisoned)?;
        let mut found: Vec<Compartment> = map
            .iter()
            .filter(|((t, _), c)| *t == tenant_id && c.character_id() == character_id)
            .map(|(_, c)| c.clone())
            .collect();
        found.sort_by_key(|c| c.inventory_type());
        Ok(found)
    }

    fn insert_compartment(
        &self,
        tenant_id: TenantId,
        compartment: Compartment,
    ) -> Result<Compartment, StoreError> {
        let mut map = self.compartments.write().map_err(|_| StoreError::Poisoned)?;
        map.insert((tenant_id, compartment.id()), compartment.clone());
        Ok(compartment)
    }

    fn delete_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<(), StoreError> {
        let mut map = self.compartments.write().map_err(|_| StoreError::Poisoned)?;
        map.remove(&(tenant_id, compartment_id))
            .map(|_| ())
            .ok_or(StoreError::MissingCompartment(compartment_id))
    }

    fn update_capacity(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        capacity: u32,
    ) -> Result<(), StoreError> {
        self.with_compartment(tenant_id, compartment_id, |c| {
            c.set_capacity(capacity);
            Ok(())
        })
    }

    fn insert_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset: NewAsset,
    ) -> Result<Asset, StoreError> {
        self.with_compartment(tenant_id, compartment_id, |c| {
            let id = AssetId(self.next_asset_id.fetch_add(1, Ordering::Relaxed));
            let stored = Asset::new(id, compartment_id, asset);
            c.insert_asset(stored.clone());
            Ok(stored)
        })
    }

    fn update_asset(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), StoreError> {
        let compartment_id = asset.compartment_id();
        self.with_compartment(tenant_id, compartment_id, |c| {
            if c.replace_asset(asset.clone()) {
                Ok(())
            } else {
                Err(StoreError::MissingAsset {
                    compartment_id,
                    asset_id: asset.id(),
                })
            }
        })
    }

    fn delete_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset_id: AssetId,
    ) -> Result<(), StoreError> {
        self.with_compartment(tenant_id, compartment_id, |c| {
            c.remove_asset(asset_id).map(|_| ()).ok_or(StoreError::MissingAsset {
                compartment_id,
                asset_id,
            })
        })
    }
}
