use std::sync::Arc;

use thiserror::Error;

use stowage_core::{AssetId, CharacterId, CompartmentId, TenantId};
use stowage_inventory::{Asset, Compartment, InventoryType, NewAsset};

/// Persistence failure.
///
/// These are **infrastructure errors** (I/O, poisoned state, rows vanishing under a
/// write) as opposed to domain errors; the engine reports them as transient.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("compartment {0} does not exist")]
    MissingCompartment(CompartmentId),

    #[error("asset {asset_id} does not exist in compartment {compartment_id}")]
    MissingAsset {
        compartment_id: CompartmentId,
        asset_id: AssetId,
    },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Tenant-scoped compartment/asset storage.
///
/// ## Read semantics
///
/// Reads return the committed state. A compartment is always returned together with
/// all of its assets.
///
/// ## Write semantics
///
/// - every write is atomic on its own; there are no multi-row transactions
/// - asset ids are assigned by the store on insert
/// - writes against a row that does not exist fail with a `Missing*` error
/// - implementations never validate slots; that is the engine's job
pub trait CompartmentStore: Send + Sync {
    fn get_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError>;

    fn find_compartment(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<Option<Compartment>, StoreError>;

    /// All compartments of a character, ordered by inventory type.
    fn list_compartments(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
    ) -> Result<Vec<Compartment>, StoreError>;

    /// Persist a new (empty) compartment.
    fn insert_compartment(
        &self,
        tenant_id: TenantId,
        compartment: Compartment,
    ) -> Result<Compartment, StoreError>;

    /// Delete a compartment together with any assets still in it.
    fn delete_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<(), StoreError>;

    fn update_capacity(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        capacity: u32,
    ) -> Result<(), StoreError>;

    fn insert_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset: NewAsset,
    ) -> Result<Asset, StoreError>;

    /// Overwrite slot, quantity and reference data of an existing asset.
    fn update_asset(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), StoreError>;

    fn delete_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset_id: AssetId,
    ) -> Result<(), StoreError>;
}

impl<S> CompartmentStore for Arc<S>
where
    S: CompartmentStore + ?Sized,
{
    fn get_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError> {
        (**self).get_compartment(tenant_id, compartment_id)
    }

    fn find_compartment(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
        inventory_type: InventoryType,
    ) -> Result<Option<Compartment>, StoreError> {
        (**self).find_compartment(tenant_id, character_id, inventory_type)
    }

    fn list_compartments(
        &self,
        tenant_id: TenantId,
        character_id: CharacterId,
    ) -> Result<Vec<Compartment>, StoreError> {
        (**self).list_compartments(tenant_id, character_id)
    }

    fn insert_compartment(
        &self,
        tenant_id: TenantId,
        compartment: Compartment,
    ) -> Result<Compartment, StoreError> {
        (**self).insert_compartment(tenant_id, compartment)
    }

    fn delete_compartment(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
    ) -> Result<(), StoreError> {
        (**self).delete_compartment(tenant_id, compartment_id)
    }

    fn update_capacity(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        capacity: u32,
    ) -> Result<(), StoreError> {
        (**self).update_capacity(tenant_id, compartment_id, capacity)
    }

    fn insert_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset: NewAsset,
    ) -> Result<Asset, StoreError> {
        (**self).insert_asset(tenant_id, compartment_id, asset)
    }

    fn update_asset(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), StoreError> {
        (**self).update_asset(tenant_id, asset)
    }

    fn delete_asset(
        &self,
        tenant_id: TenantId,
        compartment_id: CompartmentId,
        asset_id: AssetId,
    ) -> Result<(), StoreError> {
        (**self).delete_asset(tenant_id, compartment_id, asset_id)
    }
}
