//! Inventory domain module.
//!
//! This crate contains the compartment/asset model and the slot algorithms,
//! implemented purely as deterministic domain logic (no IO, no locking, no storage).
//! The wire shapes of the commands this service consumes and the events it emits
//! live here too, so every other crate agrees on them.

pub mod asset;
pub mod character;
pub mod command;
pub mod compartment;
pub mod drop;
pub mod event;
pub mod inventory_type;
pub mod reference;
pub mod slots;

pub use asset::{Asset, NewAsset};
pub use character::{CharacterStatus, CharacterStatusEvent};
pub use command::{
    AcceptBody, CancelReservationBody, CommandBody, CommandDecodeError, CompartmentCommand,
    CreateAssetBody, DestroyBody, DropBody, IncreaseCapacityBody, MoveBody, RawCommand,
    ReleaseBody, RequestReserveBody, ReserveItem, SourceBody,
};
pub use compartment::Compartment;
pub use drop::{DropCommand, DropCommandBody, DropReserved, DropStatusEvent, SpawnFromCharacterBody};
pub use event::{
    AcceptedBody, AssetStatusBody, AssetStatusEvent, CapacityBody, CompartmentStatusBody,
    CompartmentStatusEvent, ErrorBody, ErrorCode, ReleasedBody, ReservationBody, TypeBody,
};
pub use inventory_type::InventoryType;
pub use reference::{
    CashData, ConsumableData, EquipableData, EquipableStatistics, PetData, ReferenceData,
    ReferenceType, StackableData,
};
pub use slots::{MergePlan, SlotMove, compact_and_sort, plan_merge};
