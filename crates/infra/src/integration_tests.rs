//! Integration tests for the full compartment pipeline.
//!
//! Tests: Command → Engine (lock, registries, store) → EventBuffer → EventBus
//!
//! Verifies:
//! - Slot algorithms end to end (sort, merge, placement)
//! - Reservation saga verbs (reserve, fulfil, cancel, expiry)
//! - Writers on one compartment never interleave
//! - Inbound messages are routed to the right operation

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use serde_json::{Value as JsonValue, json};

    use stowage_core::{
        AssetId, CharacterId, CompartmentId, FixedClock, TemplateId, TenantId, TransactionId,
    };
    use stowage_events::topic::{
        COMMAND_TOPIC_DROP, EVENT_TOPIC_ASSET_STATUS, EVENT_TOPIC_COMPARTMENT_STATUS,
    };
    use stowage_events::{EventBus, InMemoryEventBus, MessageEnvelope, Subscription};
    use stowage_inventory::{
        Asset, CancelReservationBody, CharacterStatus, CharacterStatusEvent, CommandBody,
        Compartment, CompartmentCommand, CreateAssetBody, DestroyBody, DropBody, DropReserved,
        DropStatusEvent, EquipableData, EquipableStatistics, InventoryType, MoveBody, NewAsset,
        RawCommand, ReferenceData, RequestReserveBody, ReserveItem, StackableData,
    };

    use crate::catalog::{EquipmentTemplate, ItemMetadata, StaticCatalog};
    use crate::config::InventoryConfig;
    use crate::consumer::{CommandConsumer, ConsumeError, ConsumeOutcome};
    use crate::emitter::RequestContext;
    use crate::engine::{CompartmentEngine, EngineError};
    use crate::lock_registry::LockRegistry;
    use crate::reservation::{CompartmentKey, ReservationRegistry};
    use crate::store::{CompartmentStore, InMemoryCompartmentStore, StoreError};
    use crate::workers::CommandConsumerWorker;

    type Bus = Arc<InMemoryEventBus<MessageEnvelope<JsonValue>>>;
    type Engine<S> = CompartmentEngine<S, Arc<StaticCatalog>, Bus>;

    const SWORD: TemplateId = TemplateId(1302000);
    const HAT: TemplateId = TemplateId(1002140);
    const RED_POTION: TemplateId = TemplateId(2000000);
    const STARS: TemplateId = TemplateId(2070000);
    const SCROLL: TemplateId = TemplateId(2120000);
    const SNAIL_SHELL: TemplateId = TemplateId(4000000);

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_equipment(
                SWORD,
                EquipmentTemplate {
                    slots: vec![-11],
                    cash: false,
                    statistics: EquipableStatistics {
                        weapon_attack: 17,
                        ..EquipableStatistics::default()
                    },
                },
            )
            .with_equipment(
                HAT,
                EquipmentTemplate {
                    slots: vec![-1],
                    cash: true,
                    statistics: EquipableStatistics::default(),
                },
            )
            .with_item(
                STARS,
                ItemMetadata {
                    slot_max: 800,
                    rechargeable: true,
                },
            )
            .with_item(
                SNAIL_SHELL,
                ItemMetadata {
                    slot_max: 200,
                    rechargeable: false,
                },
            )
            .with_default_item(ItemMetadata::default())
            .with_existing_equipment(
                77,
                EquipableData {
                    statistics: EquipableStatistics {
                        weapon_attack: 21,
                        ..EquipableStatistics::default()
                    },
                    ..EquipableData::default()
                },
            )
    }

    struct Harness<S> {
        engine: Arc<Engine<S>>,
        bus: Bus,
        events: Subscription<MessageEnvelope<JsonValue>>,
        clock: Arc<FixedClock>,
        tenant_id: TenantId,
    }

    impl<S: CompartmentStore> Harness<S> {
        fn with_store(store: S) -> Self {
            let clock = Arc::new(FixedClock::new(Utc::now()));
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            // Subscribe BEFORE any events are published.
            let events = bus.subscribe();
            let engine = CompartmentEngine::new(
                store,
                Arc::new(catalog()),
                bus.clone(),
                Arc::new(LockRegistry::new()),
                Arc::new(ReservationRegistry::new(clock.clone())),
                InventoryConfig::default(),
            );
            Self {
                engine: Arc::new(engine),
                bus,
                events,
                clock,
                tenant_id: TenantId::new(),
            }
        }

        fn ctx(&self) -> RequestContext {
            RequestContext::new(self.tenant_id, TransactionId::new())
        }

        fn compartment(&self, character_id: CharacterId, inventory_type: InventoryType) -> Compartment {
            self.engine
                .find_compartment(self.tenant_id, character_id, inventory_type)
                .unwrap()
                .unwrap()
        }

        /// `(topic, type)` of everything published since the last call.
        fn published(&self) -> Vec<(String, String)> {
            self.events
                .drain()
                .into_iter()
                .map(|e| {
                    let kind = e.payload()["type"].as_str().unwrap_or_default().to_string();
                    (e.topic().to_string(), kind)
                })
                .collect()
        }

        fn drain(&self) -> Vec<MessageEnvelope<JsonValue>> {
            self.events.drain()
        }
    }

    fn setup() -> Harness<Arc<InMemoryCompartmentStore>> {
        Harness::with_store(Arc::new(InMemoryCompartmentStore::new()))
    }

    fn create(template_id: TemplateId, quantity: u32, slot: i16) -> CreateAssetBody {
        CreateAssetBody {
            template_id,
            quantity,
            slot,
            expiration: None,
            owner_id: 0,
            flag: 0,
            rechargeable: false,
        }
    }

    fn template_at(compartment: &Compartment, slot: i16) -> Option<TemplateId> {
        compartment.asset_at(slot).map(Asset::template_id)
    }

    #[test]
    fn compact_and_sort_orders_by_template() {
        let h = setup();
        let character = CharacterId(1);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 40)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(SCROLL, 1, 1))
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(STARS, 1, 3))
            .unwrap();
        h.published();

        let moved = h
            .engine
            .compact_and_sort(h.ctx(), character, InventoryType::Use)
            .unwrap();

        let c = h.compartment(character, InventoryType::Use);
        assert_eq!(moved, 2);
        assert_eq!(template_at(&c, 1), Some(STARS));
        assert_eq!(template_at(&c, 2), Some(SCROLL));
        assert_eq!(template_at(&c, 3), None);

        let published = h.published();
        assert_eq!(
            published.last(),
            Some(&(EVENT_TOPIC_COMPARTMENT_STATUS.to_string(), "SORT_COMPLETE".to_string()))
        );
        assert_eq!(
            published.iter().filter(|(_, t)| t == "MOVED").count(),
            2
        );
    }

    #[test]
    fn merge_and_compact_folds_separate_stacks() {
        let h = setup();
        let character = CharacterId(1);
        let compartment = h
            .engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 40)
            .unwrap();
        for _ in 0..3 {
            h.engine
                .store()
                .insert_asset(
                    h.tenant_id,
                    compartment.id(),
                    NewAsset::new(
                        1,
                        SCROLL,
                        ReferenceData::Consumable(stowage_inventory::ConsumableData {
                            quantity: 1,
                            owner_id: 0,
                            flag: 0,
                            rechargeable: false,
                        }),
                    ),
                )
                .unwrap();
        }

        h.engine
            .merge_and_compact(h.ctx(), character, InventoryType::Use)
            .unwrap();

        let c = h.compartment(character, InventoryType::Use);
        assert_eq!(c.assets().len(), 1);
        let merged = c.asset_at(1).unwrap();
        assert_eq!(merged.template_id(), SCROLL);
        assert_eq!(merged.quantity(), 3);
        assert!(c.validate().is_ok());

        let types: Vec<String> = h.published().into_iter().map(|(_, t)| t).collect();
        assert!(types.contains(&"MERGE_COMPLETE".to_string()));
        assert_eq!(types.iter().filter(|t| *t == "DELETED").count(), 2);
        assert_eq!(types.last().map(String::as_str), Some("SORT_COMPLETE"));
    }

    #[test]
    fn stackable_creation_tops_up_then_spills_into_free_slots() {
        let h = setup();
        let character = CharacterId(2);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 4)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 150, 0))
            .unwrap();

        let touched = h
            .engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 300, 0))
            .unwrap();

        assert_eq!(touched.len(), 3);
        let c = h.compartment(character, InventoryType::Etc);
        let quantities: Vec<u32> = c.placed_assets().iter().map(|a| a.quantity()).collect();
        assert_eq!(quantities, vec![200, 200, 50]);
    }

    #[test]
    fn overflowing_creation_writes_nothing() {
        let h = setup();
        let character = CharacterId(2);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 2)
            .unwrap();
        h.published();

        let err = h
            .engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 450, 0))
            .unwrap_err();

        assert!(matches!(err, EngineError::CompartmentFull));
        assert!(h.compartment(character, InventoryType::Etc).assets().is_empty());
        let envelopes = h.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].payload()["type"], "ERROR");
        assert_eq!(envelopes[0].payload()["body"]["errorCode"], "INVENTORY_FULL");
    }

    #[test]
    fn template_must_belong_to_the_compartment() {
        let h = setup();
        let character = CharacterId(2);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();

        let err = h
            .engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(RED_POTION, 1, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn reservation_hides_quantity_until_fulfilled() {
        let h = setup();
        let character = CharacterId(3);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 10, 1))
            .unwrap();

        let saga = h.ctx();
        h.engine
            .request_reserve(
                saga,
                character,
                InventoryType::Use,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: RED_POTION,
                        quantity: 4,
                    }],
                },
            )
            .unwrap();
        assert_eq!(
            h.engine
                .available_quantity(h.tenant_id, character, InventoryType::Use, 1)
                .unwrap(),
            6
        );
        h.published();

        let err = h
            .engine
            .destroy(
                h.ctx(),
                character,
                InventoryType::Use,
                DestroyBody {
                    source: 1,
                    quantity: 7,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientQuantity {
                slot: 1,
                requested: 7,
                available: 6,
                ..
            }
        ));
        let envelopes = h.drain();
        assert_eq!(envelopes[0].payload()["body"]["errorCode"], "NOT_ENOUGH_QUANTITY");
        assert_eq!(envelopes[0].payload()["body"]["slot"], 1);
        assert_eq!(envelopes[0].payload()["body"]["itemId"], RED_POTION.value());

        // The reserving transaction consumes its own hold.
        let left = h
            .engine
            .consume(saga, character, InventoryType::Use, 1)
            .unwrap()
            .unwrap();
        assert_eq!(left.quantity(), 9);
        assert_eq!(
            h.engine
                .available_quantity(h.tenant_id, character, InventoryType::Use, 1)
                .unwrap(),
            9
        );
    }

    #[test]
    fn request_reserve_is_all_or_nothing() {
        let h = setup();
        let character = CharacterId(3);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 5, 1))
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(TemplateId(4000001), 2, 2))
            .unwrap();
        h.published();

        let err = h
            .engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Etc,
                RequestReserveBody {
                    items: vec![
                        ReserveItem {
                            source: 1,
                            item_id: SNAIL_SHELL,
                            quantity: 5,
                        },
                        ReserveItem {
                            source: 2,
                            item_id: TemplateId(4000001),
                            quantity: 3,
                        },
                    ],
                },
            )
            .unwrap_err();

        assert_eq!(err.slot(), Some(2));
        let key = CompartmentKey::new(h.tenant_id, character, InventoryType::Etc);
        assert_eq!(h.engine.reservations().total_reserved(key.at(1)), 0);
        assert_eq!(h.engine.reservations().total_reserved(key.at(2)), 0);
        assert_eq!(
            h.published(),
            vec![(EVENT_TOPIC_COMPARTMENT_STATUS.to_string(), "ERROR".to_string())]
        );
    }

    #[test]
    fn cancel_reservation_is_idempotent() {
        let h = setup();
        let character = CharacterId(4);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 3, 1))
            .unwrap();
        let saga = h.ctx();
        h.engine
            .request_reserve(
                saga,
                character,
                InventoryType::Use,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: RED_POTION,
                        quantity: 2,
                    }],
                },
            )
            .unwrap();
        h.published();

        let cancel = CancelReservationBody {
            slot: 1,
            reservation_id: None,
        };
        let first = h
            .engine
            .cancel_reservation(saga, character, InventoryType::Use, cancel)
            .unwrap();
        let second = h
            .engine
            .cancel_reservation(saga, character, InventoryType::Use, cancel)
            .unwrap();

        assert_eq!(first.map(|r| r.quantity), Some(2));
        assert!(second.is_none());
        assert_eq!(
            h.published(),
            vec![(
                EVENT_TOPIC_COMPARTMENT_STATUS.to_string(),
                "RESERVATION_CANCELLED".to_string()
            )]
        );
        assert_eq!(
            h.engine
                .available_quantity(h.tenant_id, character, InventoryType::Use, 1)
                .unwrap(),
            3
        );
    }

    #[test]
    fn expired_holds_release_quantity() {
        let h = setup();
        let character = CharacterId(4);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 3, 1))
            .unwrap();
        h.engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Use,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: RED_POTION,
                        quantity: 3,
                    }],
                },
            )
            .unwrap();
        assert_eq!(
            h.engine
                .available_quantity(h.tenant_id, character, InventoryType::Use, 1)
                .unwrap(),
            0
        );

        h.clock
            .advance(h.engine.config().reservation_ttl + Duration::milliseconds(1));

        assert_eq!(
            h.engine
                .available_quantity(h.tenant_id, character, InventoryType::Use, 1)
                .unwrap(),
            3
        );
        assert_eq!(h.engine.reservations().expire_sweep(), 1);
    }

    #[test]
    fn equip_swaps_with_the_current_occupant() {
        let h = setup();
        let character = CharacterId(5);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Equip, 8)
            .unwrap();
        for _ in 0..2 {
            h.engine
                .create_asset(h.ctx(), character, InventoryType::Equip, create(SWORD, 1, 0))
                .unwrap();
        }
        let before = h.compartment(character, InventoryType::Equip);
        let first = before.asset_at(1).unwrap().id();
        let second = before.asset_at(2).unwrap().id();

        let slot = h
            .engine
            .equip(
                h.ctx(),
                character,
                InventoryType::Equip,
                MoveBody {
                    source: 1,
                    destination: 0,
                },
            )
            .unwrap();
        assert_eq!(slot, -11);

        h.engine
            .equip(
                h.ctx(),
                character,
                InventoryType::Equip,
                MoveBody {
                    source: 2,
                    destination: 0,
                },
            )
            .unwrap();

        let after = h.compartment(character, InventoryType::Equip);
        assert_eq!(after.asset_at(-11).map(Asset::id), Some(second));
        assert_eq!(after.asset_at(2).map(Asset::id), Some(first));
        assert!(after.validate().is_ok());
    }

    #[test]
    fn cash_equipment_goes_to_the_cosmetic_slot() {
        let h = setup();
        let character = CharacterId(5);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Equip, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Equip, create(HAT, 1, 0))
            .unwrap();

        let slot = h
            .engine
            .equip(
                h.ctx(),
                character,
                InventoryType::Equip,
                MoveBody {
                    source: 1,
                    destination: 0,
                },
            )
            .unwrap();
        assert_eq!(slot, -101);
    }

    #[test]
    fn unequip_falls_back_to_the_next_free_slot() {
        let h = setup();
        let character = CharacterId(5);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Equip, 8)
            .unwrap();
        for _ in 0..2 {
            h.engine
                .create_asset(h.ctx(), character, InventoryType::Equip, create(SWORD, 1, 0))
                .unwrap();
        }
        h.engine
            .equip(
                h.ctx(),
                character,
                InventoryType::Equip,
                MoveBody {
                    source: 1,
                    destination: 0,
                },
            )
            .unwrap();

        let slot = h
            .engine
            .unequip(
                h.ctx(),
                character,
                InventoryType::Equip,
                MoveBody {
                    source: -11,
                    destination: 2,
                },
            )
            .unwrap();
        assert_eq!(slot, 1);
    }

    #[test]
    fn equipping_a_consumable_is_a_type_mismatch() {
        let h = setup();
        let character = CharacterId(5);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 1, 1))
            .unwrap();

        let err = h
            .engine
            .equip(
                h.ctx(),
                character,
                InventoryType::Use,
                MoveBody {
                    source: 1,
                    destination: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    fn shells(h: &Harness<Arc<InMemoryCompartmentStore>>, character: CharacterId, stacks: &[(i16, u32)]) {
        let compartment = h
            .engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        for (slot, quantity) in stacks {
            h.engine
                .store()
                .insert_asset(
                    h.tenant_id,
                    compartment.id(),
                    NewAsset::new(
                        *slot,
                        SNAIL_SHELL,
                        ReferenceData::Etc(StackableData {
                            quantity: *quantity,
                            owner_id: 0,
                            flag: 0,
                        }),
                    ),
                )
                .unwrap();
        }
    }

    #[test]
    fn move_onto_a_matching_stack_merges_up_to_the_limit() {
        let h = setup();
        let character = CharacterId(6);
        shells(&h, character, &[(1, 150), (2, 100)]);

        h.engine
            .move_asset(
                h.ctx(),
                character,
                InventoryType::Etc,
                MoveBody {
                    source: 1,
                    destination: 2,
                },
            )
            .unwrap();

        let c = h.compartment(character, InventoryType::Etc);
        assert_eq!(c.asset_at(2).map(Asset::quantity), Some(200));
        assert_eq!(c.asset_at(1).map(Asset::quantity), Some(50));
    }

    #[test]
    fn move_onto_an_empty_slot_carries_holds_along() {
        let h = setup();
        let character = CharacterId(6);
        shells(&h, character, &[(1, 10)]);
        h.engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Etc,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: SNAIL_SHELL,
                        quantity: 4,
                    }],
                },
            )
            .unwrap();

        h.engine
            .move_asset(
                h.ctx(),
                character,
                InventoryType::Etc,
                MoveBody {
                    source: 1,
                    destination: 5,
                },
            )
            .unwrap();

        let key = CompartmentKey::new(h.tenant_id, character, InventoryType::Etc);
        assert_eq!(h.engine.reservations().total_reserved(key.at(1)), 0);
        assert_eq!(h.engine.reservations().total_reserved(key.at(5)), 4);
    }

    #[test]
    fn merging_away_a_reserved_stack_is_a_conflict() {
        let h = setup();
        let character = CharacterId(6);
        shells(&h, character, &[(1, 10), (2, 10)]);
        h.engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Etc,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: SNAIL_SHELL,
                        quantity: 1,
                    }],
                },
            )
            .unwrap();

        let err = h
            .engine
            .move_asset(
                h.ctx(),
                character,
                InventoryType::Etc,
                MoveBody {
                    source: 1,
                    destination: 2,
                },
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Conflict(_)));
        let c = h.compartment(character, InventoryType::Etc);
        assert_eq!(c.asset_at(1).map(Asset::quantity), Some(10));
        assert_eq!(c.asset_at(2).map(Asset::quantity), Some(10));
    }

    #[test]
    fn drop_debits_and_asks_the_map_to_spawn() {
        let h = setup();
        let character = CharacterId(7);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 5, 1))
            .unwrap();
        h.published();

        h.engine
            .drop_asset(
                h.ctx(),
                character,
                InventoryType::Use,
                DropBody {
                    world_id: 0,
                    channel_id: 1,
                    map_id: 100000000,
                    instance: 0,
                    source: 1,
                    quantity: 2,
                    x: 120,
                    y: -30,
                },
            )
            .unwrap();

        let c = h.compartment(character, InventoryType::Use);
        assert_eq!(c.asset_at(1).map(Asset::quantity), Some(3));

        let envelopes = h.drain();
        let spawn = envelopes
            .iter()
            .find(|e| e.topic() == COMMAND_TOPIC_DROP)
            .unwrap();
        assert_eq!(spawn.payload()["type"], "SPAWN_FROM_CHARACTER");
        assert_eq!(spawn.payload()["body"]["itemId"], RED_POTION.value());
        assert_eq!(spawn.payload()["body"]["quantity"], 2);
        assert_eq!(spawn.payload()["body"]["mapId"], 100000000);
        assert!(envelopes.iter().any(|e| e.topic() == EVENT_TOPIC_ASSET_STATUS
            && e.payload()["type"] == "QUANTITY_CHANGED"));
    }

    #[test]
    fn missing_compartment_is_reported_with_a_nil_id() {
        let h = setup();
        let err = h
            .engine
            .consume(h.ctx(), CharacterId(99), InventoryType::Use, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::CompartmentNotFound { .. }));

        let envelopes = h.drain();
        assert_eq!(envelopes.len(), 1);
        let payload = envelopes[0].payload();
        assert_eq!(payload["body"]["errorCode"], "COMPARTMENT_NOT_FOUND");
        assert_eq!(payload["compartmentId"], json!(CompartmentId::nil()));
    }

    #[test]
    fn capacity_increase_is_bounded() {
        let h = setup();
        let character = CharacterId(8);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 24)
            .unwrap();

        let capacity = h
            .engine
            .increase_capacity(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        assert_eq!(capacity, 32);

        let max = h.engine.config().max_capacity;
        let err = h
            .engine
            .increase_capacity(h.ctx(), character, InventoryType::Etc, max)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(h.compartment(character, InventoryType::Etc).capacity(), 32);
    }

    #[test]
    fn release_refuses_assets_held_by_other_sagas() {
        let h = setup();
        let character = CharacterId(9);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        let asset = h
            .engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 5, 1))
            .unwrap()
            .remove(0);
        h.engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Use,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: RED_POTION,
                        quantity: 1,
                    }],
                },
            )
            .unwrap();

        let err = h
            .engine
            .release(
                h.ctx(),
                character,
                InventoryType::Use,
                stowage_inventory::ReleaseBody { asset_id: asset.id() },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let err = h
            .engine
            .release(
                h.ctx(),
                character,
                InventoryType::Use,
                stowage_inventory::ReleaseBody {
                    asset_id: AssetId(9999),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::AssetNotFound { slot: None }));
    }

    #[test]
    fn recharge_refills_only_rechargeable_stacks() {
        let h = setup();
        let character = CharacterId(16);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(STARS, 300, 1))
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 3, 2))
            .unwrap();

        let stars = h
            .engine
            .recharge(h.ctx(), character, InventoryType::Use, 1)
            .unwrap();
        assert_eq!(stars.quantity(), 800);

        let err = h
            .engine
            .recharge(h.ctx(), character, InventoryType::Use, 2)
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn accept_joins_a_stack_or_takes_a_free_slot() {
        let h = setup();
        let character = CharacterId(17);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 10, 1))
            .unwrap();
        h.published();

        let shells = |quantity| stowage_inventory::AcceptBody {
            template_id: SNAIL_SHELL,
            reference_id: 0,
            expiration: None,
            reference: ReferenceData::Etc(StackableData {
                quantity,
                owner_id: 0,
                flag: 0,
            }),
        };

        let merged = h
            .engine
            .accept(h.ctx(), character, InventoryType::Etc, shells(5))
            .unwrap();
        assert_eq!((merged.slot(), merged.quantity()), (1, 15));

        let placed = h
            .engine
            .accept(h.ctx(), character, InventoryType::Etc, shells(190))
            .unwrap();
        assert_eq!((placed.slot(), placed.quantity()), (2, 190));

        let types: Vec<String> = h.published().into_iter().map(|(_, t)| t).collect();
        assert_eq!(types.iter().filter(|t| *t == "ACCEPTED").count(), 2);

        let err = h
            .engine
            .accept(
                h.ctx(),
                character,
                InventoryType::Etc,
                stowage_inventory::AcceptBody {
                    template_id: SNAIL_SHELL,
                    reference_id: 0,
                    expiration: None,
                    reference: ReferenceData::Setup(StackableData {
                        quantity: 1,
                        owner_id: 0,
                        flag: 0,
                    }),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn accepting_more_than_a_stack_holds_is_rejected() {
        let h = setup();
        let character = CharacterId(18);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 10, 1))
            .unwrap();
        h.published();

        let err = h
            .engine
            .accept(
                h.ctx(),
                character,
                InventoryType::Etc,
                stowage_inventory::AcceptBody {
                    template_id: SNAIL_SHELL,
                    reference_id: 0,
                    expiration: None,
                    reference: ReferenceData::Etc(StackableData {
                        quantity: u32::MAX - 5,
                        owner_id: 0,
                        flag: 0,
                    }),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let compartment = h.compartment(character, InventoryType::Etc);
        assert_eq!(compartment.assets().len(), 1);
        assert_eq!(compartment.asset_at(1).map(Asset::quantity), Some(10));

        let envelopes = h.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].payload()["type"], "ERROR");
        assert_eq!(envelopes[0].payload()["body"]["errorCode"], "INVALID_REQUEST");
    }

    #[test]
    fn reserve_lines_summing_past_u32_are_rejected() {
        let h = setup();
        let character = CharacterId(19);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 5, 1))
            .unwrap();
        h.published();

        let err = h
            .engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Etc,
                RequestReserveBody {
                    items: vec![
                        ReserveItem {
                            source: 1,
                            item_id: SNAIL_SHELL,
                            quantity: u32::MAX,
                        },
                        ReserveItem {
                            source: 1,
                            item_id: SNAIL_SHELL,
                            quantity: 2,
                        },
                    ],
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let key = CompartmentKey::new(h.tenant_id, character, InventoryType::Etc);
        assert_eq!(h.engine.reservations().total_reserved(key.at(1)), 0);
        assert_eq!(
            h.published(),
            vec![(EVENT_TOPIC_COMPARTMENT_STATUS.to_string(), "ERROR".to_string())]
        );
    }

    #[test]
    fn destroying_zero_removes_the_whole_stack() {
        let h = setup();
        let character = CharacterId(20);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 37, 1))
            .unwrap();
        h.published();

        let remaining = h
            .engine
            .destroy(
                h.ctx(),
                character,
                InventoryType::Etc,
                DestroyBody {
                    source: 1,
                    quantity: 0,
                },
            )
            .unwrap();
        assert!(remaining.is_none());
        assert!(h.compartment(character, InventoryType::Etc).asset_at(1).is_none());
        assert_eq!(
            h.published(),
            vec![(EVENT_TOPIC_ASSET_STATUS.to_string(), "DELETED".to_string())]
        );
    }

    #[test]
    fn consuming_the_last_unit_deletes_the_stack() {
        let h = setup();
        let character = CharacterId(21);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 2, 1))
            .unwrap();
        h.published();

        let left = h
            .engine
            .consume(h.ctx(), character, InventoryType::Use, 1)
            .unwrap();
        assert_eq!(left.map(|a| a.quantity()), Some(1));
        assert_eq!(
            h.published(),
            vec![(EVENT_TOPIC_ASSET_STATUS.to_string(), "QUANTITY_CHANGED".to_string())]
        );

        let left = h
            .engine
            .consume(h.ctx(), character, InventoryType::Use, 1)
            .unwrap();
        assert!(left.is_none());
        assert!(h.compartment(character, InventoryType::Use).asset_at(1).is_none());
        assert_eq!(
            h.published(),
            vec![(EVENT_TOPIC_ASSET_STATUS.to_string(), "DELETED".to_string())]
        );
    }

    #[test]
    fn only_consumables_can_be_consumed() {
        let h = setup();
        let character = CharacterId(22);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Etc, 8)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Etc, create(SNAIL_SHELL, 3, 1))
            .unwrap();
        h.published();

        let err = h
            .engine
            .consume(h.ctx(), character, InventoryType::Etc, 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch(_)));
        assert_eq!(
            h.compartment(character, InventoryType::Etc).asset_at(1).map(Asset::quantity),
            Some(3)
        );
    }

    /// Store that stalls every asset insert, widening the read-then-write window.
    struct DelayedStore {
        inner: InMemoryCompartmentStore,
        delay: StdDuration,
    }

    impl CompartmentStore for DelayedStore {
        fn get_compartment(
            &self,
            tenant_id: TenantId,
            compartment_id: CompartmentId,
        ) -> Result<Option<Compartment>, StoreError> {
            self.inner.get_compartment(tenant_id, compartment_id)
        }

        fn find_compartment(
            &self,
            tenant_id: TenantId,
            character_id: CharacterId,
            inventory_type: InventoryType,
        ) -> Result<Option<Compartment>, StoreError> {
            self.inner
                .find_compartment(tenant_id, character_id, inventory_type)
        }

        fn list_compartments(
            &self,
            tenant_id: TenantId,
            character_id: CharacterId,
        ) -> Result<Vec<Compartment>, StoreError> {
            self.inner.list_compartments(tenant_id, character_id)
        }

        fn insert_compartment(
            &self,
            tenant_id: TenantId,
            compartment: Compartment,
        ) -> Result<Compartment, StoreError> {
            self.inner.insert_compartment(tenant_id, compartment)
        }

        fn delete_compartment(
            &self,
            tenant_id: TenantId,
            compartment_id: CompartmentId,
        ) -> Result<(), StoreError> {
            self.inner.delete_compartment(tenant_id, compartment_id)
        }

        fn update_capacity(
            &self,
            tenant_id: TenantId,
            compartment_id: CompartmentId,
            capacity: u32,
        ) -> Result<(), StoreError> {
            self.inner
                .update_capacity(tenant_id, compartment_id, capacity)
        }

        fn insert_asset(
            &self,
            tenant_id: TenantId,
            compartment_id: CompartmentId,
            asset: NewAsset,
        ) -> Result<Asset, StoreError> {
            thread::sleep(self.delay);
            self.inner.insert_asset(tenant_id, compartment_id, asset)
        }

        fn update_asset(&self, tenant_id: TenantId, asset: &Asset) -> Result<(), StoreError> {
            self.inner.update_asset(tenant_id, asset)
        }

        fn delete_asset(
            &self,
            tenant_id: TenantId,
            compartment_id: CompartmentId,
            asset_id: AssetId,
        ) -> Result<(), StoreError> {
            self.inner.delete_asset(tenant_id, compartment_id, asset_id)
        }
    }

    #[test]
    fn concurrent_writers_on_one_compartment_do_not_interleave() {
        let h = Harness::with_store(DelayedStore {
            inner: InMemoryCompartmentStore::new(),
            delay: StdDuration::from_millis(50),
        });
        let character = CharacterId(10);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Equip, 8)
            .unwrap();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&h.engine);
                let ctx = h.ctx();
                thread::spawn(move || {
                    engine.create_asset(ctx, character, InventoryType::Equip, create(SWORD, 1, 0))
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        let c = h.compartment(character, InventoryType::Equip);
        let mut slots: Vec<i16> = c.assets().iter().map(Asset::slot).collect();
        slots.sort();
        assert_eq!(slots, vec![1, 2]);
        assert!(c.validate().is_ok());
    }

    fn envelope<M>(tenant_id: TenantId, message: &M) -> MessageEnvelope<JsonValue>
    where
        M: stowage_events::Message + serde::Serialize,
    {
        MessageEnvelope::encode(tenant_id, TransactionId::new(), message).unwrap()
    }

    fn raw_command(character_id: CharacterId, inventory_type: InventoryType, body: CommandBody) -> RawCommand {
        CompartmentCommand::new(TransactionId::new(), character_id, inventory_type, body)
            .to_raw()
            .unwrap()
    }

    #[test]
    fn consumer_routes_lifecycle_and_commands() {
        let h = setup();
        let consumer = CommandConsumer::new(Arc::clone(&h.engine));
        let character = CharacterId(11);

        let created = CharacterStatusEvent::new(TransactionId::new(), character, CharacterStatus::Created);
        assert_eq!(
            consumer.consume(&envelope(h.tenant_id, &created)).unwrap(),
            ConsumeOutcome::Handled
        );
        let compartments = h.engine.list_compartments(h.tenant_id, character).unwrap();
        assert_eq!(compartments.len(), 5);
        assert_eq!(compartments[4].capacity(), 96);

        let command = raw_command(
            character,
            InventoryType::Use,
            CommandBody::CreateAsset(create(RED_POTION, 20, 0)),
        );
        assert_eq!(
            consumer.consume(&envelope(h.tenant_id, &command)).unwrap(),
            ConsumeOutcome::Handled
        );
        assert_eq!(
            h.compartment(character, InventoryType::Use)
                .asset_at(1)
                .map(Asset::quantity),
            Some(20)
        );

        let mut unknown = raw_command(character, InventoryType::Use, CommandBody::Sort);
        unknown.command_type = "TELEPORT".to_string();
        assert_eq!(
            consumer.consume(&envelope(h.tenant_id, &unknown)).unwrap(),
            ConsumeOutcome::Ignored
        );

        let mut malformed = raw_command(character, InventoryType::Use, CommandBody::Sort);
        malformed.command_type = "MOVE".to_string();
        malformed.body = json!({ "source": "one" });
        assert!(matches!(
            consumer.consume(&envelope(h.tenant_id, &malformed)),
            Err(ConsumeError::Malformed { .. })
        ));

        // Our own outbound events are not commands.
        let outbound = h.drain();
        assert!(!outbound.is_empty());
        for e in &outbound {
            assert_eq!(consumer.consume(e).unwrap(), ConsumeOutcome::Ignored);
        }
    }

    #[test]
    fn character_deletion_tears_everything_down() {
        let h = setup();
        let consumer = CommandConsumer::new(Arc::clone(&h.engine));
        let character = CharacterId(12);
        h.engine
            .create_character_compartments(h.ctx(), character)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 3, 1))
            .unwrap();
        h.engine
            .request_reserve(
                h.ctx(),
                character,
                InventoryType::Use,
                RequestReserveBody {
                    items: vec![ReserveItem {
                        source: 1,
                        item_id: RED_POTION,
                        quantity: 1,
                    }],
                },
            )
            .unwrap();
        h.published();

        let deleted = CharacterStatusEvent::new(TransactionId::new(), character, CharacterStatus::Deleted);
        consumer.consume(&envelope(h.tenant_id, &deleted)).unwrap();

        assert!(h.engine.list_compartments(h.tenant_id, character).unwrap().is_empty());
        assert_eq!(h.engine.reservations().key_count(), 0);
        assert!(h.engine.locks().is_empty());

        let types: Vec<String> = h.published().into_iter().map(|(_, t)| t).collect();
        assert_eq!(types.iter().filter(|t| *t == "DELETED").count(), 6);
    }

    #[test]
    fn granted_equipment_drop_is_picked_up() {
        let h = setup();
        let consumer = CommandConsumer::new(Arc::clone(&h.engine));
        let character = CharacterId(13);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Equip, 4)
            .unwrap();
        h.published();

        let granted = DropStatusEvent::reserved(
            TransactionId::new(),
            &DropReserved {
                drop_id: 500,
                character_id: character,
                item_id: SWORD,
                equipment_id: 77,
                quantity: 1,
            },
        )
        .unwrap();
        assert_eq!(
            consumer.consume(&envelope(h.tenant_id, &granted)).unwrap(),
            ConsumeOutcome::Handled
        );

        let c = h.compartment(character, InventoryType::Equip);
        let sword = c.asset_at(1).unwrap();
        assert_eq!(sword.reference_id(), 77);
        assert_eq!(
            sword.reference().equipable().map(|d| d.statistics.weapon_attack),
            Some(21)
        );

        let envelopes = h.drain();
        let reply = envelopes
            .iter()
            .find(|e| e.topic() == COMMAND_TOPIC_DROP)
            .unwrap();
        assert_eq!(reply.payload()["type"], "REQUEST_PICK_UP");
        assert_eq!(reply.payload()["body"]["dropId"], 500);
    }

    #[test]
    fn failed_item_pick_up_releases_the_drop() {
        let h = setup();
        let character = CharacterId(14);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 1)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 1, 1))
            .unwrap();
        h.published();

        let err = h
            .engine
            .attempt_item_pick_up(
                h.ctx(),
                DropReserved {
                    drop_id: 501,
                    character_id: character,
                    item_id: TemplateId(2000001),
                    equipment_id: 0,
                    quantity: 3,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::CompartmentFull));

        let envelopes = h.drain();
        let reply = envelopes
            .iter()
            .find(|e| e.topic() == COMMAND_TOPIC_DROP)
            .unwrap();
        assert_eq!(reply.payload()["type"], "CANCEL_RESERVATION");
        assert_eq!(reply.payload()["body"]["dropId"], 501);
    }

    #[test]
    fn unclassifiable_pick_up_reports_an_error_and_releases_the_drop() {
        let h = setup();
        let character = CharacterId(23);

        let err = h
            .engine
            .attempt_item_pick_up(
                h.ctx(),
                DropReserved {
                    drop_id: 502,
                    character_id: character,
                    item_id: TemplateId(9000000),
                    equipment_id: 0,
                    quantity: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let envelopes = h.drain();
        let error = envelopes
            .iter()
            .find(|e| e.topic() == EVENT_TOPIC_COMPARTMENT_STATUS)
            .unwrap();
        assert_eq!(error.payload()["type"], "ERROR");
        assert_eq!(error.payload()["body"]["errorCode"], "INVALID_REQUEST");
        assert_eq!(error.payload()["compartmentId"], json!(CompartmentId::nil()));

        let reply = envelopes
            .iter()
            .find(|e| e.topic() == COMMAND_TOPIC_DROP)
            .unwrap();
        assert_eq!(reply.payload()["type"], "CANCEL_RESERVATION");
        assert_eq!(reply.payload()["body"]["dropId"], 502);
    }

    #[test]
    fn item_pick_up_joins_an_existing_stack() {
        let h = setup();
        let character = CharacterId(14);
        h.engine
            .create_compartment(h.ctx(), character, InventoryType::Use, 1)
            .unwrap();
        h.engine
            .create_asset(h.ctx(), character, InventoryType::Use, create(RED_POTION, 1, 1))
            .unwrap();

        h.engine
            .attempt_pick_up(
                h.ctx(),
                DropReserved {
                    drop_id: 502,
                    character_id: character,
                    item_id: RED_POTION,
                    equipment_id: 0,
                    quantity: 3,
                },
            )
            .unwrap();

        let c = h.compartment(character, InventoryType::Use);
        assert_eq!(c.asset_at(1).map(Asset::quantity), Some(4));
    }

    #[test]
    fn consumer_worker_drains_the_inbound_bus() {
        let h = setup();
        let inbound: Bus = Arc::new(InMemoryEventBus::new());
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();
        let handle = CommandConsumerWorker::spawn(
            "test-consumer",
            inbound.clone(),
            CommandConsumer::new(Arc::clone(&h.engine)),
            runtime.handle().clone(),
        )
        .unwrap();

        let character = CharacterId(15);
        let created = CharacterStatusEvent::new(TransactionId::new(), character, CharacterStatus::Created);
        inbound.publish(envelope(h.tenant_id, &created)).unwrap();

        let deadline = std::time::Instant::now() + StdDuration::from_secs(2);
        while h.engine.list_compartments(h.tenant_id, character).unwrap().len() < 5
            && std::time::Instant::now() < deadline
        {
            thread::sleep(StdDuration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(
            h.engine.list_compartments(h.tenant_id, character).unwrap().len(),
            5
        );
        assert!(h.bus.subscriber_count() >= 1);
    }
}
