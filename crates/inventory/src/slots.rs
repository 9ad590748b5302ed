//! Slot-management algorithms (pure planning).
//!
//! These functions never mutate anything: they look at a snapshot of assets and
//! return the changes that would make it compact, sorted, or merged. The engine
//! validates the plan, commits it under the compartment lock, and emits events.

use std::collections::{BTreeMap, HashMap};

use stowage_core::{AssetId, TemplateId};

use crate::asset::Asset;

/// One asset changing position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SlotMove {
    pub asset_id: AssetId,
    pub from: i16,
    pub to: i16,
}

/// Plan the slot reassignment that compacts placed assets into `1..=n` and orders
/// them by ascending template id.
///
/// The current relative order (slot, then id) breaks ties, so the sort is stable.
/// Only assets whose slot actually changes are returned. Unplaced and equipped
/// assets are ignored.
pub fn compact_and_sort(assets: &[Asset]) -> Vec<SlotMove> {
    let mut placed: Vec<&Asset> = assets.iter().filter(|a| a.is_placed()).collect();
    placed.sort_by_key(|a| (a.slot(), a.id()));
    // Stable: equal templates keep the compacted order established above.
    placed.sort_by_key(|a| a.template_id());

    placed
        .into_iter()
        .zip(1i16..)
        .filter(|(a, to)| a.slot() != *to)
        .map(|(a, to)| SlotMove {
            asset_id: a.id(),
            from: a.slot(),
            to,
        })
        .collect()
}

/// Outcome of merge planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Surviving assets whose quantity changes, with the new quantity.
    pub quantity_changes: Vec<(AssetId, u32)>,
    /// Assets fully absorbed into lower stacks.
    pub removals: Vec<AssetId>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.quantity_changes.is_empty() && self.removals.is_empty()
    }
}

/// Plan merging placed stacks that share a template id.
///
/// Within a template, stacks are visited in (slot, id) order and each one is poured
/// into the lowest earlier stacks that still have room under `max_stack(template)`.
/// A stack that empties completely is removed; overflow remains a separate stack.
/// Non-stackable assets, and any asset for which `mergeable` returns false, neither
/// give nor receive quantity.
pub fn plan_merge<M, F>(assets: &[Asset], mergeable: M, max_stack: F) -> MergePlan
where
    M: Fn(&Asset) -> bool,
    F: Fn(TemplateId) -> u32,
{
    let mut groups: BTreeMap<TemplateId, Vec<&Asset>> = BTreeMap::new();
    for asset in assets
        .iter()
        .filter(|a| a.is_placed() && a.is_stackable() && mergeable(a))
    {
        groups.entry(asset.template_id()).or_default().push(asset);
    }

    let mut plan = MergePlan::default();
    for (template_id, mut stacks) in groups {
        if stacks.len() < 2 {
            continue;
        }
        stacks.sort_by_key(|a| (a.slot(), a.id()));
        let max = max_stack(template_id).max(1);

        let original: HashMap<AssetId, u32> =
            stacks.iter().map(|a| (a.id(), a.quantity())).collect();
        // (asset id, current quantity) of stacks that survive, lowest slot first.
        let mut targets: Vec<(AssetId, u32)> = Vec::new();

        for stack in stacks {
            let mut remaining = stack.quantity();
            for (_, held) in targets.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if *held >= max {
                    continue;
                }
                let poured = (max - *held).min(remaining);
                *held += poured;
                remaining -= poured;
            }

            if remaining == 0 {
                plan.removals.push(stack.id());
            } else {
                targets.push((stack.id(), remaining));
            }
        }

        plan.quantity_changes.extend(
            targets
                .into_iter()
                .filter(|(id, quantity)| original.get(id) != Some(quantity)),
        );
    }

    plan
}
