// src/engine/resources.rs

//! Resource accounting for task admission.
//!
//! Resources are named integer capacities (`gpu: 2`, `memory_gb: 64`).
//! A key absent from the budget is unbounded; a key absent from a
//! demand means zero demand. Only the control thread touches the pool,
//! during admission and reaping.

use std::collections::BTreeMap;

/// Resource demands or capacities keyed by resource name.
pub type ResourceMap = BTreeMap<String, u64>;

/// Tracks the global budget and what running tasks currently hold.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    budget: ResourceMap,
    available: ResourceMap,
}

impl ResourcePool {
    pub fn new(budget: ResourceMap) -> Self {
        Self {
            available: budget.clone(),
            budget,
        }
    }

    pub fn budget(&self) -> &ResourceMap {
        &self.budget
    }

    pub fn available(&self) -> &ResourceMap {
        &self.available
    }

    /// The budget cap for a resource, `None` meaning unbounded.
    pub fn cap(&self, resource: &str) -> Option<u64> {
        self.budget.get(resource).copied()
    }

    /// Whether `demand` could ever be admitted under the global budget.
    pub fn satisfiable(&self, demand: &ResourceMap) -> bool {
        covers(&self.budget, demand)
    }

    /// Whether `demand` fits what is available right now.
    pub fn fits(&self, demand: &ResourceMap) -> bool {
        covers(&self.available, demand)
    }

    /// Take `demand` out of the pool. The caller must have checked
    /// [`ResourcePool::fits`] first.
    pub fn acquire(&mut self, demand: &ResourceMap) {
        for (resource, amount) in demand {
            if let Some(slot) = self.available.get_mut(resource) {
                *slot = slot.saturating_sub(*amount);
            }
        }
    }

    /// Return `demand` to the pool. Paired with an earlier `acquire`,
    /// so `available` never exceeds `budget`.
    pub fn release(&mut self, demand: &ResourceMap) {
        for (resource, amount) in demand {
            if let Some(slot) = self.available.get_mut(resource) {
                *slot += amount;
            }
        }
    }
}

/// Whether `limit` covers `demand`, treating absent limit keys as
/// unbounded supply.
fn covers(limit: &ResourceMap, demand: &ResourceMap) -> bool {
    demand
        .iter()
        .all(|(resource, amount)| limit.get(resource).map_or(true, |cap| cap >= amount))
}
