use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::core::error::SimulationError;
use crate::core::time::SimTime;
use crate::core::types::AssetId;

/// A pool of one shared limited resource. `reserved + available ==
/// total` holds at all times; grants are atomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub name: String,
    pub total: u64,
    pub available: u64,
    /// Time-indexed capacity changes, applied by scheduled events.
    pub schedule: Vec<(SimTime, u64)>,
}

impl ResourcePool {
    pub fn reserved(&self) -> u64 {
        self.total - self.available
    }
}

/// A reservation that could not be granted immediately and waits in the
/// manager's FIFO queue. Requests are granted whole or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub device: AssetId,
    pub request: BTreeMap<String, u64>,
    pub queued_at: SimTime,
}

/// Pools of shared limited resources with atomic reservation and
/// release. Callers that cannot be served immediately join a FIFO wait
/// queue; releases and capacity increases trigger queue service.
pub struct ResourceManager {
    pub(crate) id: AssetId,
    pools: BTreeMap<String, ResourcePool>,
    waiting: VecDeque<PendingRequest>,
    /// A queue-service event is already scheduled.
    pub(crate) service_pending: bool,
}

impl ResourceManager {
    pub(crate) fn new(id: AssetId) -> Self {
        Self {
            id,
            pools: BTreeMap::new(),
            waiting: VecDeque::new(),
            service_pending: false,
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Add a pool, or extend an existing pool's capacity.
    pub fn add_pool(&mut self, name: &str, capacity: u64) {
        let pool = self
            .pools
            .entry(name.to_string())
            .or_insert_with(|| ResourcePool {
                name: name.to_string(),
                total: 0,
                available: 0,
                schedule: Vec::new(),
            });
        pool.total += capacity;
        pool.available += capacity;
    }

    /// Attach a time-indexed capacity schedule to a pool. The system
    /// turns each entry into a capacity-update event.
    pub fn set_capacity_schedule(&mut self, name: &str, schedule: Vec<(SimTime, u64)>) {
        if let Some(pool) = self.pools.get_mut(name) {
            pool.schedule = schedule;
        }
    }

    pub fn pool(&self, name: &str) -> Option<&ResourcePool> {
        self.pools.get(name)
    }

    pub fn pools(&self) -> impl Iterator<Item = &ResourcePool> {
        self.pools.values()
    }

    pub fn available(&self, name: &str) -> u64 {
        self.pools.get(name).map(|p| p.available).unwrap_or(0)
    }

    fn can_fulfill(&self, request: &BTreeMap<String, u64>) -> bool {
        request.iter().all(|(name, amount)| {
            self.pools
                .get(name)
                .map(|pool| pool.available >= *amount)
                .unwrap_or(false)
        })
    }

    /// Atomically reserve every amount in `request`. Either the whole
    /// request is granted and `true` is returned, or nothing changes.
    pub fn try_reserve(&mut self, request: &BTreeMap<String, u64>) -> bool {
        if !self.can_fulfill(request) {
            return false;
        }
        for (name, amount) in request {
            if let Some(pool) = self.pools.get_mut(name) {
                pool.available -= amount;
            }
        }
        true
    }

    /// Return previously reserved amounts to their pools. Releasing more
    /// than was reserved breaks the pool invariant and is fatal.
    pub fn release(&mut self, request: &BTreeMap<String, u64>) -> Result<(), SimulationError> {
        for (name, amount) in request {
            let pool = self.pools.get_mut(name).ok_or_else(|| {
                SimulationError::CapacityViolation(format!(
                    "release into unknown resource pool '{}'",
                    name
                ))
            })?;
            if pool.available + amount > pool.total {
                return Err(SimulationError::CapacityViolation(format!(
                    "releasing {} of '{}' would exceed its capacity of {}",
                    amount, name, pool.total
                )));
            }
            pool.available += amount;
        }
        Ok(())
    }

    /// Apply a scheduled capacity change. Growing a pool frees the new
    /// amount; shrinking below what is currently reserved is fatal.
    pub(crate) fn update_capacity(
        &mut self,
        name: &str,
        total: u64,
    ) -> Result<bool, SimulationError> {
        let pool = self.pools.get_mut(name).ok_or_else(|| {
            SimulationError::CapacityViolation(format!("unknown resource pool '{}'", name))
        })?;
        let grew = total > pool.total;
        if grew {
            pool.available += total - pool.total;
        } else {
            let shrink = pool.total - total;
            if pool.available < shrink {
                return Err(SimulationError::CapacityViolation(format!(
                    "cannot shrink pool '{}' to {}: {} of it is reserved",
                    name,
                    total,
                    pool.reserved()
                )));
            }
            pool.available -= shrink;
        }
        pool.total = total;
        debug!("pool '{}' capacity now {}", name, total);
        Ok(grew)
    }

    /// Queue a request that could not be granted immediately.
    pub(crate) fn enqueue(&mut self, device: AssetId, request: BTreeMap<String, u64>, now: SimTime) {
        debug!("{} waiting for resources {:?}", device, request);
        self.waiting.push_back(PendingRequest {
            device,
            request,
            queued_at: now,
        });
    }

    /// Drop queued requests from a device that stopped waiting (failure
    /// or maintenance shutdown).
    pub(crate) fn drop_requests_for(&mut self, device: AssetId) {
        self.waiting.retain(|pending| pending.device != device);
    }

    /// Serve the wait queue oldest-first. Each served request is granted
    /// whole; requests that still cannot be fulfilled stay queued in
    /// order. Returns the devices whose reservations were just granted.
    pub(crate) fn serve_waiting(&mut self) -> Vec<AssetId> {
        let mut granted = Vec::new();
        let mut index = 0;
        while index < self.waiting.len() {
            if self.can_fulfill(&self.waiting[index].request) {
                let pending = self.waiting.remove(index).expect("index checked");
                self.try_reserve(&pending.request);
                granted.push(pending.device);
            } else {
                index += 1;
            }
        }
        granted
    }

    pub fn waiting_requests(&self) -> impl Iterator<Item = &PendingRequest> {
        self.waiting.iter()
    }
}
