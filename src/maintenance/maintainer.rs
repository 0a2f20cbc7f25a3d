use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::time::SimTime;
use crate::core::types::{AssetId, WorkOrderId};
use crate::factory::device::ValueChange;

/// Lifecycle of a work order. State only ever advances
/// Queued → Active → Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderState {
    Queued,
    Active,
    Done,
}

/// A tracked unit of requested maintenance, from request to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub device: AssetId,
    pub tag: String,
    pub request_time: SimTime,
    pub start_time: Option<SimTime>,
    pub finish_time: Option<SimTime>,
    pub state: WorkOrderState,
    /// Estimate recorded at request time for selection strategies.
    pub expected_duration: f64,
}

/// Strategy deciding which pending work order a free maintainer slot
/// takes next. Returns an index into the pending slice.
pub trait WorkOrderSelection {
    fn select(&self, pending: &[&WorkOrder]) -> Option<usize>;
}

/// First come, first served. The default.
pub struct FirstComeFirstServed;

impl WorkOrderSelection for FirstComeFirstServed {
    fn select(&self, pending: &[&WorkOrder]) -> Option<usize> {
        if pending.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Picks the order with the longest expected duration, oldest first on
/// ties.
pub struct LongestExpectedFirst;

impl WorkOrderSelection for LongestExpectedFirst {
    fn select(&self, pending: &[&WorkOrder]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, order) in pending.iter().enumerate() {
            match best {
                None => best = Some(i),
                Some(b) if order.expected_duration > pending[b].expected_duration => {
                    best = Some(i)
                }
                _ => {}
            }
        }
        best
    }
}

/// Capacity-limited dispatcher of queued maintenance work orders. At most
/// `capacity` orders are active at once; the rest wait in the pending
/// queue until an inspection promotes them.
pub struct Maintainer {
    pub(crate) id: AssetId,
    pub(crate) name: String,
    pub(crate) capacity: usize,
    pub(crate) orders: BTreeMap<WorkOrderId, WorkOrder>,
    pub(crate) pending: Vec<WorkOrderId>,
    pub(crate) active: Vec<WorkOrderId>,
    pub(crate) selection: Box<dyn WorkOrderSelection>,
    /// An inspection event is already scheduled.
    pub(crate) inspect_pending: bool,
    pub(crate) next_order_id: u64,
    pub(crate) value: f64,
    pub(crate) value_history: Vec<ValueChange>,
}

impl Maintainer {
    pub(crate) fn new(id: AssetId, capacity: usize) -> Self {
        Self {
            id,
            name: "maintainer".to_string(),
            capacity,
            orders: BTreeMap::new(),
            pending: Vec::new(),
            active: Vec::new(),
            selection: Box::new(FirstComeFirstServed),
            inspect_pending: false,
            next_order_id: 0,
            value: 0.0,
            value_history: Vec::new(),
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn set_selection(&mut self, selection: impl WorkOrderSelection + 'static) {
        self.selection = Box::new(selection);
    }

    pub fn has_free_capacity(&self) -> bool {
        self.active.len() < self.capacity
    }

    /// An order counts as open while it is queued or active; a second
    /// request for the same device and tag is absorbed as a no-op.
    pub fn has_open_order(&self, device: AssetId, tag: &str) -> bool {
        self.pending
            .iter()
            .chain(self.active.iter())
            .filter_map(|id| self.orders.get(id))
            .any(|order| order.device == device && order.tag == tag)
    }

    pub(crate) fn create_order(
        &mut self,
        device: AssetId,
        tag: &str,
        request_time: SimTime,
        expected_duration: f64,
    ) -> Option<WorkOrderId> {
        if self.has_open_order(device, tag) {
            return None;
        }
        let id = WorkOrderId(self.next_order_id);
        self.next_order_id += 1;
        self.orders.insert(
            id,
            WorkOrder {
                id,
                device,
                tag: tag.to_string(),
                request_time,
                start_time: None,
                finish_time: None,
                state: WorkOrderState::Queued,
                expected_duration,
            },
        );
        self.pending.push(id);
        debug!("work order {} queued for {} ({})", id, device, tag);
        Some(id)
    }

    /// Promote one pending order to active, chosen by the selection
    /// strategy. Returns `None` when the queue is empty or all capacity
    /// is in use.
    pub(crate) fn promote_next(&mut self, now: SimTime) -> Option<WorkOrderId> {
        if !self.has_free_capacity() {
            return None;
        }
        let pending_refs: Vec<&WorkOrder> = self
            .pending
            .iter()
            .filter_map(|id| self.orders.get(id))
            .collect();
        let index = self.selection.select(&pending_refs)?;
        let id = self.pending.remove(index);
        self.active.push(id);
        let order = self.orders.get_mut(&id)?;
        order.state = WorkOrderState::Active;
        order.start_time = Some(now);
        debug!("work order {} active for {}", id, order.device);
        Some(id)
    }

    /// Return an active order to the pending queue, e.g. when its device
    /// turned out to be busy with another work order.
    pub(crate) fn demote(&mut self, id: WorkOrderId) {
        if let Some(order) = self.orders.get_mut(&id) {
            if order.state == WorkOrderState::Active {
                order.state = WorkOrderState::Queued;
                order.start_time = None;
                self.active.retain(|active| *active != id);
                self.pending.push(id);
            }
        }
    }

    pub(crate) fn complete(&mut self, id: WorkOrderId, now: SimTime) {
        self.active.retain(|active| *active != id);
        if let Some(order) = self.orders.get_mut(&id) {
            order.state = WorkOrderState::Done;
            order.finish_time = Some(now);
            debug!("work order {} done for {}", id, order.device);
        }
    }

    pub(crate) fn add_cost(&mut self, label: &str, time: SimTime, cost: f64) {
        self.value -= cost;
        self.value_history.push(ValueChange {
            label: label.to_string(),
            time,
            change: -cost,
            new_value: self.value,
        });
    }

    pub fn work_order(&self, id: WorkOrderId) -> Option<&WorkOrder> {
        self.orders.get(&id)
    }

    pub fn work_orders(&self) -> impl Iterator<Item = &WorkOrder> {
        self.orders.values()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maintainer() -> Maintainer {
        Maintainer::new(AssetId(1), 1)
    }

    #[test]
    fn duplicate_open_orders_are_rejected() {
        let mut m = maintainer();
        assert!(m
            .create_order(AssetId(5), "repair", SimTime(1.0), 0.0)
            .is_some());
        assert!(m
            .create_order(AssetId(5), "repair", SimTime(1.0), 0.0)
            .is_none());
        // A different tag is a different order.
        assert!(m
            .create_order(AssetId(5), "inspection", SimTime(1.0), 0.0)
            .is_some());
    }

    #[test]
    fn promotion_respects_capacity() {
        let mut m = maintainer();
        m.create_order(AssetId(5), "repair", SimTime(0.0), 0.0);
        m.create_order(AssetId(6), "repair", SimTime(0.0), 0.0);

        let first = m.promote_next(SimTime(0.0)).unwrap();
        assert_eq!(m.active_count(), 1);
        assert!(m.promote_next(SimTime(0.0)).is_none());

        m.complete(first, SimTime(3.0));
        let second = m.promote_next(SimTime(3.0)).unwrap();
        let order = m.work_order(second).unwrap();
        assert_eq!(order.start_time, Some(SimTime(3.0)));
    }

    #[test]
    fn longest_expected_first_picks_the_big_job() {
        let mut m = maintainer();
        m.set_selection(LongestExpectedFirst);
        m.create_order(AssetId(5), "repair", SimTime(0.0), 2.0);
        m.create_order(AssetId(6), "repair", SimTime(0.0), 8.0);

        let chosen = m.promote_next(SimTime(0.0)).unwrap();
        assert_eq!(m.work_order(chosen).unwrap().device, AssetId(6));
    }

    #[test]
    fn completing_marks_state_and_frees_capacity() {
        let mut m = maintainer();
        m.create_order(AssetId(5), "repair", SimTime(0.0), 0.0);
        let id = m.promote_next(SimTime(0.0)).unwrap();
        assert!(!m.has_free_capacity());
        m.complete(id, SimTime(4.0));
        assert!(m.has_free_capacity());
        let order = m.work_order(id).unwrap();
        assert_eq!(order.state, WorkOrderState::Done);
        assert_eq!(order.finish_time, Some(SimTime(4.0)));
        // No longer counts as open.
        assert!(!m.has_open_order(AssetId(5), "repair"));
    }
}
