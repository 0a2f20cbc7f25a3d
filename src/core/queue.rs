use std::collections::BTreeMap;

use super::event::{Event, EventAction, EventPriority};
use super::time::SimTime;
use super::types::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: SimTime,
    priority: EventPriority,
    seq: u64,
}

/// Holds every scheduled-but-not-yet-executed event in a strict total
/// order: `(time, priority, insertion sequence)`. The insertion sequence
/// is the final tie-break, so execution order never depends on
/// unspecified iteration order.
///
/// Cancellation marks events invalid in place; invalid events stay queued
/// and are discarded at pop time, because intervening events may void a
/// previously scheduled action after it was enqueued.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Enqueue an event. The queue assigns the insertion sequence.
    pub fn push(
        &mut self,
        time: SimTime,
        priority: EventPriority,
        target: AssetId,
        action: EventAction,
        label: String,
        edge: Option<(AssetId, AssetId)>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = EventKey {
            time,
            priority,
            seq,
        };
        self.events.insert(
            key,
            Event {
                time,
                priority,
                seq,
                target,
                action,
                label,
                edge,
                cancelled: false,
            },
        );
        seq
    }

    /// Remove and return the event with the smallest
    /// `(time, priority, seq)` key, cancelled or not; the caller decides
    /// whether to execute it.
    pub fn pop_next(&mut self) -> Option<Event> {
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Mark every event matching the predicate as cancelled. Returns how
    /// many events were newly cancelled.
    pub fn cancel_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        let mut count = 0;
        for event in self.events.values_mut() {
            if !event.cancelled && predicate(event) {
                event.cancelled = true;
                count += 1;
            }
        }
        count
    }

    /// Drop every event matching the predicate from the queue entirely.
    /// Used when a severed relation must leave no scheduled continuation
    /// behind. Returns how many events were removed.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        let before = self.events.len();
        self.events.retain(|_, event| !predicate(event));
        before - self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Pending events in execution order, for inspection and tests.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(entries: &[(f64, EventPriority)]) -> EventQueue {
        let mut queue = EventQueue::new();
        for (time, priority) in entries {
            queue.push(
                SimTime(*time),
                *priority,
                AssetId(1),
                EventAction::OfferPart,
                String::new(),
                None,
            );
        }
        queue
    }

    #[test]
    fn pops_in_time_order() {
        let mut queue = queue_with(&[
            (3.0, EventPriority::SPACE_REQUEST),
            (1.0, EventPriority::SPACE_REQUEST),
            (2.0, EventPriority::SPACE_REQUEST),
        ]);
        let times: Vec<f64> = std::iter::from_fn(|| queue.pop_next())
            .map(|e| e.time.value())
            .collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn lower_priority_number_executes_first_at_equal_times() {
        // Insertion order deliberately reversed relative to priority.
        let mut queue = queue_with(&[
            (5.0, EventPriority::FAIL),
            (5.0, EventPriority::PART_PLACEMENT),
            (5.0, EventPriority::PART_GENERATION),
        ]);
        let priorities: Vec<EventPriority> = std::iter::from_fn(|| queue.pop_next())
            .map(|e| e.priority)
            .collect();
        assert_eq!(
            priorities,
            vec![
                EventPriority::PART_GENERATION,
                EventPriority::PART_PLACEMENT,
                EventPriority::FAIL,
            ]
        );
    }

    #[test]
    fn insertion_order_breaks_full_ties() {
        let mut queue = EventQueue::new();
        for target in [AssetId(9), AssetId(4), AssetId(7)] {
            queue.push(
                SimTime(1.0),
                EventPriority::SPACE_REQUEST,
                target,
                EventAction::OfferPart,
                String::new(),
                None,
            );
        }
        let targets: Vec<AssetId> = std::iter::from_fn(|| queue.pop_next())
            .map(|e| e.target)
            .collect();
        assert_eq!(targets, vec![AssetId(9), AssetId(4), AssetId(7)]);
    }

    #[test]
    fn cancelled_events_surface_with_the_flag_set() {
        let mut queue = queue_with(&[(1.0, EventPriority::SPACE_REQUEST)]);
        let cancelled = queue.cancel_where(|e| e.target == AssetId(1));
        assert_eq!(cancelled, 1);
        let event = queue.pop_next().unwrap();
        assert!(event.cancelled);
        assert!(queue.pop_next().is_none());
    }
}
