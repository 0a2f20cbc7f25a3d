use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::error::SimulationError;
use super::event::{Event, EventAction, EventPriority};
use super::queue::EventQueue;
use super::recorder::{DataPoint, DiscardRecorder, Recorder};
use super::time::SimTime;
use super::types::AssetId;

/// Owns the simulation clock, the event queue, the run's random source
/// and the datapoint recorder. One environment per simulation run; runs
/// never share one.
pub struct Environment {
    now: SimTime,
    queue: EventQueue,
    pub rng: StdRng,
    recorder: Box<dyn Recorder>,
    terminated: bool,
    events_executed: u64,
}

impl Environment {
    pub fn new(seed: u64) -> Self {
        Self {
            now: SimTime::ZERO,
            queue: EventQueue::new(),
            rng: StdRng::seed_from_u64(seed),
            recorder: Box::new(DiscardRecorder),
            terminated: false,
            events_executed: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorder = recorder;
    }

    pub fn recorder(&self) -> &dyn Recorder {
        self.recorder.as_ref()
    }

    /// Schedule an action. Fatal if `time` lies before the current clock:
    /// time cannot move backward.
    pub fn schedule_event(
        &mut self,
        time: SimTime,
        priority: EventPriority,
        target: AssetId,
        action: EventAction,
        label: impl Into<String>,
    ) -> Result<(), SimulationError> {
        self.schedule_edge_event(time, priority, target, action, label, None)
    }

    /// Schedule an action tagged with the (upstream, downstream) pair it
    /// commits, so severing the relation can cancel it.
    pub fn schedule_edge_event(
        &mut self,
        time: SimTime,
        priority: EventPriority,
        target: AssetId,
        action: EventAction,
        label: impl Into<String>,
        edge: Option<(AssetId, AssetId)>,
    ) -> Result<(), SimulationError> {
        let label = label.into();
        if time < self.now {
            return Err(SimulationError::Scheduling {
                now: self.now,
                requested: time,
                label,
            });
        }
        self.queue.push(time, priority, target, action, label, edge);
        Ok(())
    }

    /// Remove the next event in `(time, priority, seq)` order and advance
    /// the clock to its time. Cancelled events are returned with the flag
    /// set so the caller can discard them without execution.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.queue.pop_next()?;
        self.now = event.time;
        if event.cancelled {
            trace!("discarding cancelled {}", event);
        } else {
            self.events_executed += 1;
        }
        Some(event)
    }

    /// Cancel all pending events addressed to `target`.
    pub fn cancel_for_target(&mut self, target: AssetId) -> usize {
        self.queue.cancel_where(|e| e.target == target)
    }

    /// Cancel pending events matching a predicate.
    pub fn cancel_where<F>(&mut self, predicate: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        self.queue.cancel_where(predicate)
    }

    /// Drop all handshake commits tagged with `edge` from the queue.
    /// Severing a relation must leave nothing referencing the pair.
    pub fn remove_for_edge(&mut self, edge: (AssetId, AssetId)) -> usize {
        self.queue.remove_where(|e| e.edge == Some(edge))
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn clear_terminated(&mut self) {
        self.terminated = false;
    }

    pub fn has_events(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn events_executed(&self) -> u64 {
        self.events_executed
    }

    /// Pending events in execution order, for inspection and tests.
    pub fn pending_events(&self) -> impl Iterator<Item = &Event> {
        self.queue.iter()
    }

    pub fn add_datapoint(&mut self, list_label: &str, sub_label: &str, point: DataPoint) {
        self.recorder.record(list_label, sub_label, point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_in_the_past_is_fatal() {
        let mut env = Environment::new(0);
        env.schedule_event(
            SimTime(5.0),
            EventPriority::TERMINATE,
            AssetId(0),
            EventAction::Terminate,
            "end",
        )
        .unwrap();
        env.pop_next();
        assert_eq!(env.now(), SimTime(5.0));

        let err = env
            .schedule_event(
                SimTime(4.0),
                EventPriority::SPACE_REQUEST,
                AssetId(1),
                EventAction::OfferPart,
                "late",
            )
            .unwrap_err();
        assert!(matches!(err, SimulationError::Scheduling { .. }));
    }

    #[test]
    fn clock_advances_to_each_popped_event() {
        let mut env = Environment::new(0);
        for time in [2.0, 1.0, 3.0] {
            env.schedule_event(
                SimTime(time),
                EventPriority::SPACE_REQUEST,
                AssetId(1),
                EventAction::OfferPart,
                "",
            )
            .unwrap();
        }
        assert_eq!(env.pop_next().unwrap().time, SimTime(1.0));
        assert_eq!(env.now(), SimTime(1.0));
        env.pop_next();
        env.pop_next();
        assert_eq!(env.now(), SimTime(3.0));
        assert!(!env.has_events());
    }
}
