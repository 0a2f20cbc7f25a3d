use serde::{Deserialize, Serialize};
use std::fmt;

use super::time::SimTime;
use super::types::{AssetId, WorkOrderId};

/// Execution priority of an event within one simulation instant; lower
/// values execute earlier. Built-in phases are spaced out on a gapped
/// integer scale so user-defined event kinds can be positioned between
/// them with `before`, `after`, or `between` without renumbering.
///
/// The built-in order encodes "end of current slot" before "start of next
/// slot" semantics: a device that finishes a part and fails at the same
/// instant commits its output (PART_PLACEMENT) before the failure (FAIL)
/// voids it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventPriority(pub u32);

impl EventPriority {
    pub const PART_GENERATION: EventPriority = EventPriority(10);
    pub const SPACE_REQUEST: EventPriority = EventPriority(20);
    pub const PART_PLACEMENT: EventPriority = EventPriority(30);
    pub const RESTORE: EventPriority = EventPriority(40);
    pub const DEGRADE: EventPriority = EventPriority(50);
    pub const MAINTENANCE_REQUEST: EventPriority = EventPriority(60);
    pub const FAIL: EventPriority = EventPriority(70);
    pub const QUEUE_INSPECTION: EventPriority = EventPriority(80);
    pub const BEGIN_MAINTENANCE: EventPriority = EventPriority(90);
    pub const PART_REQUEST: EventPriority = EventPriority(100);
    pub const PART_RETRIEVAL: EventPriority = EventPriority(110);
    pub const TERMINATE: EventPriority = EventPriority(120);

    /// Resource grants run after restores release their holdings but
    /// before the same instant's degradation bookkeeping.
    pub const RESOURCE_GRANT: EventPriority =
        EventPriority::between(EventPriority::RESTORE, EventPriority::DEGRADE);

    /// A priority slightly earlier than `other`.
    pub const fn before(other: EventPriority) -> EventPriority {
        EventPriority(other.0.saturating_sub(1))
    }

    /// A priority slightly later than `other`.
    pub const fn after(other: EventPriority) -> EventPriority {
        EventPriority(other.0 + 1)
    }

    /// The midpoint between two priorities.
    pub const fn between(a: EventPriority, b: EventPriority) -> EventPriority {
        EventPriority((a.0 + b.0) / 2)
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of actions a scheduled event can trigger. Actions carry
/// ids only, never callables, so the queue contents stay inspectable and
/// snapshot-friendly; the system dispatches them to the owning asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventAction {
    /// A source finishes producing its next part.
    GeneratePart,
    /// A device holding output selects the downstream to offer it to.
    OfferPart,
    /// Commit of an offered item across the tagged edge.
    PlacePart,
    /// A machine finishes its processing cycle.
    FinishProcessing,
    /// A device under maintenance is restored to service.
    FinishMaintenance { order: WorkOrderId },
    /// A tracked device accrues wear.
    Degrade { amount: u32 },
    /// Condition-based request for maintenance on a device.
    RequestMaintenance { device: AssetId, tag: String },
    /// A device's health reached its failure condition.
    Fail,
    /// The maintainer looks for promotable work orders.
    InspectQueue,
    /// The maintainer starts an active work order on its device.
    BeginMaintenance { order: WorkOrderId },
    /// A device with free space asks its upstreams for a part.
    RequestPart,
    /// Pull-side commit across the tagged edge.
    RetrievePart,
    /// The resource manager serves its pending reservation queue.
    ServeResourceQueue,
    /// A resource pool follows its capacity schedule.
    UpdatePoolCapacity { pool: String, total: u64 },
    /// End of the simulation run.
    Terminate,
}

/// A scheduled simulation action. Owned exclusively by the event queue
/// until popped. `seq` is the queue-assigned insertion number used as the
/// final deterministic tie-break; `edge` tags in-flight handshake commits
/// with their (upstream, downstream) pair so severing the relation can
/// cancel them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub time: SimTime,
    pub priority: EventPriority,
    pub seq: u64,
    pub target: AssetId,
    pub action: EventAction,
    pub label: String,
    pub edge: Option<(AssetId, AssetId)>,
    pub cancelled: bool,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event t={} prio={} seq={} target={} {:?} [{}]",
            self.time, self.priority, self.seq, self.target, self.action, self.label
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interstitial_slots_sit_between_builtins() {
        let custom = EventPriority::between(
            EventPriority::PART_GENERATION,
            EventPriority::SPACE_REQUEST,
        );
        assert!(EventPriority::PART_GENERATION < custom);
        assert!(custom < EventPriority::SPACE_REQUEST);

        assert!(EventPriority::RESTORE < EventPriority::RESOURCE_GRANT);
        assert!(EventPriority::RESOURCE_GRANT < EventPriority::DEGRADE);

        assert!(EventPriority::before(EventPriority::FAIL) < EventPriority::FAIL);
        assert!(EventPriority::after(EventPriority::FAIL) > EventPriority::FAIL);
    }
}
