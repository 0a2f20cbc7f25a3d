use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::core::time::{SimTime, TimeDistribution};
use crate::core::types::AssetId;
use crate::factory::part::{Item, Part, PartTemplate};
use crate::maintenance::tracker::StatusTracker;

/// One recorded change to an asset's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub label: String,
    pub time: SimTime,
    pub change: f64,
    pub new_value: f64,
}

/// Identity, value tracking, relations and handshake markers shared by
/// every device variant.
#[derive(Debug)]
pub struct DeviceCore {
    pub(crate) id: AssetId,
    pub(crate) name: String,
    pub(crate) value: f64,
    pub(crate) value_history: Vec<ValueChange>,
    /// Devices that can pass parts to this one, in registration order.
    pub(crate) upstream: Vec<AssetId>,
    /// Devices that receive parts from this one, in registration order.
    /// Derived from upstream assignments, never set directly.
    pub(crate) downstream: Vec<AssetId>,
    /// Per-downstream timestamp of its oldest unmet part request. At most
    /// one entry per ordered (this, downstream) pair.
    pub(crate) unmet_requests: BTreeMap<AssetId, SimTime>,
    /// When this device started waiting for a part, if it is waiting.
    pub(crate) waiting_since: Option<SimTime>,
    /// A part request event is scheduled but has not executed yet.
    pub(crate) request_pending: bool,
    /// An offer event is scheduled but has not executed yet.
    pub(crate) offer_pending: bool,
    /// The last offer found no downstream able to accept; the device is
    /// listening for a became-free notification instead of polling.
    pub(crate) blocked_for_space: bool,
    /// Item being worked on (machines) or held at the door (batchers).
    pub(crate) input: Option<Item>,
    /// Finished item waiting to move downstream.
    pub(crate) output: Option<Item>,
}

impl DeviceCore {
    pub(crate) fn new(id: AssetId, name: String) -> Self {
        Self {
            id,
            name,
            value: 0.0,
            value_history: Vec::new(),
            upstream: Vec::new(),
            downstream: Vec::new(),
            unmet_requests: BTreeMap::new(),
            waiting_since: None,
            request_pending: false,
            offer_pending: false,
            blocked_for_space: false,
            input: None,
            output: None,
        }
    }

    pub(crate) fn add_value(&mut self, label: &str, time: SimTime, change: f64) {
        self.value += change;
        self.value_history.push(ValueChange {
            label: label.to_string(),
            time,
            change,
            new_value: self.value,
        });
    }

    pub(crate) fn reset_handshake_flags(&mut self) {
        self.waiting_since = None;
        self.request_pending = false;
        self.offer_pending = false;
        self.blocked_for_space = false;
    }
}

/// Processing cycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    WaitingForPart,
    Processing,
    WaitingForResources,
    WaitingForSpaceDownstream,
    Failed,
    UnderMaintenance,
}

/// Hook applied to each part exactly once per successful processing
/// cycle, before the downstream offer attempt.
pub type ProcessHook = Box<dyn FnMut(&mut Part, &mut StdRng)>;

/// Produces new parts from a template. Sources have no upstream.
pub struct Source {
    pub(crate) template: PartTemplate,
    pub(crate) cycle_time: TimeDistribution,
    pub(crate) max_parts: Option<u64>,
    pub(crate) produced: u64,
}

impl Source {
    pub fn new(cycle_time: TimeDistribution) -> Self {
        Self {
            template: PartTemplate::default(),
            cycle_time,
            max_parts: None,
            produced: 0,
        }
    }

    pub fn with_template(mut self, template: PartTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_max_parts(mut self, max_parts: u64) -> Self {
        self.max_parts = Some(max_parts);
        self
    }
}

/// Processes one item per cycle. The only variant that can carry a
/// health tracker and reserve shared resources.
pub struct Machine {
    pub(crate) cycle_time: TimeDistribution,
    pub(crate) state: MachineState,
    pub(crate) required_resources: BTreeMap<String, u64>,
    pub(crate) holds_resources: bool,
    pub(crate) process_hook: Option<ProcessHook>,
}

impl Machine {
    pub fn new(cycle_time: TimeDistribution) -> Self {
        Self {
            cycle_time,
            state: MachineState::Idle,
            required_resources: BTreeMap::new(),
            holds_resources: false,
            process_hook: None,
        }
    }

    /// Resources reserved for the span of each processing cycle and
    /// released when the cycle finishes.
    pub fn with_required_resources(
        mut self,
        resources: impl IntoIterator<Item = (String, u64)>,
    ) -> Self {
        self.required_resources = resources.into_iter().collect();
        self
    }

    pub fn with_process_hook(mut self, hook: ProcessHook) -> Self {
        self.process_hook = Some(hook);
        self
    }
}

/// Stores items in arrival order up to a capacity. An item becomes
/// eligible to leave only `min_storage_time` after admission.
pub struct Buffer {
    pub(crate) capacity: usize,
    pub(crate) min_storage_time: f64,
    pub(crate) store: VecDeque<(Item, SimTime)>,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            min_storage_time: 0.0,
            store: VecDeque::new(),
        }
    }

    pub fn with_min_storage_time(mut self, min_storage_time: f64) -> Self {
        self.min_storage_time = min_storage_time;
        self
    }

    pub fn level(&self) -> usize {
        self.store.len()
    }

    fn head_ready_at(&self) -> Option<SimTime> {
        self.store
            .front()
            .map(|(_, admitted)| *admitted + self.min_storage_time)
    }
}

/// End of a production line: receives any number of items and never
/// passes them on. Received part value accrues to the sink.
pub struct Sink {
    pub(crate) cycle_time: f64,
    pub(crate) last_receipt: Option<SimTime>,
    pub(crate) collect_parts: bool,
    pub(crate) collected: Vec<Item>,
    pub(crate) received_count: u64,
    pub(crate) received_value: f64,
}

impl Sink {
    pub fn new() -> Self {
        Self {
            cycle_time: 0.0,
            last_receipt: None,
            collect_parts: false,
            collected: Vec::new(),
            received_count: 0,
            received_value: 0.0,
        }
    }

    /// Minimum interval between receipts.
    pub fn with_cycle_time(mut self, cycle_time: f64) -> Self {
        self.cycle_time = cycle_time;
        self
    }

    /// Keep received items instead of discarding them.
    pub fn with_collection(mut self) -> Self {
        self.collect_parts = true;
        self
    }

    fn ready_to_receive(&self, now: SimTime) -> bool {
        match self.last_receipt {
            None => true,
            Some(last) => now >= last + self.cycle_time,
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

/// Filters which items may pass between its upstreams and downstreams.
/// A gate never holds an item: it forwards in the same instant or
/// refuses.
pub struct DecisionGate {
    pub(crate) should_pass: Box<dyn Fn(&Item) -> bool>,
}

impl DecisionGate {
    pub fn new(should_pass: impl Fn(&Item) -> bool + 'static) -> Self {
        Self {
            should_pass: Box::new(should_pass),
        }
    }
}

/// Regroups incoming parts and batches into batches of a configured size,
/// or back into individual parts when no size is set. Excess parts wait
/// in an internal store.
pub struct PartBatcher {
    pub(crate) output_batch_size: Option<usize>,
    pub(crate) store: VecDeque<Part>,
}

impl PartBatcher {
    pub fn new(output_batch_size: Option<usize>) -> Self {
        Self {
            output_batch_size,
            store: VecDeque::new(),
        }
    }
}

/// The closed set of device variants. Shared flow-control behavior lives
/// on `Device`/the system; these carry only variant-specific state.
pub enum DeviceKind {
    Source(Source),
    Machine(Machine),
    Buffer(Buffer),
    Sink(Sink),
    DecisionGate(DecisionGate),
    PartBatcher(PartBatcher),
}

impl DeviceKind {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            DeviceKind::Source(_) => "source",
            DeviceKind::Machine(_) => "machine",
            DeviceKind::Buffer(_) => "buffer",
            DeviceKind::Sink(_) => "sink",
            DeviceKind::DecisionGate(_) => "decision_gate",
            DeviceKind::PartBatcher(_) => "part_batcher",
        }
    }
}

/// A registered participant in part flow: shared core, variant payload,
/// and the optional health-tracking capability (machines only).
pub struct Device {
    pub(crate) core: DeviceCore,
    pub(crate) kind: DeviceKind,
    pub(crate) tracker: Option<StatusTracker>,
}

impl Device {
    pub(crate) fn new(id: AssetId, name: String, kind: DeviceKind) -> Self {
        Self {
            core: DeviceCore::new(id, name),
            kind,
            tracker: None,
        }
    }

    pub fn id(&self) -> AssetId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn value(&self) -> f64 {
        self.core.value
    }

    pub fn value_history(&self) -> &[ValueChange] {
        &self.core.value_history
    }

    pub fn upstream(&self) -> &[AssetId] {
        &self.core.upstream
    }

    pub fn downstream(&self) -> &[AssetId] {
        &self.core.downstream
    }

    /// Whether the device can perform its part handling functions.
    /// Failed or under-maintenance machines do not participate in flow
    /// control.
    pub fn is_operational(&self) -> bool {
        match &self.kind {
            DeviceKind::Machine(machine) => !matches!(
                machine.state,
                MachineState::Failed | MachineState::UnderMaintenance
            ),
            _ => true,
        }
    }

    /// Item-independent space check. Gates are topology-dependent and
    /// resolved by the system, which consults their downstreams.
    pub(crate) fn has_local_space(&self, now: SimTime) -> bool {
        if !self.is_operational() {
            return false;
        }
        match &self.kind {
            DeviceKind::Source(_) => false,
            DeviceKind::Machine(_) => self.core.input.is_none() && self.core.output.is_none(),
            DeviceKind::Buffer(buffer) => buffer.level() < buffer.capacity,
            DeviceKind::Sink(sink) => sink.ready_to_receive(now),
            DeviceKind::DecisionGate(_) => true,
            DeviceKind::PartBatcher(_) => self.core.input.is_none(),
        }
    }

    /// Whether the device holds output that is eligible to move now.
    pub(crate) fn has_ready_output(&self, now: SimTime) -> bool {
        if !self.is_operational() {
            return false;
        }
        match &self.kind {
            DeviceKind::Buffer(buffer) => match buffer.head_ready_at() {
                Some(ready_at) => now >= ready_at,
                None => false,
            },
            _ => self.core.output.is_some(),
        }
    }

    pub(crate) fn take_ready_output(&mut self, now: SimTime) -> Option<Item> {
        if !self.has_ready_output(now) {
            return None;
        }
        match &mut self.kind {
            DeviceKind::Buffer(buffer) => buffer.store.pop_front().map(|(item, _)| item),
            _ => self.core.output.take(),
        }
    }

    /// Put back an item whose transfer was refused mid-commit.
    pub(crate) fn restore_output(&mut self, item: Item, now: SimTime) {
        match &mut self.kind {
            DeviceKind::Buffer(buffer) => {
                // Returning to the front keeps arrival order; the item
                // already satisfied its storage time.
                let admitted = SimTime(now.value() - buffer.min_storage_time);
                buffer.store.push_front((item, admitted));
            }
            _ => self.core.output = Some(item),
        }
    }

}
