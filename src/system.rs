use log::{debug, error, info};
use rayon::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::core::environment::Environment;
use crate::core::error::SimulationError;
use crate::core::event::{Event, EventAction, EventPriority};
use crate::core::recorder::{DataPoint, MemoryRecorder, Recorder};
use crate::core::time::SimTime;
use crate::core::types::{AssetId, WorkOrderId};
use crate::factory::device::{
    Buffer, DecisionGate, Device, DeviceKind, Machine, MachineState, PartBatcher, Sink, Source,
};
use crate::factory::part::Item;
use crate::maintenance::maintainer::Maintainer;
use crate::maintenance::tracker::StatusTracker;
use crate::resources::ResourceManager;

/// Target id used for events owned by the simulation itself.
pub(crate) const SYSTEM_ID: AssetId = AssetId(0);
const MAINTAINER_ID: AssetId = AssetId(1);
const RESOURCE_MANAGER_ID: AssetId = AssetId(2);
const FIRST_DEVICE_ID: u64 = 3;

/// Observer of simulation happenings. Callbacks run synchronously,
/// immediately after the event they annotate and before the next event
/// is popped, preserving the single-threaded ordering guarantee.
pub trait SimulationObserver {
    fn on_event_executed(&mut self, _now: SimTime, _event: &Event) {}
    fn on_part_received(&mut self, _now: SimTime, _device: AssetId, _item: &Item) {}
    fn on_part_finished(&mut self, _now: SimTime, _device: AssetId, _item: &Item) {}
    fn on_part_collected(&mut self, _now: SimTime, _sink: AssetId, _item: &Item) {}
    fn on_device_failed(&mut self, _now: SimTime, _device: AssetId, _lost: Option<&Item>) {}
    fn on_device_restored(&mut self, _now: SimTime, _device: AssetId) {}
}

/// Deferred observer notifications gathered while an event executes.
pub(crate) enum Notice {
    PartReceived { device: AssetId, item: Item },
    PartFinished { device: AssetId, item: Item },
    PartCollected { sink: AssetId, item: Item },
    DeviceFailed { device: AssetId, lost: Option<Item> },
    DeviceRestored { device: AssetId },
}

/// Result of one `simulate` call.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub run_id: Uuid,
    pub end_time: SimTime,
    pub events_executed: u64,
    pub parts_collected: u64,
}

/// Top-level container wiring the environment, the registered devices,
/// the maintainer and the resource manager. One system per simulation
/// run; independent replications build their own systems and share
/// nothing.
pub struct System {
    pub(crate) env: Environment,
    pub(crate) devices: BTreeMap<AssetId, Device>,
    pub(crate) maintainer: Maintainer,
    pub(crate) resources: ResourceManager,
    pub(crate) observers: Vec<Box<dyn SimulationObserver>>,
    pub(crate) notices: Vec<Notice>,
    pub(crate) next_part_id: u64,
    pub(crate) next_batch_id: u64,
    run_id: Uuid,
    next_asset_id: u64,
    pub(crate) initialized: bool,
}

impl System {
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Build a system whose random source is seeded for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            env: Environment::new(seed),
            devices: BTreeMap::new(),
            maintainer: Maintainer::new(MAINTAINER_ID, usize::MAX),
            resources: ResourceManager::new(RESOURCE_MANAGER_ID),
            observers: Vec::new(),
            notices: Vec::new(),
            next_part_id: 0,
            next_batch_id: 0,
            run_id: Uuid::new_v4(),
            next_asset_id: FIRST_DEVICE_ID,
            initialized: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn now(&self) -> SimTime {
        self.env.now()
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.env.set_recorder(recorder);
    }

    /// Keep datapoints in memory for retrieval through `memory_data`.
    pub fn record_in_memory(&mut self) {
        self.env.set_recorder(Box::new(MemoryRecorder::new()));
    }

    pub fn memory_data(&self) -> Option<&MemoryRecorder> {
        self.env.recorder().as_any().downcast_ref::<MemoryRecorder>()
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn maintainer(&self) -> &Maintainer {
        &self.maintainer
    }

    pub fn maintainer_mut(&mut self) -> &mut Maintainer {
        &mut self.maintainer
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    // ---- registration -------------------------------------------------

    fn add_device(&mut self, name: &str, kind: DeviceKind) -> AssetId {
        let id = AssetId(self.next_asset_id);
        self.next_asset_id += 1;
        let name = if name.is_empty() {
            format!("{}_{}", kind.kind_name(), id.0)
        } else {
            name.to_string()
        };
        self.devices.insert(id, Device::new(id, name, kind));
        id
    }

    pub fn add_source(&mut self, name: &str, source: Source) -> AssetId {
        self.add_device(name, DeviceKind::Source(source))
    }

    pub fn add_machine(&mut self, name: &str, machine: Machine) -> AssetId {
        self.add_device(name, DeviceKind::Machine(machine))
    }

    /// Register a machine together with its health-tracking capability.
    pub fn add_machine_with_tracker(
        &mut self,
        name: &str,
        machine: Machine,
        tracker: StatusTracker,
    ) -> AssetId {
        let id = self.add_device(name, DeviceKind::Machine(machine));
        if let Some(device) = self.devices.get_mut(&id) {
            device.tracker = Some(tracker);
        }
        id
    }

    pub fn add_buffer(&mut self, name: &str, buffer: Buffer) -> AssetId {
        self.add_device(name, DeviceKind::Buffer(buffer))
    }

    pub fn add_sink(&mut self, name: &str, sink: Sink) -> AssetId {
        self.add_device(name, DeviceKind::Sink(sink))
    }

    pub fn add_decision_gate(&mut self, name: &str, gate: DecisionGate) -> AssetId {
        self.add_device(name, DeviceKind::DecisionGate(gate))
    }

    pub fn add_part_batcher(&mut self, name: &str, batcher: PartBatcher) -> AssetId {
        self.add_device(name, DeviceKind::PartBatcher(batcher))
    }

    pub fn device(&self, id: AssetId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn find_device(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.name() == name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn machine_state(&self, id: AssetId) -> Option<MachineState> {
        match &self.devices.get(&id)?.kind {
            DeviceKind::Machine(machine) => Some(machine.state),
            _ => None,
        }
    }

    pub fn health(&self, id: AssetId) -> Option<u32> {
        self.devices
            .get(&id)?
            .tracker
            .as_ref()
            .map(|tracker| tracker.health())
    }

    pub fn buffer_level(&self, id: AssetId) -> Option<usize> {
        match &self.devices.get(&id)?.kind {
            DeviceKind::Buffer(buffer) => Some(buffer.level()),
            _ => None,
        }
    }

    pub fn parts_collected(&self, id: AssetId) -> Option<u64> {
        match &self.devices.get(&id)?.kind {
            DeviceKind::Sink(sink) => Some(sink.received_count),
            _ => None,
        }
    }

    /// Items a collecting sink has retained, in receipt order.
    pub fn collected_items(&self, id: AssetId) -> Option<&[Item]> {
        match &self.devices.get(&id)?.kind {
            DeviceKind::Sink(sink) => Some(&sink.collected),
            _ => None,
        }
    }

    pub fn sink_value(&self, id: AssetId) -> Option<f64> {
        match &self.devices.get(&id)?.kind {
            DeviceKind::Sink(sink) => Some(sink.received_value),
            _ => None,
        }
    }

    fn total_parts_collected(&self) -> u64 {
        self.devices
            .values()
            .filter_map(|device| match &device.kind {
                DeviceKind::Sink(sink) => Some(sink.received_count),
                _ => None,
            })
            .sum()
    }

    /// Pending events in execution order, for inspection and tests.
    pub fn pending_events(&self) -> impl Iterator<Item = &Event> {
        self.env.pending_events()
    }

    // ---- run loop -----------------------------------------------------

    /// Run the simulation for `duration` time units from the current
    /// clock. May be called repeatedly to continue a run.
    pub fn simulate(&mut self, duration: f64) -> Result<SimulationSummary, SimulationError> {
        if !self.initialized {
            self.initialize()?;
        }
        let collected_before = self.total_parts_collected();
        let events_before = self.env.events_executed();
        let end = self.env.now() + duration;
        self.env.clear_terminated();
        self.env.schedule_event(
            end,
            EventPriority::TERMINATE,
            SYSTEM_ID,
            EventAction::Terminate,
            "end of run",
        )?;
        info!(
            "run {} simulating from t={} for {} time units",
            self.run_id,
            self.env.now(),
            duration
        );

        while self.step()? {}

        let summary = SimulationSummary {
            run_id: self.run_id,
            end_time: self.env.now(),
            events_executed: self.env.events_executed() - events_before,
            parts_collected: self.total_parts_collected() - collected_before,
        };
        info!(
            "run {} finished at t={}: {} events, {} parts collected",
            self.run_id, summary.end_time, summary.events_executed, summary.parts_collected
        );
        Ok(summary)
    }

    /// Execute the next event. Returns whether more work remains.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        let Some(event) = self.env.pop_next() else {
            return Ok(false);
        };
        if !event.cancelled {
            debug!("executing {}", event);
            if let Err(err) = self.execute_action(&event) {
                error!("failed {}: {}", event, err);
                return Err(err);
            }
            self.flush_notices(&event);
        }
        Ok(self.env.has_events() && !self.env.is_terminated())
    }

    fn flush_notices(&mut self, event: &Event) {
        let notices = std::mem::take(&mut self.notices);
        let now = self.env.now();
        for observer in &mut self.observers {
            observer.on_event_executed(now, event);
            for notice in &notices {
                match notice {
                    Notice::PartReceived { device, item } => {
                        observer.on_part_received(now, *device, item)
                    }
                    Notice::PartFinished { device, item } => {
                        observer.on_part_finished(now, *device, item)
                    }
                    Notice::PartCollected { sink, item } => {
                        observer.on_part_collected(now, *sink, item)
                    }
                    Notice::DeviceFailed { device, lost } => {
                        observer.on_device_failed(now, *device, lost.as_ref())
                    }
                    Notice::DeviceRestored { device } => {
                        observer.on_device_restored(now, *device)
                    }
                }
            }
        }
    }

    fn initialize(&mut self) -> Result<(), SimulationError> {
        self.initialized = true;
        let now = self.env.now();

        let ids: Vec<AssetId> = self.devices.keys().copied().collect();
        for id in ids {
            let generate_at = {
                let Self { devices, env, .. } = self;
                let device = devices.get_mut(&id).expect("registered id");
                match &device.kind {
                    DeviceKind::Source(source) => {
                        Some(now + source.cycle_time.sample(&mut env.rng))
                    }
                    _ => None,
                }
            };
            if let Some(at) = generate_at {
                let label = format!("by {}", self.devices[&id].name());
                self.env.schedule_event(
                    at,
                    EventPriority::PART_GENERATION,
                    id,
                    EventAction::GeneratePart,
                    label,
                )?;
            } else if self.can_accept_any(id, now) {
                self.begin_waiting(id, 0.0)?;
            }
            self.schedule_next_degrade(id)?;
        }

        // Turn pool capacity schedules into events.
        let updates: Vec<(String, SimTime, u64)> = self
            .resources
            .pools()
            .flat_map(|pool| {
                pool.schedule
                    .iter()
                    .filter(|(time, _)| *time >= now)
                    .map(|(time, total)| (pool.name.clone(), *time, *total))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (pool, time, total) in updates {
            self.env.schedule_event(
                time,
                EventPriority::RESOURCE_GRANT,
                self.resources.id,
                EventAction::UpdatePoolCapacity { pool, total },
                "pool capacity schedule",
            )?;
        }
        Ok(())
    }

    fn execute_action(&mut self, event: &Event) -> Result<(), SimulationError> {
        match &event.action {
            EventAction::GeneratePart => self.execute_generate_part(event.target),
            EventAction::OfferPart => self.execute_offer_part(event.target),
            EventAction::PlacePart => self.execute_place_part(event),
            EventAction::FinishProcessing => self.execute_finish_processing(event.target),
            EventAction::RequestPart => self.execute_request_part(event.target),
            EventAction::RetrievePart => self.execute_retrieve_part(event),
            EventAction::Degrade { amount } => self.execute_degrade(event.target, *amount),
            EventAction::Fail => self.execute_fail(event.target),
            EventAction::RequestMaintenance { device, tag } => {
                self.request_maintenance(*device, tag.clone())
            }
            EventAction::InspectQueue => self.execute_inspect_queue(),
            EventAction::BeginMaintenance { order } => self.execute_begin_maintenance(*order),
            EventAction::FinishMaintenance { order } => {
                self.execute_finish_maintenance(event.target, *order)
            }
            EventAction::ServeResourceQueue => self.execute_serve_resource_queue(),
            EventAction::UpdatePoolCapacity { pool, total } => {
                self.execute_update_pool_capacity(pool.clone(), *total)
            }
            EventAction::Terminate => {
                self.env.terminate();
                Ok(())
            }
        }
    }

    // ---- degradation and failure --------------------------------------

    pub(crate) fn schedule_next_degrade(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let Self { devices, env, .. } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Ok(());
        };
        let name = device.core.name.clone();
        let Some(tracker) = &device.tracker else {
            return Ok(());
        };
        if tracker.failed {
            return Ok(());
        }
        if let Some((delay, amount)) = tracker.degradation.next_degrade(tracker.health, &mut env.rng)
        {
            let now = env.now();
            env.schedule_event(
                now + delay,
                EventPriority::DEGRADE,
                id,
                EventAction::Degrade { amount },
                format!("wear on {}", name),
            )?;
        }
        Ok(())
    }

    fn execute_degrade(&mut self, id: AssetId, amount: u32) -> Result<(), SimulationError> {
        let (name, health, failure_level, threshold, tag) = {
            let Self { devices, env, .. } = self;
            let Some(device) = devices.get_mut(&id) else {
                return Ok(());
            };
            if !device.is_operational() {
                return Ok(());
            }
            let name = device.core.name.clone();
            let Some(tracker) = &mut device.tracker else {
                return Ok(());
            };
            if tracker.failed {
                return Ok(());
            }
            tracker.health = (tracker.health + amount).min(tracker.failure_level);
            let now = env.now();
            env.add_datapoint(
                "health_update",
                &name,
                DataPoint::single(now, tracker.health as f64),
            );
            (
                name,
                tracker.health,
                tracker.failure_level,
                tracker.maintenance_threshold,
                tracker.maintenance_tag.clone(),
            )
        };
        let now = self.env.now();

        if health >= failure_level {
            self.env.schedule_event(
                now,
                EventPriority::FAIL,
                id,
                EventAction::Fail,
                format!("{} wore out", name),
            )?;
            return Ok(());
        }
        if let Some(threshold) = threshold {
            if health >= threshold && !self.maintainer.has_open_order(id, &tag) {
                self.env.schedule_event(
                    now,
                    EventPriority::MAINTENANCE_REQUEST,
                    self.maintainer.id(),
                    EventAction::RequestMaintenance { device: id, tag },
                    format!("{} passed its maintenance threshold", name),
                )?;
            }
        }
        self.schedule_next_degrade(id)
    }

    fn execute_fail(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let now = self.env.now();
        let tag = {
            let Some(device) = self.devices.get_mut(&id) else {
                return Ok(());
            };
            let Some(tracker) = &mut device.tracker else {
                return Ok(());
            };
            tracker.failed = true;
            tracker.health = tracker.failure_level;
            tracker.maintenance_tag.clone()
        };

        // A failure voids everything the device had in flight.
        self.env.cancel_for_target(id);
        self.release_machine_resources(id)?;
        self.withdraw_from_flow(id);

        let (name, lost) = {
            let device = self.devices.get_mut(&id).expect("checked above");
            let lost = device.core.input.take();
            if let DeviceKind::Machine(machine) = &mut device.kind {
                machine.state = MachineState::Failed;
            }
            (device.core.name.clone(), lost)
        };
        self.env
            .add_datapoint("device_failures", &name, DataPoint::single(now, 1.0));
        debug!("{} failed at t={}", name, now);
        self.notices.push(Notice::DeviceFailed { device: id, lost });

        self.request_maintenance(id, tag)
    }

    // ---- maintenance coordination -------------------------------------

    /// Queue a corrective or preventive work order for a device. Requests
    /// for a healthy or already-maintained device, and duplicates of an
    /// open order, are silently absorbed.
    pub fn request_maintenance(
        &mut self,
        id: AssetId,
        tag: String,
    ) -> Result<(), SimulationError> {
        let now = self.env.now();
        let expected = {
            let Some(device) = self.devices.get(&id) else {
                return Err(SimulationError::UnknownAsset(id));
            };
            let Some(tracker) = &device.tracker else {
                return Ok(());
            };
            if tracker.is_healthy() {
                return Ok(());
            }
            if let DeviceKind::Machine(machine) = &device.kind {
                if machine.state == MachineState::UnderMaintenance {
                    return Ok(());
                }
            }
            tracker.maintenance.expected_duration(&tag, tracker.health)
        };
        if self.maintainer.has_open_order(id, &tag) {
            return Ok(());
        }
        let name = self.devices[&id].core.name.clone();
        self.maintainer.create_order(id, &tag, now, expected);
        self.env
            .add_datapoint("enter_queue", &name, DataPoint::at(now));
        self.schedule_inspection()
    }

    fn schedule_inspection(&mut self) -> Result<(), SimulationError> {
        if self.maintainer.inspect_pending {
            return Ok(());
        }
        self.maintainer.inspect_pending = true;
        let now = self.env.now();
        self.env.schedule_event(
            now,
            EventPriority::QUEUE_INSPECTION,
            self.maintainer.id(),
            EventAction::InspectQueue,
            "inspect work order queue",
        )
    }

    fn execute_inspect_queue(&mut self) -> Result<(), SimulationError> {
        self.maintainer.inspect_pending = false;
        let now = self.env.now();
        while self.maintainer.has_free_capacity() {
            let Some(order) = self.maintainer.promote_next(now) else {
                break;
            };
            self.env.schedule_event(
                now,
                EventPriority::BEGIN_MAINTENANCE,
                self.maintainer.id(),
                EventAction::BeginMaintenance { order },
                "start work order",
            )?;
        }
        Ok(())
    }

    fn execute_begin_maintenance(&mut self, order: WorkOrderId) -> Result<(), SimulationError> {
        let now = self.env.now();
        let Some((device_id, tag)) = self
            .maintainer
            .work_order(order)
            .map(|o| (o.device, o.tag.clone()))
        else {
            return Ok(());
        };

        // A device already being maintained takes one order at a time;
        // an order whose device healed in the meantime is absorbed.
        match self.devices.get(&device_id) {
            Some(device) => {
                if matches!(&device.kind, DeviceKind::Machine(m) if m.state == MachineState::UnderMaintenance)
                {
                    self.maintainer.demote(order);
                    return Ok(());
                }
                if device
                    .tracker
                    .as_ref()
                    .map(|tracker| tracker.is_healthy())
                    .unwrap_or(true)
                {
                    self.maintainer.complete(order, now);
                    return Ok(());
                }
            }
            None => return Ok(()),
        }

        // The device stops participating in flow control; any item in
        // progress is retained and its cycle restarts after the restore.
        self.env.cancel_for_target(device_id);
        self.release_machine_resources(device_id)?;
        self.withdraw_from_flow(device_id);

        let (duration, cost, name) = {
            let Self { devices, env, .. } = self;
            let Some(device) = devices.get_mut(&device_id) else {
                return Ok(());
            };
            if let DeviceKind::Machine(machine) = &mut device.kind {
                machine.state = MachineState::UnderMaintenance;
            }
            let name = device.core.name.clone();
            let Some(tracker) = &device.tracker else {
                return Ok(());
            };
            (
                tracker.maintenance.duration(&tag, tracker.health, &mut env.rng),
                tracker.maintenance.cost(&tag, tracker.health),
                name,
            )
        };
        if cost != 0.0 {
            self.maintainer
                .add_cost(&format!("work order {} on {}", tag, name), now, cost);
        }
        self.env
            .add_datapoint("start_work_order", &name, DataPoint::at(now));
        debug!("maintenance on {} for {} time units", name, duration);
        self.env.schedule_event(
            now + duration,
            EventPriority::RESTORE,
            device_id,
            EventAction::FinishMaintenance { order },
            format!("restore {}", name),
        )
    }

    fn execute_finish_maintenance(
        &mut self,
        device_id: AssetId,
        order: WorkOrderId,
    ) -> Result<(), SimulationError> {
        let now = self.env.now();
        let (name, has_input, has_output) = {
            let Some(device) = self.devices.get_mut(&device_id) else {
                return Ok(());
            };
            if let Some(tracker) = &mut device.tracker {
                tracker.health = 0;
                tracker.failed = false;
            }
            (
                device.core.name.clone(),
                device.core.input.is_some(),
                device.core.output.is_some(),
            )
        };
        self.maintainer.complete(order, now);
        self.env
            .add_datapoint("finish_work_order", &name, DataPoint::at(now));
        self.notices.push(Notice::DeviceRestored { device: device_id });

        if has_input {
            self.start_machine_cycle(device_id)?;
        } else if has_output {
            let Self { devices, env, .. } = self;
            if let Some(device) = devices.get_mut(&device_id) {
                if let DeviceKind::Machine(machine) = &mut device.kind {
                    machine.state = MachineState::WaitingForSpaceDownstream;
                }
                Self::schedule_offer_inner(device, env, now)?;
            }
        } else {
            if let Some(device) = self.devices.get_mut(&device_id) {
                if let DeviceKind::Machine(machine) = &mut device.kind {
                    machine.state = MachineState::WaitingForPart;
                }
            }
            self.begin_waiting(device_id, 0.0)?;
        }

        self.schedule_next_degrade(device_id)?;
        self.schedule_inspection()
    }

    // ---- resources ----------------------------------------------------

    pub(crate) fn schedule_resource_service(&mut self) -> Result<(), SimulationError> {
        if self.resources.service_pending {
            return Ok(());
        }
        self.resources.service_pending = true;
        let now = self.env.now();
        self.env.schedule_event(
            now,
            EventPriority::RESOURCE_GRANT,
            self.resources.id(),
            EventAction::ServeResourceQueue,
            "serve resource queue",
        )
    }

    fn execute_serve_resource_queue(&mut self) -> Result<(), SimulationError> {
        self.resources.service_pending = false;
        let granted = self.resources.serve_waiting();
        for device_id in granted {
            if let Some(device) = self.devices.get_mut(&device_id) {
                if let DeviceKind::Machine(machine) = &mut device.kind {
                    machine.holds_resources = true;
                }
            }
            self.start_machine_cycle(device_id)?;
        }
        Ok(())
    }

    fn execute_update_pool_capacity(
        &mut self,
        pool: String,
        total: u64,
    ) -> Result<(), SimulationError> {
        let grew = self.resources.update_capacity(&pool, total)?;
        if grew {
            self.schedule_resource_service()?;
        }
        Ok(())
    }

    /// Release a machine's held reservation and drop any request it has
    /// queued. Used when the machine leaves service.
    fn release_machine_resources(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let released = {
            let Self {
                devices, resources, ..
            } = self;
            let Some(device) = devices.get_mut(&id) else {
                return Ok(());
            };
            resources.drop_requests_for(id);
            match &mut device.kind {
                DeviceKind::Machine(machine) if machine.holds_resources => {
                    resources.release(&machine.required_resources)?;
                    machine.holds_resources = false;
                    true
                }
                _ => false,
            }
        };
        if released {
            self.schedule_resource_service()?;
        }
        Ok(())
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

/// Run independent simulation replications in parallel. Each replication
/// builds and owns its whole system; nothing is shared between them.
pub fn run_replications<R, F>(replications: u64, run: F) -> Vec<R>
where
    F: Fn(u64) -> R + Sync + Send,
    R: Send,
{
    (0..replications).into_par_iter().map(run).collect()
}
