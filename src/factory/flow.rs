//! The one-hop flow-control handshake.
//!
//! A device that can take work announces it upstream (a part request); a
//! device with finished output picks the downstream whose unmet request
//! is strictly oldest (registration order breaks ties) and commits the
//! transfer with an edge-tagged event. Blocked devices schedule no
//! continuation of their own: they are reactivated when a peer's state
//! change delivers a request or an offer. No global cycle detection is
//! performed; a topology that starves itself simply stays blocked.

use log::debug;

use crate::core::environment::Environment;
use crate::core::error::SimulationError;
use crate::core::event::{Event, EventAction, EventPriority};
use crate::core::recorder::DataPoint;
use crate::core::time::SimTime;
use crate::core::types::{AssetId, BatchId, PartId};
use crate::factory::device::{Device, DeviceKind, MachineState};
use crate::factory::part::{Batch, Item, Part};
use crate::system::{Notice, System};

impl System {
    // ---- topology -----------------------------------------------------

    /// Replace a device's upstream set. Relations are mutable at any
    /// time, including mid-simulation: severed pairs leave no queued
    /// handshake event behind, and a device that was waiting for a part
    /// restarts its wait at the current time.
    pub fn set_upstream(
        &mut self,
        id: AssetId,
        upstream: &[AssetId],
    ) -> Result<(), SimulationError> {
        if !self.devices.contains_key(&id) {
            return Err(SimulationError::UnknownAsset(id));
        }
        for (i, u) in upstream.iter().enumerate() {
            if *u == id {
                return Err(SimulationError::Configuration(format!(
                    "device {} cannot be its own upstream",
                    self.devices[&id].name()
                )));
            }
            if upstream[..i].contains(u) {
                return Err(SimulationError::Configuration(format!(
                    "duplicate upstream {} for {}",
                    u,
                    self.devices[&id].name()
                )));
            }
            let Some(up_device) = self.devices.get(u) else {
                return Err(SimulationError::UnknownAsset(*u));
            };
            if matches!(up_device.kind, DeviceKind::Sink(_)) {
                return Err(SimulationError::Configuration(format!(
                    "sink {} cannot have a downstream",
                    up_device.name()
                )));
            }
        }
        if matches!(self.devices[&id].kind, DeviceKind::Source(_)) && !upstream.is_empty() {
            return Err(SimulationError::Configuration(format!(
                "source {} cannot have an upstream",
                self.devices[&id].name()
            )));
        }

        let old = self.devices[&id].core.upstream.clone();
        for u in &old {
            if !upstream.contains(u) {
                if let Some(up_device) = self.devices.get_mut(u) {
                    up_device.core.downstream.retain(|d| *d != id);
                    up_device.core.unmet_requests.remove(&id);
                }
                self.env.remove_for_edge((*u, id));
            }
        }
        for u in upstream {
            if !old.contains(u) {
                if let Some(up_device) = self.devices.get_mut(u) {
                    up_device.core.downstream.push(id);
                }
            }
        }
        self.devices.get_mut(&id).expect("checked").core.upstream = upstream.to_vec();

        if self.initialized {
            // The wait starts over against the new upstream set.
            let was_waiting = {
                let device = self.devices.get_mut(&id).expect("checked");
                let was = device.core.waiting_since.is_some() || device.core.request_pending;
                device.core.waiting_since = None;
                device.core.request_pending = false;
                was
            };
            self.env.cancel_where(|e: &Event| {
                e.target == id && matches!(e.action, EventAction::RequestPart)
            });
            let now = self.env.now();
            if was_waiting && self.can_accept_any(id, now) {
                self.begin_waiting(id, 0.0)?;
            }
        }
        Ok(())
    }

    // ---- waiting and requesting ---------------------------------------

    /// Start (or keep) waiting for a part. Schedules one part-request
    /// event after `delay`; a device that is already waiting keeps its
    /// original timestamp.
    pub(crate) fn begin_waiting(&mut self, id: AssetId, delay: f64) -> Result<(), SimulationError> {
        let Self { devices, env, .. } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Err(SimulationError::UnknownAsset(id));
        };
        if device.core.waiting_since.is_some() || device.core.request_pending {
            return Ok(());
        }
        device.core.request_pending = true;
        let now = env.now();
        env.schedule_event(
            now + delay,
            EventPriority::PART_REQUEST,
            id,
            EventAction::RequestPart,
            format!("for {}", device.core.name),
        )
    }

    /// Deliver this device's unmet-request marker to every upstream. An
    /// upstream already blocked with ready output answers with a
    /// pull-side retrieval; gates forward the demand further upstream.
    pub(crate) fn execute_request_part(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let now = self.env.now();
        {
            let Some(device) = self.devices.get_mut(&id) else {
                return Ok(());
            };
            device.core.request_pending = false;
            if !device.is_operational() {
                return Ok(());
            }
        }
        if !self.can_accept_any(id, now) {
            return Ok(());
        }
        let since = {
            let device = self.devices.get_mut(&id).expect("checked");
            if let DeviceKind::Machine(machine) = &mut device.kind {
                if machine.state == MachineState::Idle {
                    machine.state = MachineState::WaitingForPart;
                }
            }
            *device.core.waiting_since.get_or_insert(now)
        };
        let upstream = self.devices[&id].core.upstream.clone();
        for u in upstream {
            let (is_gate, answers) = {
                let Some(up_device) = self.devices.get(&u) else {
                    continue;
                };
                (
                    matches!(up_device.kind, DeviceKind::DecisionGate(_)),
                    up_device.core.blocked_for_space && up_device.has_ready_output(now),
                )
            };
            {
                // At most one in-flight request per ordered pair: a new
                // request simply refreshes the timestamp.
                let up_device = self.devices.get_mut(&u).expect("checked");
                up_device.core.unmet_requests.insert(id, since);
            }
            if is_gate {
                self.begin_waiting(u, 0.0)?;
            } else if answers {
                self.env.schedule_edge_event(
                    now,
                    EventPriority::PART_RETRIEVAL,
                    id,
                    EventAction::RetrievePart,
                    format!("from {}", self.devices[&u].name()),
                    Some((u, id)),
                )?;
            }
        }
        Ok(())
    }

    // ---- offering and committing --------------------------------------

    pub(crate) fn schedule_offer_inner(
        device: &mut Device,
        env: &mut Environment,
        at: SimTime,
    ) -> Result<(), SimulationError> {
        if device.core.offer_pending {
            return Ok(());
        }
        device.core.offer_pending = true;
        env.schedule_event(
            at,
            EventPriority::SPACE_REQUEST,
            device.core.id,
            EventAction::OfferPart,
            format!("from {}", device.core.name),
        )
    }

    pub(crate) fn schedule_offer(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let Self { devices, env, .. } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Ok(());
        };
        let now = env.now();
        Self::schedule_offer_inner(device, env, now)
    }

    /// Pick the downstream whose unmet request is strictly oldest,
    /// breaking ties by registration order. Requests from peers that can
    /// no longer accept are skipped.
    pub(crate) fn select_downstream(&self, u: AssetId, now: SimTime) -> Option<AssetId> {
        let device = self.devices.get(&u)?;
        let item = match &device.kind {
            DeviceKind::Buffer(buffer) => buffer.store.front().map(|(item, _)| item),
            _ => device.core.output.as_ref(),
        }?;
        let mut best: Option<(SimTime, AssetId)> = None;
        for d in &device.core.downstream {
            let Some(since) = device.core.unmet_requests.get(d) else {
                continue;
            };
            if !self.can_accept_item(*d, item, now) {
                continue;
            }
            match best {
                None => best = Some((*since, *d)),
                Some((best_since, _)) if *since < best_since => best = Some((*since, *d)),
                _ => {}
            }
        }
        best.map(|(_, d)| d)
    }

    pub(crate) fn execute_offer_part(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let now = self.env.now();
        {
            let Some(device) = self.devices.get_mut(&id) else {
                return Ok(());
            };
            device.core.offer_pending = false;
            if !device.is_operational() || !device.has_ready_output(now) {
                return Ok(());
            }
        }
        match self.select_downstream(id, now) {
            Some(target) => self.env.schedule_edge_event(
                now,
                EventPriority::PART_PLACEMENT,
                id,
                EventAction::PlacePart,
                format!("from {}", self.devices[&id].name()),
                Some((id, target)),
            ),
            None => {
                // Nobody can take it; wait for a became-free notification.
                self.devices.get_mut(&id).expect("checked").core.blocked_for_space = true;
                Ok(())
            }
        }
    }

    pub(crate) fn execute_place_part(&mut self, event: &Event) -> Result<(), SimulationError> {
        let Some((u, d)) = event.edge else {
            return Ok(());
        };
        let now = self.env.now();
        let valid = self
            .devices
            .get(&u)
            .map(|device| {
                device.is_operational()
                    && device.has_ready_output(now)
                    && device.core.downstream.contains(&d)
            })
            .unwrap_or(false);
        if !valid {
            return Ok(());
        }
        self.commit_transfer(u, d)
    }

    pub(crate) fn execute_retrieve_part(&mut self, event: &Event) -> Result<(), SimulationError> {
        let Some((u, d)) = event.edge else {
            return Ok(());
        };
        let now = self.env.now();
        let valid = self
            .devices
            .get(&u)
            .map(|device| {
                device.is_operational()
                    && device.has_ready_output(now)
                    && device.core.downstream.contains(&d)
            })
            .unwrap_or(false);
        if !valid {
            return Ok(());
        }
        match self.select_downstream(u, now) {
            // The requester is still the oldest-waiting downstream.
            Some(best) if best == d => self.commit_transfer(u, d),
            // An older request exists; let the upstream pick.
            Some(_) => self.schedule_offer(u),
            None => {
                self.devices.get_mut(&u).expect("checked").core.blocked_for_space = true;
                Ok(())
            }
        }
    }

    /// Move the upstream's ready output into the downstream. On refusal
    /// the item goes back and the upstream reselects.
    fn commit_transfer(&mut self, u: AssetId, d: AssetId) -> Result<(), SimulationError> {
        let now = self.env.now();
        let Some(item) = self
            .devices
            .get_mut(&u)
            .and_then(|device| device.take_ready_output(now))
        else {
            return Ok(());
        };
        let mut visited = Vec::new();
        match self.deliver_item(d, item, now, &mut visited)? {
            None => {
                let device = self.devices.get_mut(&u).expect("checked");
                device.core.unmet_requests.remove(&d);
                device.core.blocked_for_space = false;
                self.after_output_departure(u)
            }
            Some(item) => {
                // The request marker was stale; put the item back and
                // try the next candidate.
                let device = self.devices.get_mut(&u).expect("checked");
                device.restore_output(item, now);
                device.core.unmet_requests.remove(&d);
                self.schedule_offer(u)
            }
        }
    }

    // ---- acceptance ---------------------------------------------------

    /// Item-independent space check, seen through gates.
    pub(crate) fn can_accept_any(&self, id: AssetId, now: SimTime) -> bool {
        let mut visited = Vec::new();
        self.can_accept_any_inner(id, now, &mut visited)
    }

    fn can_accept_any_inner(&self, id: AssetId, now: SimTime, visited: &mut Vec<AssetId>) -> bool {
        let Some(device) = self.devices.get(&id) else {
            return false;
        };
        match &device.kind {
            DeviceKind::DecisionGate(_) => {
                if !device.is_operational() || visited.contains(&id) {
                    return false;
                }
                visited.push(id);
                device
                    .core
                    .downstream
                    .iter()
                    .any(|d| self.can_accept_any_inner(*d, now, visited))
            }
            _ => device.has_local_space(now),
        }
    }

    /// Whether `id` would take this specific item right now.
    pub(crate) fn can_accept_item(&self, id: AssetId, item: &Item, now: SimTime) -> bool {
        let mut visited = Vec::new();
        self.can_accept_item_inner(id, item, now, &mut visited)
    }

    fn can_accept_item_inner(
        &self,
        id: AssetId,
        item: &Item,
        now: SimTime,
        visited: &mut Vec<AssetId>,
    ) -> bool {
        let Some(device) = self.devices.get(&id) else {
            return false;
        };
        match &device.kind {
            DeviceKind::DecisionGate(gate) => {
                if !device.is_operational() || visited.contains(&id) {
                    return false;
                }
                if !(gate.should_pass)(item) {
                    return false;
                }
                visited.push(id);
                device
                    .core
                    .downstream
                    .iter()
                    .any(|d| self.can_accept_item_inner(*d, item, now, visited))
            }
            _ => device.has_local_space(now),
        }
    }

    // ---- delivery -----------------------------------------------------

    /// Hand an item to a device. `Ok(None)` means it was accepted and all
    /// receiver-side bookkeeping is done; `Ok(Some(item))` returns a
    /// refused item to the caller.
    fn deliver_item(
        &mut self,
        d: AssetId,
        item: Item,
        now: SimTime,
        visited: &mut Vec<AssetId>,
    ) -> Result<Option<Item>, SimulationError> {
        let Some(device) = self.devices.get(&d) else {
            return Ok(Some(item));
        };
        if matches!(device.kind, DeviceKind::DecisionGate(_)) {
            return self.deliver_via_gate(d, item, now, visited);
        }
        if !device.has_local_space(now) {
            return Ok(Some(item));
        }
        match &device.kind {
            DeviceKind::Machine(_) => self.deliver_to_machine(d, item, now),
            DeviceKind::Buffer(_) => self.deliver_to_buffer(d, item, now),
            DeviceKind::Sink(_) => self.deliver_to_sink(d, item, now),
            DeviceKind::PartBatcher(_) => self.deliver_to_batcher(d, item, now),
            DeviceKind::Source(_) | DeviceKind::DecisionGate(_) => Ok(Some(item)),
        }
    }

    /// Gates never hold an item: forward it within the same instant or
    /// refuse it.
    fn deliver_via_gate(
        &mut self,
        gate_id: AssetId,
        item: Item,
        now: SimTime,
        visited: &mut Vec<AssetId>,
    ) -> Result<Option<Item>, SimulationError> {
        {
            let device = self.devices.get(&gate_id).expect("caller checked");
            let DeviceKind::DecisionGate(gate) = &device.kind else {
                return Ok(Some(item));
            };
            if !device.is_operational() || visited.contains(&gate_id) {
                return Ok(Some(item));
            }
            if !(gate.should_pass)(&item) {
                return Ok(Some(item));
            }
        }
        visited.push(gate_id);
        let targets = self.devices[&gate_id].core.downstream.clone();
        let mut item = item;
        for target in targets {
            match self.deliver_item(target, item, now, visited)? {
                None => {
                    let device = self.devices.get_mut(&gate_id).expect("checked");
                    device.core.unmet_requests.remove(&target);
                    device.core.waiting_since = None;
                    if self.can_accept_any(gate_id, now) {
                        self.begin_waiting(gate_id, 0.0)?;
                    }
                    return Ok(None);
                }
                Some(back) => item = back,
            }
        }
        Ok(Some(item))
    }

    fn deliver_to_machine(
        &mut self,
        d: AssetId,
        item: Item,
        now: SimTime,
    ) -> Result<Option<Item>, SimulationError> {
        {
            let Self {
                devices,
                env,
                notices,
                ..
            } = self;
            let device = devices.get_mut(&d).expect("caller checked");
            env.add_datapoint(
                "received_parts",
                &device.core.name,
                DataPoint::single(now, item.quality()),
            );
            notices.push(Notice::PartReceived {
                device: d,
                item: item.clone(),
            });
            device.core.input = Some(item);
            device.core.waiting_since = None;
        }
        self.start_machine_cycle(d)?;
        Ok(None)
    }

    fn deliver_to_buffer(
        &mut self,
        d: AssetId,
        item: Item,
        now: SimTime,
    ) -> Result<Option<Item>, SimulationError> {
        {
            let Self {
                devices,
                env,
                notices,
                ..
            } = self;
            let device = devices.get_mut(&d).expect("caller checked");
            let DeviceKind::Buffer(buffer) = &mut device.kind else {
                return Ok(Some(item));
            };
            if buffer.store.len() >= buffer.capacity {
                return Err(SimulationError::CapacityViolation(format!(
                    "buffer {} is full ({} items)",
                    device.core.name, buffer.capacity
                )));
            }
            env.add_datapoint(
                "received_parts",
                &device.core.name,
                DataPoint::single(now, item.quality()),
            );
            notices.push(Notice::PartReceived {
                device: d,
                item: item.clone(),
            });
            buffer.store.push_back((item, now));
            device.core.waiting_since = None;
            if buffer.store.len() == 1 {
                // The admitted item is the new head; offer it once it
                // has satisfied the minimum storage time.
                let ready_at = now + buffer.min_storage_time;
                Self::schedule_offer_inner(device, env, ready_at)?;
            }
        }
        if self.can_accept_any(d, now) {
            self.begin_waiting(d, 0.0)?;
        }
        Ok(None)
    }

    fn deliver_to_sink(
        &mut self,
        d: AssetId,
        item: Item,
        now: SimTime,
    ) -> Result<Option<Item>, SimulationError> {
        let delay = {
            let Self {
                devices,
                env,
                notices,
                ..
            } = self;
            let device = devices.get_mut(&d).expect("caller checked");
            let name = device.core.name.clone();
            let DeviceKind::Sink(sink) = &mut device.kind else {
                return Ok(Some(item));
            };
            sink.received_count += item.part_count();
            sink.received_value += item.value();
            sink.last_receipt = Some(now);
            env.add_datapoint(
                "collected_parts",
                &name,
                DataPoint::single(now, item.part_count() as f64),
            );
            notices.push(Notice::PartCollected {
                sink: d,
                item: item.clone(),
            });
            let value = item.value();
            if sink.collect_parts {
                sink.collected.push(item);
            }
            // The part ends its life here; only its value remains.
            device.core.add_value("collected_part", now, value);
            device.core.waiting_since = None;
            match &device.kind {
                DeviceKind::Sink(sink) => sink.cycle_time,
                _ => 0.0,
            }
        };
        self.begin_waiting(d, delay)?;
        Ok(None)
    }

    fn deliver_to_batcher(
        &mut self,
        d: AssetId,
        item: Item,
        now: SimTime,
    ) -> Result<Option<Item>, SimulationError> {
        {
            let Self {
                devices,
                env,
                notices,
                ..
            } = self;
            let device = devices.get_mut(&d).expect("caller checked");
            env.add_datapoint(
                "received_parts",
                &device.core.name,
                DataPoint::single(now, item.quality()),
            );
            notices.push(Notice::PartReceived {
                device: d,
                item: item.clone(),
            });
            device.core.input = Some(item);
            device.core.waiting_since = None;
        }
        self.batcher_absorb(d)?;
        if self.can_accept_any(d, now) {
            self.begin_waiting(d, 0.0)?;
        }
        Ok(None)
    }

    /// Move a batcher's held input into its store and assemble the next
    /// output item when possible.
    fn batcher_absorb(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let Self {
            devices,
            env,
            next_batch_id,
            ..
        } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Ok(());
        };
        let DeviceKind::PartBatcher(batcher) = &mut device.kind else {
            return Ok(());
        };
        if device.core.output.is_some() {
            return Ok(());
        }
        if let Some(item) = device.core.input.take() {
            batcher.store.extend(item.into_parts());
        }
        match batcher.output_batch_size {
            None => {
                if let Some(part) = batcher.store.pop_front() {
                    device.core.output = Some(Item::Part(part));
                }
            }
            Some(size) => {
                if batcher.store.len() >= size {
                    let batch_id = BatchId(*next_batch_id);
                    *next_batch_id += 1;
                    let parts: Vec<Part> = batcher
                        .store
                        .drain(..size)
                        .map(|mut part| {
                            part.batch = Some(batch_id);
                            part
                        })
                        .collect();
                    device.core.output = Some(Item::Batch(Batch {
                        id: batch_id,
                        parts,
                    }));
                }
            }
        }
        if device.core.output.is_some() {
            let now = env.now();
            Self::schedule_offer_inner(device, env, now)?;
        }
        Ok(())
    }

    // ---- production ---------------------------------------------------

    pub(crate) fn execute_generate_part(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let Self {
            devices,
            env,
            next_part_id,
            ..
        } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Ok(());
        };
        let DeviceKind::Source(source) = &device.kind else {
            return Ok(());
        };
        if let Some(max) = source.max_parts {
            if source.produced >= max {
                return Ok(());
            }
        }
        if device.core.output.is_some() {
            return Ok(());
        }
        let part = Part {
            id: PartId(*next_part_id),
            quality: source.template.quality,
            value: source.template.value,
            batch: None,
        };
        *next_part_id += 1;
        device.core.output = Some(Item::Part(part));
        let now = env.now();
        Self::schedule_offer_inner(device, env, now)
    }

    pub(crate) fn start_machine_cycle(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let Self {
            devices,
            env,
            resources,
            ..
        } = self;
        let Some(device) = devices.get_mut(&id) else {
            return Ok(());
        };
        let name = device.core.name.clone();
        let DeviceKind::Machine(machine) = &mut device.kind else {
            return Ok(());
        };
        let now = env.now();
        if !machine.required_resources.is_empty() && !machine.holds_resources {
            if resources.try_reserve(&machine.required_resources) {
                machine.holds_resources = true;
            } else {
                machine.state = MachineState::WaitingForResources;
                resources.enqueue(id, machine.required_resources.clone(), now);
                return Ok(());
            }
        }
        machine.state = MachineState::Processing;
        let cycle = machine.cycle_time.sample(&mut env.rng);
        env.schedule_event(
            now + cycle,
            EventPriority::PART_PLACEMENT,
            id,
            EventAction::FinishProcessing,
            format!("by {}", name),
        )
    }

    pub(crate) fn execute_finish_processing(&mut self, id: AssetId) -> Result<(), SimulationError> {
        let released = {
            let Self {
                devices,
                env,
                resources,
                notices,
                ..
            } = self;
            let Some(device) = devices.get_mut(&id) else {
                return Ok(());
            };
            if !device.is_operational() {
                return Ok(());
            }
            let name = device.core.name.clone();
            let DeviceKind::Machine(machine) = &mut device.kind else {
                return Ok(());
            };
            if machine.state != MachineState::Processing {
                return Ok(());
            }
            let Some(mut item) = device.core.input.take() else {
                return Ok(());
            };
            // The quality/value hook runs exactly once per cycle, before
            // the downstream offer.
            if let Some(hook) = &mut machine.process_hook {
                item.for_each_part(|part| hook(part, &mut env.rng));
            }
            env.add_datapoint(
                "produced_parts",
                &name,
                DataPoint::single(env.now(), item.quality()),
            );
            notices.push(Notice::PartFinished {
                device: id,
                item: item.clone(),
            });
            let released = if machine.holds_resources {
                resources.release(&machine.required_resources)?;
                machine.holds_resources = false;
                true
            } else {
                false
            };
            device.core.output = Some(item);
            machine.state = MachineState::WaitingForSpaceDownstream;
            let now = env.now();
            Self::schedule_offer_inner(device, env, now)?;
            released
        };
        if released {
            self.schedule_resource_service()?;
        }
        Ok(())
    }

    /// Bookkeeping after a device's output item moved downstream.
    fn after_output_departure(&mut self, id: AssetId) -> Result<(), SimulationError> {
        enum FollowUp {
            None,
            Wait,
            Assemble,
        }
        let follow_up = {
            let Self { devices, env, .. } = self;
            let Some(device) = devices.get_mut(&id) else {
                return Ok(());
            };
            device.core.blocked_for_space = false;
            let now = env.now();
            match &mut device.kind {
                DeviceKind::Source(source) => {
                    source.produced += 1;
                    let value = source.template.value;
                    let name = device.core.name.clone();
                    device.core.add_value("supplied_part", now, -value);
                    env.add_datapoint("supplied_new_part", &name, DataPoint::at(now));
                    let more = source
                        .max_parts
                        .map(|max| source.produced < max)
                        .unwrap_or(true);
                    if more {
                        let cycle = source.cycle_time.sample(&mut env.rng);
                        env.schedule_event(
                            now + cycle,
                            EventPriority::PART_GENERATION,
                            id,
                            EventAction::GeneratePart,
                            format!("by {}", name),
                        )?;
                    }
                    FollowUp::None
                }
                DeviceKind::Machine(machine) => {
                    machine.state = MachineState::WaitingForPart;
                    FollowUp::Wait
                }
                DeviceKind::Buffer(buffer) => {
                    if let Some(ready_at) = buffer
                        .store
                        .front()
                        .map(|(_, admitted)| *admitted + buffer.min_storage_time)
                    {
                        let at = ready_at.max(now);
                        Self::schedule_offer_inner(device, env, at)?;
                    }
                    FollowUp::Wait
                }
                DeviceKind::PartBatcher(_) => FollowUp::Assemble,
                DeviceKind::Sink(_) | DeviceKind::DecisionGate(_) => FollowUp::None,
            }
        };
        match follow_up {
            FollowUp::None => Ok(()),
            FollowUp::Wait => self.begin_waiting(id, 0.0),
            FollowUp::Assemble => {
                self.batcher_absorb(id)?;
                let now = self.env.now();
                if self.can_accept_any(id, now) {
                    self.begin_waiting(id, 0.0)?;
                }
                Ok(())
            }
        }
    }

    /// Pull a device out of the handshake: clear its own wait state and
    /// withdraw its request markers from every upstream. Used when it
    /// fails or enters maintenance.
    pub(crate) fn withdraw_from_flow(&mut self, id: AssetId) {
        let upstream = match self.devices.get_mut(&id) {
            Some(device) => {
                device.core.reset_handshake_flags();
                device.core.upstream.clone()
            }
            None => return,
        };
        for u in upstream {
            if let Some(up_device) = self.devices.get_mut(&u) {
                up_device.core.unmet_requests.remove(&id);
            }
        }
        debug!("{} withdrew from flow control", id);
    }
}

#[cfg(test)]
mod tests {
    use crate::core::time::{SimTime, TimeDistribution};
    use crate::core::types::PartId;
    use crate::factory::device::{Machine, Sink, Source};
    use crate::factory::part::{Item, Part};
    use crate::system::System;

    fn sample_part(id: u64) -> Item {
        Item::Part(Part {
            id: PartId(id),
            quality: 1.0,
            value: 0.0,
            batch: None,
        })
    }

    #[test]
    fn oldest_unmet_request_wins_registration_order_breaks_ties() {
        let mut system = System::new();
        let machine = system.add_machine("m", Machine::new(TimeDistribution::Fixed(1.0)));
        let s1 = system.add_sink("s1", Sink::new());
        let s2 = system.add_sink("s2", Sink::new());
        let s3 = system.add_sink("s3", Sink::new());
        system.set_upstream(s1, &[machine]).unwrap();
        system.set_upstream(s2, &[machine]).unwrap();
        system.set_upstream(s3, &[machine]).unwrap();

        {
            let device = system.devices.get_mut(&machine).unwrap();
            device.core.output = Some(sample_part(1));
            // Requests issued at times 0, 1, 1; insertion order reversed
            // to rule out map-order effects.
            device.core.unmet_requests.insert(s3, SimTime(1.0));
            device.core.unmet_requests.insert(s2, SimTime(1.0));
            device.core.unmet_requests.insert(s1, SimTime(0.0));
        }

        assert_eq!(system.select_downstream(machine, SimTime(2.0)), Some(s1));

        // With the oldest request met, the time-1 pair ties and the one
        // registered first wins.
        system
            .devices
            .get_mut(&machine)
            .unwrap()
            .core
            .unmet_requests
            .remove(&s1);
        assert_eq!(system.select_downstream(machine, SimTime(2.0)), Some(s2));
    }

    #[test]
    fn stale_requests_from_filled_devices_are_skipped() {
        let mut system = System::new();
        let machine = system.add_machine("m", Machine::new(TimeDistribution::Fixed(1.0)));
        let busy = system.add_machine("busy", Machine::new(TimeDistribution::Fixed(1.0)));
        let idle = system.add_machine("idle", Machine::new(TimeDistribution::Fixed(1.0)));
        system.set_upstream(busy, &[machine]).unwrap();
        system.set_upstream(idle, &[machine]).unwrap();

        {
            let device = system.devices.get_mut(&machine).unwrap();
            device.core.output = Some(sample_part(1));
            device.core.unmet_requests.insert(busy, SimTime(0.0));
            device.core.unmet_requests.insert(idle, SimTime(5.0));
        }
        // The older requester got a part from elsewhere in the meantime.
        system.devices.get_mut(&busy).unwrap().core.input = Some(sample_part(2));

        assert_eq!(system.select_downstream(machine, SimTime(6.0)), Some(idle));
    }

    #[test]
    fn upstream_redefinition_resets_waiting_timestamp() {
        let mut system = System::new();
        let slow = system.add_source("slow", Source::new(TimeDistribution::Fixed(50.0)));
        let slower = system.add_source("slower", Source::new(TimeDistribution::Fixed(60.0)));
        let machine = system.add_machine("m", Machine::new(TimeDistribution::Fixed(1.0)));
        system.set_upstream(machine, &[slow]).unwrap();

        system.simulate(0.0).unwrap();
        assert_eq!(
            system.devices[&machine].core.waiting_since,
            Some(SimTime(0.0))
        );

        system.simulate(4.0).unwrap();
        assert_eq!(system.now(), SimTime(4.0));
        // Still waiting on the original upstream with the original stamp.
        assert_eq!(
            system.devices[&machine].core.waiting_since,
            Some(SimTime(0.0))
        );

        system.set_upstream(machine, &[slower]).unwrap();
        // The request is re-issued and picks up the current time.
        system.simulate(0.0).unwrap();
        assert_eq!(
            system.devices[&machine].core.waiting_since,
            Some(SimTime(4.0))
        );
        assert_eq!(
            system.devices[&slower].core.unmet_requests.get(&machine),
            Some(&SimTime(4.0))
        );
        assert!(system.devices[&slow]
            .core
            .unmet_requests
            .get(&machine)
            .is_none());
    }

    #[test]
    fn self_upstream_is_a_configuration_error() {
        let mut system = System::new();
        let machine = system.add_machine("m", Machine::new(TimeDistribution::Fixed(1.0)));
        let err = system.set_upstream(machine, &[machine]).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::SimulationError::Configuration(_)
        ));
    }

    #[test]
    fn mutual_cycles_are_legal() {
        let mut system = System::new();
        let a = system.add_machine("a", Machine::new(TimeDistribution::Fixed(1.0)));
        let b = system.add_machine("b", Machine::new(TimeDistribution::Fixed(1.0)));
        system.set_upstream(a, &[b]).unwrap();
        system.set_upstream(b, &[a]).unwrap();
        assert_eq!(system.devices[&a].core.downstream, vec![b]);
        assert_eq!(system.devices[&b].core.downstream, vec![a]);
        // Nothing feeds the cycle: it idles forever, which is a valid
        // terminal state, not an error.
        let summary = system.simulate(10.0).unwrap();
        assert_eq!(summary.parts_collected, 0);
    }
}
