use std::cell::RefCell;
use std::rc::Rc;

use prodsim::{
    run_replications, AssetId, Buffer, EventAction, FixedMaintenance, Item, Machine,
    MachineState, PartBatcher, PeriodicDegradation, SimTime, SimulationError,
    SimulationObserver, Sink, Source, StatusTracker, System, TimeDistribution, WorkOrderState,
};

fn fixed(value: f64) -> TimeDistribution {
    TimeDistribution::Fixed(value)
}

/// Source(1) -> Machine(1) -> Buffer(5) -> Machine(1) -> Sink.
fn build_reference_line(system: &mut System) -> AssetId {
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let stage_1 = system.add_machine("stage_1", Machine::new(fixed(1.0)));
    let wip = system.add_buffer("wip", Buffer::new(5));
    let stage_2 = system.add_machine("stage_2", Machine::new(fixed(1.0)));
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(stage_1, &[source]).unwrap();
    system.set_upstream(wip, &[stage_1]).unwrap();
    system.set_upstream(stage_2, &[wip]).unwrap();
    system.set_upstream(sink, &[stage_2]).unwrap();
    sink
}

#[test]
fn reference_line_collects_98_parts_in_100_time_units() {
    let mut system = System::with_seed(7);
    let sink = build_reference_line(&mut system);
    let summary = system.simulate(100.0).unwrap();
    assert_eq!(system.parts_collected(sink), Some(98));
    assert_eq!(summary.parts_collected, 98);
    assert_eq!(summary.end_time, SimTime(100.0));
}

#[test]
fn replications_are_isolated_and_deterministic() {
    let counts = run_replications(3, |seed| {
        let mut system = System::with_seed(seed);
        let sink = build_reference_line(&mut system);
        system.simulate(100.0).unwrap();
        system.parts_collected(sink).unwrap()
    });
    assert_eq!(counts, vec![98, 98, 98]);
}

#[test]
fn severing_a_relation_leaves_no_edge_events() {
    let mut system = System::new();
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let stage = system.add_machine("stage", Machine::new(fixed(1.0)));
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(stage, &[source]).unwrap();
    system.set_upstream(sink, &[stage]).unwrap();
    system.simulate(0.0).unwrap();

    // Drive the run until a commit referencing (source, stage) is queued.
    let edge = (source, stage);
    let mut steps = 0;
    while !system.pending_events().any(|e| e.edge == Some(edge)) {
        assert!(steps < 1000, "no handshake commit ever queued");
        steps += 1;
        system.step().unwrap();
    }

    system.set_upstream(stage, &[]).unwrap();
    assert!(
        system.pending_events().all(|e| e.edge != Some(edge)),
        "severed pair still referenced by a queued event"
    );
    // The run continues without the severed relation; the line starves,
    // which is a valid terminal state.
    system.simulate(10.0).unwrap();
}

struct FailureWatch {
    failures: Rc<RefCell<Vec<(AssetId, bool)>>>,
}

impl SimulationObserver for FailureWatch {
    fn on_device_failed(&mut self, _now: SimTime, device: AssetId, lost: Option<&Item>) {
        self.failures.borrow_mut().push((device, lost.is_some()));
    }
}

#[test]
fn failure_discards_input_and_creates_exactly_one_work_order() {
    let failures = Rc::new(RefCell::new(Vec::new()));
    let mut system = System::with_seed(1);
    // No repair capacity: the failed state stays observable.
    system.maintainer_mut().set_capacity(0);
    system.add_observer(Box::new(FailureWatch {
        failures: Rc::clone(&failures),
    }));

    let source = system.add_source("source", Source::new(fixed(1.0)));
    let tracker =
        StatusTracker::new(2).with_degradation(PeriodicDegradation {
            period: 1.0,
            damage: 1,
        });
    // Long cycle: the machine is mid-process when it wears out.
    let stage = system.add_machine_with_tracker("stage", Machine::new(fixed(10.0)), tracker);
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(stage, &[source]).unwrap();
    system.set_upstream(sink, &[stage]).unwrap();

    system.simulate(5.0).unwrap();

    assert_eq!(system.machine_state(stage), Some(MachineState::Failed));
    assert_eq!(system.health(stage), Some(2));
    assert_eq!(failures.borrow().as_slice(), &[(stage, true)]);

    let orders: Vec<_> = system.maintainer().work_orders().collect();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].state, WorkOrderState::Queued);
    assert_eq!(orders[0].request_time, SimTime(2.0));

    // The pending finish-processing event was voided by the failure.
    assert!(system.pending_events().all(|e| {
        e.cancelled || e.target != stage || !matches!(e.action, EventAction::FinishProcessing)
    }));

    // Redundant maintenance requests are absorbed as no-ops.
    system
        .request_maintenance(stage, "repair".to_string())
        .unwrap();
    assert_eq!(system.maintainer().work_orders().count(), 1);
}

#[test]
fn single_capacity_maintainer_serializes_work_orders() {
    let mut system = System::with_seed(3);
    system.maintainer_mut().set_capacity(1);

    let mut stages = Vec::new();
    for name in ["press_a", "press_b"] {
        let tracker = StatusTracker::new(1)
            .with_degradation(PeriodicDegradation {
                period: 1.0,
                damage: 1,
            })
            .with_maintenance_policy(FixedMaintenance {
                duration: 5.0,
                cost: 10.0,
            });
        stages.push(system.add_machine_with_tracker(name, Machine::new(fixed(1.0)), tracker));
    }

    system.simulate(12.0).unwrap();

    // Both machines wore out at t=1; one maintainer slot forces strict
    // sequencing.
    let first_round: Vec<_> = system
        .maintainer()
        .work_orders()
        .filter(|order| order.request_time == SimTime(1.0))
        .collect();
    assert_eq!(first_round.len(), 2);

    let first = first_round
        .iter()
        .find(|order| order.device == stages[0])
        .unwrap();
    let second = first_round
        .iter()
        .find(|order| order.device == stages[1])
        .unwrap();
    assert_eq!(first.state, WorkOrderState::Done);
    assert_eq!(second.state, WorkOrderState::Done);
    assert_eq!(first.start_time, Some(SimTime(1.0)));
    assert_eq!(first.finish_time, Some(SimTime(6.0)));
    assert_eq!(second.start_time, first.finish_time);
    assert_eq!(second.finish_time, Some(SimTime(11.0)));

    // Work order costs accrued to the maintainer.
    assert!(system.maintainer().value() <= -20.0);
}

#[test]
fn limited_resources_grant_two_and_queue_the_third() {
    let mut system = System::with_seed(5);
    system.resources_mut().add_pool("fixture", 2);

    let source = system.add_source(
        "source",
        Source::new(fixed(0.0)).with_max_parts(3),
    );
    let wip = system.add_buffer("wip", Buffer::new(10));
    let sink = system.add_sink("finished", Sink::new());
    let mut stages = Vec::new();
    for name in ["m1", "m2", "m3"] {
        let machine = Machine::new(fixed(5.0))
            .with_required_resources([("fixture".to_string(), 1)]);
        stages.push(system.add_machine(name, machine));
    }
    system.set_upstream(wip, &[source]).unwrap();
    for stage in &stages {
        system.set_upstream(*stage, &[wip]).unwrap();
    }
    system.set_upstream(sink, &stages).unwrap();

    system.simulate(1.0).unwrap();
    assert_eq!(system.machine_state(stages[0]), Some(MachineState::Processing));
    assert_eq!(system.machine_state(stages[1]), Some(MachineState::Processing));
    assert_eq!(
        system.machine_state(stages[2]),
        Some(MachineState::WaitingForResources)
    );
    assert_eq!(system.resources().available("fixture"), 0);
    assert_eq!(system.resources().waiting_requests().count(), 1);

    // A release at t=5 serves the queued request.
    system.simulate(5.0).unwrap();
    assert_eq!(system.machine_state(stages[2]), Some(MachineState::Processing));
}

#[test]
fn buffer_holds_items_for_their_minimum_storage_time() {
    let mut system = System::with_seed(9);
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let wip = system.add_buffer("wip", Buffer::new(10).with_min_storage_time(2.0));
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(wip, &[source]).unwrap();
    system.set_upstream(sink, &[wip]).unwrap();

    system.simulate(2.5).unwrap();
    // Admitted at t=1, releasable from t=3 at the earliest.
    assert_eq!(system.parts_collected(sink), Some(0));

    system.simulate(3.5).unwrap();
    // Parts admitted at 1..=4 leave at 3..=6.
    assert_eq!(system.parts_collected(sink), Some(4));
}

#[test]
fn sink_cycle_time_spaces_out_receipts() {
    let mut system = System::with_seed(2);
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let sink = system.add_sink("finished", Sink::new().with_cycle_time(3.0));
    system.set_upstream(sink, &[source]).unwrap();

    system.simulate(10.0).unwrap();
    // Receipts at t = 1, 4, 7, 10.
    assert_eq!(system.parts_collected(sink), Some(4));
}

#[test]
fn process_hook_runs_once_per_cycle_before_the_offer() {
    let mut system = System::with_seed(4);
    system.record_in_memory();
    let source = system.add_source(
        "source",
        Source::new(fixed(1.0)).with_template(prodsim::PartTemplate {
            value: 1.0,
            quality: 1.0,
        }),
    );
    let machine = Machine::new(fixed(1.0)).with_process_hook(Box::new(|part, _rng| {
        part.quality *= 0.5;
        part.value += 10.0;
    }));
    let stage = system.add_machine("stage", machine);
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(stage, &[source]).unwrap();
    system.set_upstream(sink, &[stage]).unwrap();

    system.simulate(5.0).unwrap();

    // Collected at t = 2..=5, each transformed exactly once.
    assert_eq!(system.parts_collected(sink), Some(4));
    assert_eq!(system.sink_value(sink), Some(44.0));

    let produced = system.memory_data().unwrap().series("produced_parts", "stage");
    assert_eq!(produced.len(), 4);
    assert!(produced.iter().all(|point| point.values == vec![0.5]));
}

#[test]
fn part_batcher_groups_parts_into_batches() {
    let mut system = System::with_seed(6);
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let batcher = system.add_part_batcher("batcher", PartBatcher::new(Some(3)));
    let sink = system.add_sink("finished", Sink::new().with_collection());
    system.set_upstream(batcher, &[source]).unwrap();
    system.set_upstream(sink, &[batcher]).unwrap();

    system.simulate(4.0).unwrap();

    // Three parts arrived by t=3 and left as one batch; the fourth is
    // still waiting for company.
    assert_eq!(system.parts_collected(sink), Some(3));
    let items = system.collected_items(sink).unwrap();
    assert_eq!(items.len(), 1);
    match &items[0] {
        Item::Batch(batch) => {
            assert_eq!(batch.parts.len(), 3);
            assert!(batch.parts.iter().all(|part| part.batch == Some(batch.id)));
        }
        other => panic!("expected a batch, got {:?}", other),
    }
}

#[test]
fn decision_gate_passes_through_without_holding() {
    let mut system = System::with_seed(8);
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let gate = system.add_decision_gate(
        "gate",
        prodsim::DecisionGate::new(|_item| true),
    );
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(gate, &[source]).unwrap();
    system.set_upstream(sink, &[gate]).unwrap();

    system.simulate(5.0).unwrap();
    // Zero-latency pass-through: one part per time unit from t=1.
    assert_eq!(system.parts_collected(sink), Some(5));
}

#[test]
fn decision_gate_refusal_starves_the_line_without_error() {
    let mut system = System::with_seed(8);
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let gate = system.add_decision_gate(
        "gate",
        prodsim::DecisionGate::new(|_item| false),
    );
    let sink = system.add_sink("finished", Sink::new());
    system.set_upstream(gate, &[source]).unwrap();
    system.set_upstream(sink, &[gate]).unwrap();

    let summary = system.simulate(5.0).unwrap();
    assert_eq!(system.parts_collected(sink), Some(0));
    assert_eq!(summary.end_time, SimTime(5.0));
}

#[test]
fn miswired_relations_are_configuration_errors() {
    let mut system = System::new();
    let source = system.add_source("source", Source::new(fixed(1.0)));
    let stage = system.add_machine("stage", Machine::new(fixed(1.0)));
    let sink = system.add_sink("finished", Sink::new());

    assert!(matches!(
        system.set_upstream(source, &[stage]),
        Err(SimulationError::Configuration(_))
    ));
    assert!(matches!(
        system.set_upstream(stage, &[sink]),
        Err(SimulationError::Configuration(_))
    ));
    assert!(matches!(
        system.set_upstream(stage, &[source, source]),
        Err(SimulationError::Configuration(_))
    ));
}
