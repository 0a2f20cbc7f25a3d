//! Two wearing machines sharing one maintainer and one fixture pool,
//! replicated across seeds in parallel.

use prodsim::{
    run_replications, Buffer, FixedMaintenance, GeometricDegradation, Machine, Sink, Source,
    StatusTracker, System, TimeDistribution,
};

fn build_and_run(seed: u64) -> (u64, u64) {
    let mut system = System::with_seed(seed);
    system.maintainer_mut().set_capacity(1);
    system.resources_mut().add_pool("fixture", 1);

    let source = system.add_source("source", Source::new(TimeDistribution::Fixed(1.0)));
    let wip = system.add_buffer("wip", Buffer::new(10));
    let sink = system.add_sink("finished", Sink::new());

    let mut stages = Vec::new();
    for name in ["press_a", "press_b"] {
        let tracker = StatusTracker::new(5)
            .with_maintenance_threshold(3)
            .with_degradation(GeometricDegradation {
                period: 2.0,
                probability: 0.2,
                damage: 1,
            })
            .with_maintenance_policy(FixedMaintenance {
                duration: 4.0,
                cost: 25.0,
            });
        let machine = Machine::new(TimeDistribution::Exponential { mean: 1.5 })
            .with_required_resources([("fixture".to_string(), 1)]);
        stages.push(system.add_machine_with_tracker(name, machine, tracker));
    }

    system.set_upstream(wip, &[source]).expect("wiring");
    for stage in &stages {
        system.set_upstream(*stage, &[wip]).expect("wiring");
    }
    system.set_upstream(sink, &stages).expect("wiring");

    let summary = system.simulate(500.0).expect("simulation");
    (seed, summary.parts_collected)
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let results = run_replications(4, build_and_run);
    for (seed, collected) in results {
        println!("seed {}: {} parts collected", seed, collected);
    }
}
