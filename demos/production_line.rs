//! Five-stage line: source -> machine -> buffer -> machine -> sink.
//!
//! Run with RUST_LOG=debug for the full event trace.

use prodsim::{Buffer, Machine, Sink, Source, System, TimeDistribution};

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut system = System::with_seed(42);
    system.record_in_memory();

    let source = system.add_source("source", Source::new(TimeDistribution::Fixed(1.0)));
    let stage_1 = system.add_machine("stage_1", Machine::new(TimeDistribution::Fixed(1.0)));
    let wip = system.add_buffer("wip", Buffer::new(5));
    let stage_2 = system.add_machine("stage_2", Machine::new(TimeDistribution::Fixed(1.0)));
    let finished = system.add_sink("finished", Sink::new().with_collection());

    system.set_upstream(stage_1, &[source]).expect("wiring");
    system.set_upstream(wip, &[stage_1]).expect("wiring");
    system.set_upstream(stage_2, &[wip]).expect("wiring");
    system.set_upstream(finished, &[stage_2]).expect("wiring");

    let summary = system.simulate(100.0).expect("simulation");

    println!(
        "run {}: {} parts collected, {} events executed, ended at t={}",
        summary.run_id, summary.parts_collected, summary.events_executed, summary.end_time
    );
    println!(
        "sink count check: {:?}",
        system.parts_collected(finished)
    );
}
