pub mod core;
pub mod factory;
pub mod maintenance;
pub mod resources;
pub mod system;

// Re-export commonly used types
pub use crate::core::error::SimulationError;
pub use crate::core::event::{Event, EventAction, EventPriority};
pub use crate::core::recorder::{DataPoint, DiscardRecorder, MemoryRecorder, Recorder};
pub use crate::core::time::{SimTime, TimeDistribution};
pub use crate::core::types::{AssetId, BatchId, PartId, WorkOrderId};
pub use crate::factory::device::{
    Buffer, DecisionGate, Device, DeviceKind, Machine, MachineState, PartBatcher, Sink, Source,
};
pub use crate::factory::part::{Batch, Item, Part, PartTemplate};
pub use crate::maintenance::maintainer::{
    FirstComeFirstServed, LongestExpectedFirst, Maintainer, WorkOrder, WorkOrderSelection,
    WorkOrderState,
};
pub use crate::maintenance::tracker::{
    DegradationPolicy, FixedMaintenance, GeometricDegradation, MaintenancePolicy, NoDegradation,
    PeriodicDegradation, SampledMaintenance, StatusTracker,
};
pub use crate::resources::{PendingRequest, ResourceManager, ResourcePool};
pub use crate::system::{
    run_replications, SimulationObserver, SimulationSummary, System,
};
