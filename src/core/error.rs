use super::time::SimTime;
use super::types::AssetId;

/// Fatal simulation errors. Every variant aborts the dispatch loop and
/// surfaces the offending context; there is no retry for any of them.
///
/// Starvation and blocking (no part, no space, no resource, no free
/// maintenance slot) are not errors: a blocked action simply schedules no
/// continuation and waits to be reactivated by a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Invalid model wiring detected before or during relation
    /// assignment, e.g. a device listing itself as its own upstream.
    Configuration(String),
    /// An event was scheduled before the current simulation time.
    Scheduling {
        now: SimTime,
        requested: SimTime,
        label: String,
    },
    /// A write bypassed the flow-control or reservation protocol, e.g.
    /// placing into a full buffer or releasing more of a resource than
    /// was reserved. Never silently clipped.
    CapacityViolation(String),
    /// An event referenced an asset that is not registered.
    UnknownAsset(AssetId),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            SimulationError::Scheduling {
                now,
                requested,
                label,
            } => write!(
                f,
                "cannot schedule an event in the past: now={} requested={} ({})",
                now, requested, label
            ),
            SimulationError::CapacityViolation(msg) => {
                write!(f, "capacity violation: {}", msg)
            }
            SimulationError::UnknownAsset(id) => write!(f, "unknown asset: {}", id),
        }
    }
}

impl std::error::Error for SimulationError {}
