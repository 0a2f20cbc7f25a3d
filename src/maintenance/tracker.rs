use rand::rngs::StdRng;
use rand_distr::{Distribution, Geometric};

use crate::core::time::TimeDistribution;

/// Decides when and by how much a machine's health degrades. Health must
/// be non-decreasing absent repair: implementations return non-negative
/// increments or stop the process by returning `None`.
pub trait DegradationPolicy {
    /// The delay until the next degradation step and the health increment
    /// it applies, or `None` if the machine no longer degrades.
    fn next_degrade(&self, health: u32, rng: &mut StdRng) -> Option<(f64, u32)>;
}

/// No wear at all.
pub struct NoDegradation;

impl DegradationPolicy for NoDegradation {
    fn next_degrade(&self, _health: u32, _rng: &mut StdRng) -> Option<(f64, u32)> {
        None
    }
}

/// Each period is a Bernoulli trial: with the configured probability the
/// machine takes `damage` points of wear. The delay to the next step is
/// geometrically distributed over whole periods.
pub struct GeometricDegradation {
    pub period: f64,
    pub probability: f64,
    pub damage: u32,
}

impl DegradationPolicy for GeometricDegradation {
    fn next_degrade(&self, _health: u32, rng: &mut StdRng) -> Option<(f64, u32)> {
        if self.probability <= 0.0 || self.period <= 0.0 {
            return None;
        }
        let p = self.probability.min(1.0);
        // Trials until the first success, always at least one period.
        let trials = Geometric::new(p)
            .map(|d| d.sample(rng) + 1)
            .unwrap_or(1);
        Some((trials as f64 * self.period, self.damage))
    }
}

/// Degrades by a fixed amount at a fixed interval.
pub struct PeriodicDegradation {
    pub period: f64,
    pub damage: u32,
}

impl DegradationPolicy for PeriodicDegradation {
    fn next_degrade(&self, _health: u32, _rng: &mut StdRng) -> Option<(f64, u32)> {
        if self.period <= 0.0 {
            return None;
        }
        Some((self.period, self.damage))
    }
}

/// Yields the duration and cost of a maintenance action on a machine with
/// the given accrued health.
pub trait MaintenancePolicy {
    fn duration(&self, tag: &str, health: u32, rng: &mut StdRng) -> f64;

    /// Duration estimate used by work-order selection strategies; must
    /// not consume randomness.
    fn expected_duration(&self, tag: &str, health: u32) -> f64;

    fn cost(&self, _tag: &str, _health: u32) -> f64 {
        0.0
    }
}

/// Maintenance that always takes the same time and costs the same amount.
pub struct FixedMaintenance {
    pub duration: f64,
    pub cost: f64,
}

impl MaintenancePolicy for FixedMaintenance {
    fn duration(&self, _tag: &str, _health: u32, _rng: &mut StdRng) -> f64 {
        self.duration
    }

    fn expected_duration(&self, _tag: &str, _health: u32) -> f64 {
        self.duration
    }

    fn cost(&self, _tag: &str, _health: u32) -> f64 {
        self.cost
    }
}

/// Maintenance whose duration is sampled from a distribution.
pub struct SampledMaintenance {
    pub duration: TimeDistribution,
    pub cost: f64,
}

impl MaintenancePolicy for SampledMaintenance {
    fn duration(&self, _tag: &str, _health: u32, rng: &mut StdRng) -> f64 {
        self.duration.sample(rng)
    }

    fn expected_duration(&self, _tag: &str, _health: u32) -> f64 {
        self.duration.mean()
    }

    fn cost(&self, _tag: &str, _health: u32) -> f64 {
        self.cost
    }
}

/// Health state machine attached to a machine: ordinal wear from 0 up to
/// the failure level, an optional condition-based maintenance threshold,
/// and the pluggable degradation and maintenance-duration policies.
///
/// Health only increases until a completed maintenance action resets it;
/// failure is never cleared any other way.
pub struct StatusTracker {
    pub(crate) health: u32,
    pub(crate) failure_level: u32,
    pub(crate) maintenance_threshold: Option<u32>,
    pub(crate) failed: bool,
    pub(crate) maintenance_tag: String,
    pub(crate) degradation: Box<dyn DegradationPolicy>,
    pub(crate) maintenance: Box<dyn MaintenancePolicy>,
}

impl StatusTracker {
    pub fn new(failure_level: u32) -> Self {
        Self {
            health: 0,
            failure_level,
            maintenance_threshold: None,
            failed: false,
            maintenance_tag: "repair".to_string(),
            degradation: Box::new(NoDegradation),
            maintenance: Box::new(FixedMaintenance {
                duration: 0.0,
                cost: 0.0,
            }),
        }
    }

    pub fn with_degradation(mut self, policy: impl DegradationPolicy + 'static) -> Self {
        self.degradation = Box::new(policy);
        self
    }

    /// Request preventive maintenance once health reaches this level.
    pub fn with_maintenance_threshold(mut self, threshold: u32) -> Self {
        self.maintenance_threshold = Some(threshold);
        self
    }

    pub fn with_maintenance_policy(mut self, policy: impl MaintenancePolicy + 'static) -> Self {
        self.maintenance = Box::new(policy);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.maintenance_tag = tag.into();
        self
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// A healthy tracker has no accrued wear and no standing failure;
    /// maintenance requests against it are no-ops.
    pub fn is_healthy(&self) -> bool {
        !self.failed && self.health == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn geometric_degradation_steps_by_whole_periods() {
        let mut rng = StdRng::seed_from_u64(11);
        let policy = GeometricDegradation {
            period: 2.0,
            probability: 0.25,
            damage: 1,
        };
        for _ in 0..50 {
            let (delay, damage) = policy.next_degrade(0, &mut rng).unwrap();
            assert!(delay >= 2.0);
            assert_eq!(delay % 2.0, 0.0);
            assert_eq!(damage, 1);
        }
    }

    #[test]
    fn zero_probability_means_no_degradation() {
        let mut rng = StdRng::seed_from_u64(11);
        let policy = GeometricDegradation {
            period: 2.0,
            probability: 0.0,
            damage: 1,
        };
        assert!(policy.next_degrade(0, &mut rng).is_none());
    }

    #[test]
    fn fresh_tracker_is_healthy() {
        let tracker = StatusTracker::new(4).with_maintenance_threshold(2);
        assert!(tracker.is_healthy());
        assert_eq!(tracker.health(), 0);
        assert!(!tracker.is_failed());
    }
}
