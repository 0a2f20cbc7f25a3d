use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Simulation time in model time units. Time starts at zero and only
/// moves forward; the wrapped value is never NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimTime(pub f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn new(value: f64) -> Self {
        SimTime(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Eq for SimTime {}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, delta: f64) -> SimTime {
        SimTime(self.0 + delta)
    }
}

impl AddAssign<f64> for SimTime {
    fn add_assign(&mut self, delta: f64) {
        self.0 += delta;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = f64;

    fn sub(self, other: SimTime) -> f64 {
        self.0 - other.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A duration source for cycle times and maintenance durations: either a
/// fixed value or a sampled distribution. Samples are clamped at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TimeDistribution {
    Fixed(f64),
    Exponential { mean: f64 },
    Normal { mean: f64, std_dev: f64 },
    Uniform { low: f64, high: f64 },
}

impl TimeDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        let value = match self {
            TimeDistribution::Fixed(t) => *t,
            TimeDistribution::Exponential { mean } => {
                if *mean <= 0.0 {
                    0.0
                } else {
                    Exp::new(1.0 / mean).map(|d| d.sample(rng)).unwrap_or(0.0)
                }
            }
            TimeDistribution::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map(|d| d.sample(rng))
                .unwrap_or(*mean),
            TimeDistribution::Uniform { low, high } => {
                if high <= low {
                    *low
                } else {
                    Uniform::new(*low, *high).sample(rng)
                }
            }
        };
        value.max(0.0)
    }

    /// Expected value of the distribution, used where a duration estimate
    /// is needed without consuming randomness.
    pub fn mean(&self) -> f64 {
        match self {
            TimeDistribution::Fixed(t) => *t,
            TimeDistribution::Exponential { mean } => *mean,
            TimeDistribution::Normal { mean, .. } => *mean,
            TimeDistribution::Uniform { low, high } => (low + high) / 2.0,
        }
        .max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sim_time_orders_totally() {
        assert!(SimTime(1.0) < SimTime(2.0));
        assert!(SimTime(2.0) > SimTime(1.5));
        assert_eq!(SimTime(3.0), SimTime(3.0));
    }

    #[test]
    fn fixed_distribution_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let dist = TimeDistribution::Fixed(2.5);
        assert_eq!(dist.sample(&mut rng), 2.5);
        assert_eq!(dist.mean(), 2.5);
    }

    #[test]
    fn samples_never_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let dist = TimeDistribution::Normal {
            mean: 0.1,
            std_dev: 5.0,
        };
        for _ in 0..100 {
            assert!(dist.sample(&mut rng) >= 0.0);
        }
    }
}
