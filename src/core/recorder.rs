use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;

use super::time::SimTime;

/// One recorded observation: the simulation time it was taken at plus the
/// observed values (part quality, resource amount, health level, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: SimTime,
    pub values: Vec<f64>,
}

impl DataPoint {
    pub fn at(time: SimTime) -> Self {
        DataPoint {
            time,
            values: Vec::new(),
        }
    }

    pub fn single(time: SimTime, value: f64) -> Self {
        DataPoint {
            time,
            values: vec![value],
        }
    }
}

/// Append-only sink for simulation datapoints, addressed by a list label
/// (the theme, e.g. "produced_parts") and a sub label (usually a device
/// name). The core never branches on recorded data.
pub trait Recorder {
    fn record(&mut self, list_label: &str, sub_label: &str, point: DataPoint);

    /// For downcasting to a concrete recorder after the run.
    fn as_any(&self) -> &dyn Any;
}

/// Recorder that drops everything. The default.
#[derive(Debug, Default)]
pub struct DiscardRecorder;

impl Recorder for DiscardRecorder {
    fn record(&mut self, _list_label: &str, _sub_label: &str, _point: DataPoint) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Recorder that keeps every datapoint in memory, grouped by
/// `(list_label, sub_label)`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryRecorder {
    data: BTreeMap<String, BTreeMap<String, Vec<DataPoint>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, list_label: &str, sub_label: &str) -> &[DataPoint] {
        self.data
            .get(list_label)
            .and_then(|lists| lists.get(sub_label))
            .map(|points| points.as_slice())
            .unwrap_or(&[])
    }

    pub fn list_labels(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, list_label: &str, sub_label: &str, point: DataPoint) {
        self.data
            .entry(list_label.to_string())
            .or_default()
            .entry(sub_label.to_string())
            .or_default()
            .push(point);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_recorder_appends_in_order() {
        let mut recorder = MemoryRecorder::new();
        recorder.record("produced_parts", "m1", DataPoint::single(SimTime(1.0), 1.0));
        recorder.record("produced_parts", "m1", DataPoint::single(SimTime(2.0), 0.5));
        recorder.record("produced_parts", "m2", DataPoint::single(SimTime(2.0), 1.0));

        let series = recorder.series("produced_parts", "m1");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].time, SimTime(1.0));
        assert_eq!(series[1].values, vec![0.5]);
        assert!(recorder.series("produced_parts", "m3").is_empty());
    }
}
