/*!
Observer-side collectors for test assertions.
*/

use gridpulse_client::models::{DeviceRecord, LiveSample};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every live sample it observes.
#[derive(Clone, Default)]
pub struct SampleCollector {
    samples: Arc<Mutex<Vec<LiveSample>>>,
}

impl SampleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to hand to `ConnectionManager::subscribe`.
    pub fn recorder(&self) -> impl Fn(&LiveSample) + Send + Sync + 'static {
        let samples = self.samples.clone();
        move |sample| samples.lock().push(sample.clone())
    }

    pub fn samples(&self) -> Vec<LiveSample> {
        self.samples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

/// Records simulator snapshots.
#[derive(Clone, Default)]
pub struct SnapshotCollector {
    snapshots: Arc<Mutex<Vec<Vec<DeviceRecord>>>>,
}

impl SnapshotCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback to hand to `DeviceSimulator::subscribe`.
    pub fn recorder(&self) -> impl Fn(&Vec<DeviceRecord>) + Send + Sync + 'static {
        let snapshots = self.snapshots.clone();
        move |snapshot| snapshots.lock().push(snapshot.clone())
    }

    pub fn latest(&self) -> Option<Vec<DeviceRecord>> {
        self.snapshots.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_collector_records_in_order() {
        let collector = SampleCollector::new();
        let record = collector.recorder();
        for i in 0..3u8 {
            record(&LiveSample {
                device_id: "D1".to_string(),
                voltage: i as f64,
                current: 0.0,
                temperature: 0.0,
                timestamp_ms: i as u64,
            });
        }
        let voltages: Vec<f64> = collector.samples().iter().map(|s| s.voltage).collect();
        assert_eq!(voltages, vec![0.0, 1.0, 2.0]);
    }
}
