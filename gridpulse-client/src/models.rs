//! Data model for the unified telemetry view.
//!
//! `DeviceRecord`s are owned by the synthetic feed, `LiveSample`s flow from
//! the wire. Consumers only ever receive clones of either.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// One metric channel of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Battery,
    Voltage,
    Current,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Battery => "battery",
            Metric::Voltage => "voltage",
            Metric::Current => "current",
        }
    }

    /// Value bounds for the random walk. Every channel currently uses the
    /// display range of the dashboard gauges.
    pub fn bounds(&self) -> (f64, f64) {
        (0.0, 99.0)
    }

    /// Status thresholds per metric. Metrics without a documented threshold
    /// (voltage, current) always read normal.
    pub fn status_for(&self, value: f64) -> ReadingStatus {
        match self {
            Metric::Temperature => {
                if value > 80.0 {
                    ReadingStatus::Critical
                } else if value > 60.0 {
                    ReadingStatus::Warning
                } else {
                    ReadingStatus::Normal
                }
            }
            Metric::Humidity => {
                if value > 85.0 {
                    ReadingStatus::Critical
                } else if value > 70.0 {
                    ReadingStatus::Warning
                } else {
                    ReadingStatus::Normal
                }
            }
            Metric::Pressure => {
                if value > 85.0 {
                    ReadingStatus::Critical
                } else if value < 20.0 {
                    ReadingStatus::Warning
                } else {
                    ReadingStatus::Normal
                }
            }
            Metric::Battery => {
                if value < 20.0 {
                    ReadingStatus::Critical
                } else if value < 40.0 {
                    ReadingStatus::Warning
                } else {
                    ReadingStatus::Normal
                }
            }
            Metric::Voltage | Metric::Current => ReadingStatus::Normal,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
}

impl DeviceStatus {
    /// Advance along the fixed cycle online -> offline -> maintenance -> online.
    pub fn next(self) -> DeviceStatus {
        match self {
            DeviceStatus::Online => DeviceStatus::Offline,
            DeviceStatus::Offline => DeviceStatus::Maintenance,
            DeviceStatus::Maintenance => DeviceStatus::Online,
        }
    }
}

/// One immutable measurement. A new reading replaces, never mutates, the
/// previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub timestamp_ms: u64,
    pub value: f64,
    pub status: ReadingStatus,
}

/// Bounded, time-ordered reading history with FIFO eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    readings: VecDeque<DeviceReading>,
    capacity: usize,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a reading, evicting the oldest entry when at capacity.
    pub fn push(&mut self, reading: DeviceReading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&DeviceReading> {
        self.readings.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceReading> {
        self.readings.iter()
    }
}

/// One simulated device: current readings plus bounded per-metric history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub location: String,
    pub status: DeviceStatus,
    pub last_updated_ms: u64,
    pub readings: BTreeMap<Metric, DeviceReading>,
    pub history: BTreeMap<Metric, MetricSeries>,
}

/// One decoded wire frame. Transient: merged into the unified map, then
/// discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSample {
    pub device_id: String,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub timestamp_ms: u64,
}
