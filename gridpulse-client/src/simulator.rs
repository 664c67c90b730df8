//! Synthetic telemetry feed.
//!
//! Each tick nudges every device metric along a bounded random walk,
//! occasionally superimposing a step-change "event" (a door opening, a load
//! kicking in), then broadcasts an immutable snapshot of the whole device
//! set. The tick task is reference counted: it starts with the first
//! observer and stops with the last, so an idle simulator does no work.

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::models::{
    DeviceReading, DeviceRecord, DeviceStatus, Metric, MetricSeries,
};
use crate::observers::{ObserverRegistry, Subscription};
use crate::state::{new_state, Shared};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spacing of the backfilled history points generated at construction.
const BACKFILL_SPACING_MS: u64 = 5000;
/// Backfill jitter around the seed value, mirroring live-looking trends.
const BACKFILL_VARIANCE: f64 = 15.0;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub tick: Duration,
    pub history_capacity: usize,
    /// Fraction of the metric range a single tick may drift.
    pub volatility: f64,
    /// Chance per metric per tick of a step-change event.
    pub event_probability: f64,
    /// Chance per device per tick of advancing the device status cycle.
    pub status_flip_probability: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(2000),
            history_capacity: 20,
            volatility: 0.05,
            event_probability: 0.05,
            status_flip_probability: 0.01,
        }
    }
}

impl SimulatorConfig {
    pub fn from_client(config: &ClientConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.generator_tick_ms),
            history_capacity: config.history_capacity,
            ..Default::default()
        }
    }
}

/// Initial state of one simulated device.
#[derive(Debug, Clone)]
pub struct DeviceSeed {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub location: String,
    pub initial: Vec<(Metric, f64)>,
}

impl DeviceSeed {
    fn new(id: &str, name: &str, kind: &str, location: &str, initial: &[(Metric, f64)]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            location: location.to_string(),
            initial: initial.to_vec(),
        }
    }

    /// Environmental demo pair used for historical charting.
    pub fn demo_environmental() -> Vec<DeviceSeed> {
        vec![
            Self::new(
                "D1",
                "Production Sensor",
                "Environmental Monitor",
                "Factory Floor",
                &[
                    (Metric::Temperature, 58.0),
                    (Metric::Humidity, 45.0),
                    (Metric::Pressure, 67.0),
                    (Metric::Battery, 82.0),
                ],
            ),
            Self::new(
                "D2",
                "Storage Sensor",
                "Environmental Monitor",
                "Warehouse",
                &[
                    (Metric::Temperature, 42.0),
                    (Metric::Humidity, 55.0),
                    (Metric::Pressure, 72.0),
                    (Metric::Battery, 75.0),
                ],
            ),
        ]
    }

    /// Stand-ins for the live feed devices, carrying the same channels a
    /// wire frame does. Used by the orchestrator as fallback data.
    pub fn live_fallback() -> Vec<DeviceSeed> {
        vec![
            Self::new(
                "D1",
                "Feed Probe D1",
                "Power Monitor",
                "Line 1",
                &[
                    (Metric::Voltage, 48.0),
                    (Metric::Current, 35.0),
                    (Metric::Temperature, 52.0),
                ],
            ),
            Self::new(
                "D2",
                "Feed Probe D2",
                "Power Monitor",
                "Line 2",
                &[
                    (Metric::Voltage, 51.0),
                    (Metric::Current, 42.0),
                    (Metric::Temperature, 47.0),
                ],
            ),
        ]
    }
}

pub struct DeviceSimulator {
    inner: Arc<SimInner>,
}

struct SimInner {
    config: SimulatorConfig,
    clock: Arc<dyn Clock>,
    devices: Shared<Vec<DeviceRecord>>,
    rng: Shared<StdRng>,
    observers: ObserverRegistry<Vec<DeviceRecord>>,
    ticker: Shared<Option<TickerHandle>>,
}

struct TickerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceSimulator {
    pub fn new(
        config: SimulatorConfig,
        seeds: Vec<DeviceSeed>,
        rng: StdRng,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut rng = rng;
        let now = clock.now_ms();
        let devices = seeds
            .into_iter()
            .map(|seed| seed_record(seed, &config, &mut rng, now))
            .collect();

        Self {
            inner: Arc::new(SimInner {
                config,
                clock,
                devices: new_state(devices),
                rng: new_state(rng),
                observers: ObserverRegistry::new(),
                ticker: new_state(None),
            }),
        }
    }

    /// Snapshot of every device.
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.inner.devices.lock().clone()
    }

    pub fn device_by_id(&self, id: &str) -> Option<DeviceRecord> {
        self.inner.devices.lock().iter().find(|d| d.id == id).cloned()
    }

    /// Registers a snapshot observer. The tick timer starts with the first
    /// registration and stops when the last one is cancelled.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Vec<DeviceRecord>) + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = self.inner.observers.subscribe(callback);
        if self.inner.observers.count() == 1 {
            SimInner::start_ticker(&self.inner);
        }
        let weak = Arc::downgrade(&self.inner);
        subscription.with_teardown(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.observers.count() == 0 {
                    SimInner::stop_ticker(&inner);
                }
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.count()
    }

    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.lock().is_some()
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        SimInner::stop_ticker(&self.inner);
    }
}

impl SimInner {
    fn start_ticker(inner: &Arc<SimInner>) {
        let mut ticker = inner.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let weak = Arc::downgrade(inner);
        let tick = inner.config.tick;
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = interval.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { return };
                inner.step();
            }
        });
        *ticker = Some(TickerHandle { cancel, task });
        debug!("simulator ticker started");
    }

    fn stop_ticker(inner: &Arc<SimInner>) {
        if let Some(handle) = inner.ticker.lock().take() {
            handle.cancel.cancel();
            handle.task.abort();
            debug!("simulator ticker stopped");
        }
    }

    /// One update pass over every device, then one broadcast. The snapshot
    /// is cloned before delivery so observers never see a half-updated set.
    fn step(&self) {
        let now = self.clock.now_ms();
        let snapshot = {
            let mut rng = self.rng.lock();
            let mut devices = self.devices.lock();
            for device in devices.iter_mut() {
                device.last_updated_ms = now;
                let metrics: Vec<Metric> = device.readings.keys().copied().collect();
                for metric in metrics {
                    let previous = device.readings[&metric].value;
                    let value = next_value(&mut rng, &self.config, metric, previous);
                    let reading = DeviceReading {
                        timestamp_ms: now,
                        value,
                        status: metric.status_for(value),
                    };
                    device.readings.insert(metric, reading);
                    if let Some(series) = device.history.get_mut(&metric) {
                        series.push(reading);
                    }
                }
                if rng.random_bool(self.config.status_flip_probability) {
                    device.status = device.status.next();
                }
            }
            devices.clone()
        };
        self.observers.emit(&snapshot);
    }
}

/// Random-walk step: slow drift scaled by volatility, a rare step-change
/// event of 10-30% of the range, clamped to bounds and rounded to one
/// decimal place.
fn next_value(rng: &mut StdRng, config: &SimulatorConfig, metric: Metric, previous: f64) -> f64 {
    let (min, max) = metric.bounds();
    let range = max - min;

    let drift = (rng.random::<f64>() - 0.5) * 2.0 * config.volatility * range;
    let mut value = previous + drift;

    if rng.random_bool(config.event_probability) {
        let magnitude = (rng.random::<f64>() * 0.2 + 0.1) * range;
        value = if rng.random_bool(0.5) {
            value + magnitude
        } else {
            value - magnitude
        };
    }

    (value.clamp(min, max) * 10.0).round() / 10.0
}

fn seed_record(
    seed: DeviceSeed,
    config: &SimulatorConfig,
    rng: &mut StdRng,
    now: u64,
) -> DeviceRecord {
    let mut readings = BTreeMap::new();
    let mut history = BTreeMap::new();

    for (metric, value) in &seed.initial {
        let (min, max) = metric.bounds();
        readings.insert(
            *metric,
            DeviceReading {
                timestamp_ms: now,
                value: *value,
                status: metric.status_for(*value),
            },
        );

        // Backfilled trend so charts have data from the first render.
        let mut series = MetricSeries::new(config.history_capacity);
        let points = config.history_capacity;
        for i in 0..points {
            let offset = (points - i) as u64 * BACKFILL_SPACING_MS;
            let jitter = (rng.random::<f64>() - 0.5) * BACKFILL_VARIANCE;
            let historical = (value + jitter).clamp(min, max);
            series.push(DeviceReading {
                timestamp_ms: now.saturating_sub(offset),
                value: historical,
                status: metric.status_for(historical),
            });
        }
        history.insert(*metric, series);
    }

    DeviceRecord {
        id: seed.id,
        name: seed.name,
        kind: seed.kind,
        location: seed.location,
        status: DeviceStatus::Online,
        last_updated_ms: now,
        readings,
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rand::SeedableRng;

    fn test_simulator(tick_ms: u64, capacity: usize) -> DeviceSimulator {
        let config = SimulatorConfig {
            tick: Duration::from_millis(tick_ms),
            history_capacity: capacity,
            ..Default::default()
        };
        DeviceSimulator::new(
            config,
            DeviceSeed::demo_environmental(),
            StdRng::seed_from_u64(7),
            Arc::new(ManualClock::new(1_000_000)),
        )
    }

    #[test]
    fn seeding_backfills_full_history() {
        let sim = test_simulator(2000, 20);
        for device in sim.devices() {
            assert_eq!(device.status, DeviceStatus::Online);
            for (metric, series) in &device.history {
                assert_eq!(series.len(), 20, "history of {metric}");
                let timestamps: Vec<u64> =
                    series.iter().map(|r| r.timestamp_ms).collect();
                let mut sorted = timestamps.clone();
                sorted.sort_unstable();
                assert_eq!(timestamps, sorted, "history of {metric} is time-ordered");
            }
        }
    }

    #[test]
    fn device_lookup_by_id() {
        let sim = test_simulator(2000, 20);
        let d2 = sim.device_by_id("D2").unwrap();
        assert_eq!(d2.name, "Storage Sensor");
        assert_eq!(d2.readings[&Metric::Temperature].value, 42.0);
        assert!(sim.device_by_id("D9").is_none());
    }

    #[test]
    fn values_stay_in_bounds_over_many_steps() {
        let sim = test_simulator(2000, 5);
        for _ in 0..500 {
            sim.inner.step();
        }
        for device in sim.devices() {
            for (metric, reading) in &device.readings {
                let (min, max) = metric.bounds();
                assert!(
                    reading.value >= min && reading.value <= max,
                    "{metric} out of bounds: {}",
                    reading.value
                );
                assert_eq!(reading.status, metric.status_for(reading.value));
                // one decimal place
                let scaled = reading.value * 10.0;
                assert!((scaled - scaled.round()).abs() < 1e-9);
            }
            for series in device.history.values() {
                assert_eq!(series.len(), 5);
            }
        }
    }

    #[test]
    fn history_stays_bounded_after_capacity_plus_five_ticks() {
        let sim = test_simulator(2000, 8);
        for _ in 0..(8 + 5) {
            sim.inner.step();
        }
        for device in sim.devices() {
            for series in device.history.values() {
                assert_eq!(series.len(), 8);
                // newest entry carries the current reading's timestamp
                assert_eq!(
                    series.latest().map(|r| r.timestamp_ms),
                    Some(device.last_updated_ms)
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_starts_with_first_observer_and_stops_with_last() {
        let sim = test_simulator(2000, 20);
        assert!(!sim.is_ticking());

        let snapshots = Arc::new(parking_lot::Mutex::new(0usize));
        let counter = snapshots.clone();
        let sub = sim.subscribe(move |_| {
            *counter.lock() += 1;
        });
        assert!(sim.is_ticking());

        tokio::time::sleep(Duration::from_millis(4100)).await;
        let seen = *snapshots.lock();
        assert!(seen >= 2, "expected at least two snapshots, got {seen}");

        sub.cancel();
        assert!(!sim.is_ticking());
        let frozen = *snapshots.lock();
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(*snapshots.lock(), frozen, "no work after last unsubscribe");
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_failure_is_isolated_per_observer() {
        let sim = test_simulator(1000, 20);
        let _bad = sim.subscribe(|_| panic!("render crashed"));
        let delivered = Arc::new(parking_lot::Mutex::new(0usize));
        let counter = delivered.clone();
        let _good = sim.subscribe(move |snapshot| {
            assert_eq!(snapshot.len(), 2);
            *counter.lock() += 1;
        });

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(*delivered.lock() >= 2);
    }
}
