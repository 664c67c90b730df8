//! Resilience orchestrator: one coherent per-device view regardless of
//! whether samples come from the wire or the synthetic feed.
//!
//! A one-shot grace timer is armed on every (re)connect. If no live sample
//! lands before it fires, the synthetic feed is activated and the health
//! flag drops. A later live sample raises the flag again but does not
//! deactivate the synthetic feed: both write into the unified map and live
//! samples simply overwrite per device. That mirrors the observed behavior
//! of the dashboard this layer was extracted from; see DESIGN.md for why it
//! is kept rather than fixed.

use crate::config::{validate_endpoint, ClientConfig};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::ConfigError;
use crate::models::{DeviceRecord, LiveSample, Metric};
use crate::observers::Subscription;
use crate::settings::{SettingsStore, ENDPOINT_KEY};
use crate::simulator::DeviceSimulator;
use crate::state::{new_state, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Point-in-time read of the unified feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedState {
    pub healthy: bool,
    pub devices: HashMap<String, LiveSample>,
}

pub struct TelemetryOrchestrator {
    inner: Arc<OrchInner>,
}

struct OrchInner {
    config: ClientConfig,
    connection: ConnectionManager,
    simulator: DeviceSimulator,
    settings: Arc<dyn SettingsStore>,
    unified: Shared<HashMap<String, LiveSample>>,
    healthy: AtomicBool,
    live_seen: AtomicBool,
    /// Liveness flag for every callback and timer; cancelled by `shutdown`.
    alive: CancellationToken,
    grace: Shared<Option<CancellationToken>>,
    simulator_feed: Shared<Option<Subscription>>,
    connection_feeds: Shared<Vec<Subscription>>,
}

impl TelemetryOrchestrator {
    /// Builds the orchestrator and, with `auto_connect`, starts the first
    /// connection attempt and arms the fallback grace timer. A persisted
    /// endpoint (key `websocket_url`) overrides the configured default.
    pub fn new(
        config: ClientConfig,
        connection: ConnectionManager,
        simulator: DeviceSimulator,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoint = match settings.get(ENDPOINT_KEY) {
            Some(persisted) => {
                validate_endpoint(&persisted)?;
                persisted
            }
            None => config.endpoint_url.clone(),
        };

        let inner = Arc::new(OrchInner {
            config,
            connection,
            simulator,
            settings,
            unified: new_state(HashMap::new()),
            healthy: AtomicBool::new(false),
            live_seen: AtomicBool::new(false),
            alive: CancellationToken::new(),
            grace: new_state(None),
            simulator_feed: new_state(None),
            connection_feeds: new_state(Vec::new()),
        });

        if inner.config.auto_connect {
            OrchInner::start_connection(&inner, &endpoint);
        }

        Ok(Self { inner })
    }

    /// A consumer-facing snapshot; never a live reference.
    pub fn current_state(&self) -> FeedState {
        FeedState {
            healthy: self.inner.healthy.load(Ordering::SeqCst),
            devices: self.inner.unified.lock().clone(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn is_synthetic_active(&self) -> bool {
        self.inner.simulator_feed.lock().is_some()
    }

    /// Switches to a new endpoint: persists it, tears the current
    /// connection down, re-arms the grace timer and reconnects.
    pub fn set_endpoint(&self, url: &str) -> Result<(), ConfigError> {
        validate_endpoint(url)?;
        if self.inner.alive.is_cancelled() {
            warn!("ignoring set_endpoint after shutdown");
            return Ok(());
        }
        if let Err(e) = self.inner.settings.set(ENDPOINT_KEY, url) {
            warn!("failed to persist endpoint: {e}");
        }
        self.inner.connection.disconnect();
        self.inner.live_seen.store(false, Ordering::SeqCst);
        OrchInner::start_connection(&self.inner, url);
        Ok(())
    }

    /// Tears everything down. After this returns, no callback mutates the
    /// unified state and no timer remains armed, even if one was already
    /// scheduled.
    pub fn shutdown(&self) {
        self.inner.alive.cancel();
        if let Some(grace) = self.inner.grace.lock().take() {
            grace.cancel();
        }
        self.inner.connection.disconnect();
        self.inner.simulator_feed.lock().take(); // drop stops the tick timer
        self.inner.connection_feeds.lock().clear();
        self.inner.healthy.store(false, Ordering::SeqCst);
        info!("orchestrator shut down");
    }
}

impl Drop for TelemetryOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl OrchInner {
    /// Connects, wires the sample/transition observers and arms the grace
    /// timer. `disconnect` clears connection subscribers, so observers are
    /// re-registered on every (re)connect.
    fn start_connection(inner: &Arc<OrchInner>, endpoint: &str) {
        inner.connection.connect(endpoint);

        let mut feeds = inner.connection_feeds.lock();
        feeds.clear();

        let weak = Arc::downgrade(inner);
        feeds.push(inner.connection.subscribe(move |sample| {
            if let Some(inner) = weak.upgrade() {
                inner.merge_live_sample(sample);
            }
        }));

        let weak = Arc::downgrade(inner);
        feeds.push(inner.connection.subscribe_transitions(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_state(*state);
            }
        }));
        drop(feeds);

        Self::arm_grace_timer(inner);
    }

    fn merge_live_sample(&self, sample: &LiveSample) {
        if self.alive.is_cancelled() {
            return;
        }
        if let Some(grace) = self.grace.lock().take() {
            grace.cancel();
        }
        self.live_seen.store(true, Ordering::SeqCst);
        self.healthy.store(true, Ordering::SeqCst);
        self.unified
            .lock()
            .insert(sample.device_id.clone(), sample.clone());
    }

    fn on_connection_state(&self, state: ConnectionState) {
        if self.alive.is_cancelled() {
            return;
        }
        if state == ConnectionState::Exhausted {
            // Reported via the health flag only; the unified map stays
            // frozen at its last values.
            warn!("reconnect attempts exhausted; marking feed unhealthy");
            self.healthy.store(false, Ordering::SeqCst);
        }
    }

    /// One-shot timer: if no live sample has been merged when it fires, the
    /// synthetic feed takes over.
    fn arm_grace_timer(inner: &Arc<OrchInner>) {
        let token = inner.alive.child_token();
        if let Some(previous) = inner.grace.lock().replace(token.clone()) {
            previous.cancel();
        }

        let grace = Duration::from_millis(inner.config.fallback_grace_ms);
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }
            let Some(inner) = weak.upgrade() else { return };
            if token.is_cancelled() || inner.live_seen.load(Ordering::SeqCst) {
                return;
            }
            info!("no live data within grace window; activating synthetic feed");
            inner.healthy.store(false, Ordering::SeqCst);
            Self::activate_simulator(&inner);
        });
    }

    fn activate_simulator(inner: &Arc<OrchInner>) {
        let mut feed = inner.simulator_feed.lock();
        if feed.is_some() {
            return;
        }
        let weak = Arc::downgrade(inner);
        *feed = Some(inner.simulator.subscribe(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.merge_synthetic_snapshot(snapshot);
            }
        }));
    }

    fn merge_synthetic_snapshot(&self, snapshot: &[DeviceRecord]) {
        if self.alive.is_cancelled() {
            return;
        }
        let mut unified = self.unified.lock();
        for record in snapshot {
            if let Some(sample) = synthetic_sample(record) {
                unified.insert(record.id.clone(), sample);
            }
        }
    }
}

/// Projects a simulated device onto the live sample shape. Returns `None`
/// for devices that do not carry the wire channels.
fn synthetic_sample(record: &DeviceRecord) -> Option<LiveSample> {
    let voltage = record.readings.get(&Metric::Voltage)?.value;
    let current = record.readings.get(&Metric::Current)?.value;
    let temperature = record.readings.get(&Metric::Temperature)?.value;
    Some(LiveSample {
        device_id: record.id.clone(),
        voltage,
        current,
        temperature,
        timestamp_ms: record.last_updated_ms,
    })
}
