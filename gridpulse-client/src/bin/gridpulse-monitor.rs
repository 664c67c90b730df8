//! Headless feed monitor: runs the acquisition layer without a dashboard
//! and logs the unified state periodically. Useful for checking an upstream
//! feed (or the synthetic fallback) from a terminal.

use anyhow::{Context, Result};
use gridpulse_client::clock::SystemClock;
use gridpulse_client::settings::{FileSettings, MemorySettings, SettingsStore};
use gridpulse_client::simulator::{DeviceSeed, DeviceSimulator, SimulatorConfig};
use gridpulse_client::transport::WsTransport;
use gridpulse_client::{ClientConfig, ConnectionManager, TelemetryOrchestrator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut json_output = false;
    let mut config = ClientConfig::default();
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json_output = true;
        } else {
            config.endpoint_url = arg;
        }
    }
    info!("gridpulse-monitor starting (endpoint: {})", config.endpoint_url);

    let settings: Arc<dyn SettingsStore> = match FileSettings::in_config_dir() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("no config directory, settings will not persist: {e}");
            Arc::new(MemorySettings::new())
        }
    };

    let clock = Arc::new(SystemClock);
    let connection = ConnectionManager::new(Arc::new(WsTransport), &config, clock.clone());
    let simulator = DeviceSimulator::new(
        SimulatorConfig::from_client(&config),
        DeviceSeed::live_fallback(),
        StdRng::from_os_rng(),
        clock,
    );

    let orchestrator = TelemetryOrchestrator::new(config, connection, simulator, settings)
        .context("invalid configuration")?;

    let mut report = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                let state = orchestrator.current_state();
                if json_output {
                    // One state document per line, for piping into jq etc.
                    println!("{}", serde_json::to_string(&state)?);
                    continue;
                }
                info!(
                    "healthy={} synthetic={} connection={:?}",
                    state.healthy,
                    orchestrator.is_synthetic_active(),
                    orchestrator.connection_state(),
                );
                let mut ids: Vec<_> = state.devices.keys().collect();
                ids.sort();
                for id in ids {
                    let s = &state.devices[id];
                    info!(
                        "  {id}: V={:05.1} C={:05.1} T={:05.1} (ts {})",
                        s.voltage, s.current, s.temperature, s.timestamp_ms
                    );
                }
            }
        }
    }

    orchestrator.shutdown();
    info!("monitor stopped");
    Ok(())
}
