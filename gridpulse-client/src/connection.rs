//! Connection manager: one logical upstream connection with bounded
//! exponential-backoff reconnects and fan-out of decoded samples.
//!
//! State machine: `Idle -> Connecting -> Open`; `Open -> Closed` on remote
//! close or transport error; `Closed -> Reconnecting(n) -> Connecting` after
//! `base * 1.5^(n-1)`; once `n` exceeds the attempt cap the manager goes
//! `Exhausted` and stays there until a fresh `connect`. The delay magnitude
//! is deliberately uncapped; only the attempt count is bounded.

use crate::clock::Clock;
use crate::codec;
use crate::config::ClientConfig;
use crate::models::LiveSample;
use crate::observers::{ObserverRegistry, Subscription};
use crate::state::{new_state, Shared};
use crate::transport::{FrameStream, Transport};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Reconnecting(u32),
    Exhausted,
}

/// Reconnect delay before attempt `n` (1-based): `base * 1.5^(n-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(1.5f64.powi(attempt.saturating_sub(1) as i32))
}

pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    max_reconnect_attempts: u32,
    base_delay: Duration,
    state: Shared<ConnectionState>,
    endpoint: Shared<Option<String>>,
    samples: ObserverRegistry<LiveSample>,
    transitions: ObserverRegistry<ConnectionState>,
    session: Shared<Option<SessionHandle>>,
}

struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                transport,
                clock,
                max_reconnect_attempts: config.max_reconnect_attempts,
                base_delay: Duration::from_millis(config.base_reconnect_delay_ms),
                state: new_state(ConnectionState::Idle),
                endpoint: new_state(None),
                samples: ObserverRegistry::new(),
                transitions: ObserverRegistry::new(),
                session: new_state(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.inner.endpoint.lock().clone()
    }

    /// Registers an observer for decoded samples, delivered in receipt order.
    pub fn subscribe(
        &self,
        callback: impl Fn(&LiveSample) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.samples.subscribe(callback)
    }

    /// Registers an observer for state transitions (e.g. to see `Exhausted`
    /// without polling).
    pub fn subscribe_transitions(
        &self,
        callback: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.transitions.subscribe(callback)
    }

    /// Opens a connection to `endpoint`. No-op when already `Open` on the
    /// same endpoint; otherwise any existing session is torn down and the
    /// attempt counter starts fresh.
    pub fn connect(&self, endpoint: &str) {
        let inner = &self.inner;
        if *inner.state.lock() == ConnectionState::Open
            && inner.endpoint.lock().as_deref() == Some(endpoint)
        {
            debug!("already connected to {endpoint}");
            return;
        }

        if let Some(session) = inner.session.lock().take() {
            session.cancel.cancel();
            session.task.abort();
        }

        *inner.endpoint.lock() = Some(endpoint.to_string());
        inner.set_state(ConnectionState::Connecting);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            Arc::downgrade(inner),
            endpoint.to_string(),
            cancel.clone(),
        ));
        *inner.session.lock() = Some(SessionHandle { cancel, task });
    }

    /// Forces `Closed`, clears all subscribers and cancels any pending
    /// reconnect. Safe to call from any state.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        if let Some(session) = inner.session.lock().take() {
            session.cancel.cancel();
            session.task.abort();
        }
        inner.set_state(ConnectionState::Closed);
        inner.samples.clear();
        inner.transitions.clear();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.inner.session.lock().take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

impl ConnInner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
        self.transitions.emit(&state);
    }

    /// State writes from a session check its token first, so a session that
    /// lost a `disconnect`/`connect` race cannot clobber the new state.
    fn set_state_if_live(&self, cancel: &CancellationToken, state: ConnectionState) {
        if !cancel.is_cancelled() {
            self.set_state(state);
        }
    }

    fn handle_frame(&self, raw: &str) {
        match codec::decode(raw) {
            Ok(frame) => {
                let sample = LiveSample {
                    device_id: frame.device_id,
                    voltage: frame.voltage as f64,
                    current: frame.current as f64,
                    temperature: frame.temperature as f64,
                    timestamp_ms: self.clock.now_ms(),
                };
                self.samples.emit(&sample);
            }
            // Covers the informational greeting the feed sends on connect.
            Err(e) => debug!("dropping frame: {e}"),
        }
    }
}

async fn run_session(inner: Weak<ConnInner>, endpoint: String, cancel: CancellationToken) {
    let mut attempt: u32 = 0;
    loop {
        let Some(conn) = inner.upgrade() else { return };
        let connecting = conn.transport.connect(&endpoint);
        drop(conn);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = connecting => result,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                let Some(conn) = inner.upgrade() else { return };
                info!("connection established to {endpoint}");
                conn.set_state_if_live(&cancel, ConnectionState::Open);
                drop(conn);

                pump_frames(&inner, stream, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                let Some(conn) = inner.upgrade() else { return };
                conn.set_state_if_live(&cancel, ConnectionState::Closed);
            }
            Err(e) => {
                warn!("connect to {endpoint} failed: {e}");
            }
        }

        attempt += 1;
        let Some(conn) = inner.upgrade() else { return };
        if attempt > conn.max_reconnect_attempts {
            info!("max reconnection attempts reached for {endpoint}");
            conn.set_state_if_live(&cancel, ConnectionState::Exhausted);
            return;
        }
        info!(
            "attempting to reconnect ({attempt}/{})",
            conn.max_reconnect_attempts
        );
        conn.set_state_if_live(&cancel, ConnectionState::Reconnecting(attempt));
        let delay = backoff_delay(conn.base_delay, attempt);
        drop(conn);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        let Some(conn) = inner.upgrade() else { return };
        conn.set_state_if_live(&cancel, ConnectionState::Connecting);
    }
}

/// Delivers frames until the stream ends or the session is cancelled.
async fn pump_frames(inner: &Weak<ConnInner>, mut stream: FrameStream, cancel: &CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = stream.recv() => next,
        };
        match next {
            Some(Ok(raw)) => {
                let Some(conn) = inner.upgrade() else { return };
                conn.handle_frame(&raw);
            }
            Some(Err(e)) => {
                warn!("transport error: {e}");
                return;
            }
            None => {
                info!("connection closed by remote");
                return;
            }
        }
    }
}
