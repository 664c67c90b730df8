/*!
Scripted stub transport for testing the connection manager without sockets.

Each `connect` call consumes the next scripted outcome (default: accept),
records the attempt with its (tokio) timestamp, and on acceptance hands the
test a [`StubLink`] for feeding frames or closing the link.
*/

use gridpulse_client::error::ConnectionError;
use gridpulse_client::transport::{FrameStream, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Accept,
    Refuse,
}

#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub url: String,
    pub at: Instant,
}

/// One accepted connection, driven by the test.
#[derive(Clone)]
pub struct StubLink {
    tx: Arc<Mutex<Option<UnboundedSender<Result<String, ConnectionError>>>>>,
}

impl StubLink {
    /// Feeds one raw text frame to the client.
    pub fn send_frame(&self, raw: &str) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Ok(raw.to_string()));
        }
    }

    /// Injects a transport-level error, which the client treats as a lost
    /// connection.
    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(Err(ConnectionError::Transport(message.to_string())));
        }
    }

    /// Simulates a clean remote close.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }
}

#[derive(Clone, Default)]
pub struct StubTransport {
    inner: Arc<StubState>,
}

#[derive(Default)]
struct StubState {
    script: Mutex<VecDeque<ConnectOutcome>>,
    attempts: Mutex<Vec<ConnectAttempt>>,
    links: Mutex<Vec<StubLink>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-loads connect outcomes; once exhausted, further connects accept.
    pub fn scripted(outcomes: impl IntoIterator<Item = ConnectOutcome>) -> Self {
        let transport = Self::new();
        transport.inner.script.lock().extend(outcomes);
        transport
    }

    /// Scripts `n` refused connects (handy for driving the backoff path).
    pub fn refusing(n: usize) -> Self {
        Self::scripted(std::iter::repeat(ConnectOutcome::Refuse).take(n))
    }

    pub fn push_outcome(&self, outcome: ConnectOutcome) {
        self.inner.script.lock().push_back(outcome);
    }

    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.inner.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.lock().len()
    }

    /// The most recently accepted link, if any.
    pub fn last_link(&self) -> Option<StubLink> {
        self.inner.links.lock().last().cloned()
    }
}

impl Transport for StubTransport {
    fn connect(
        &self,
        url: &str,
    ) -> futures_util::future::BoxFuture<'static, Result<FrameStream, ConnectionError>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        Box::pin(async move {
            inner.attempts.lock().push(ConnectAttempt {
                url,
                at: Instant::now(),
            });
            let outcome = inner
                .script
                .lock()
                .pop_front()
                .unwrap_or(ConnectOutcome::Accept);
            log::debug!("stub connect -> {outcome:?}");
            match outcome {
                ConnectOutcome::Refuse => Err(ConnectionError::Transport(
                    "connection refused (scripted)".to_string(),
                )),
                ConnectOutcome::Accept => {
                    let (tx, stream) = FrameStream::channel();
                    let link = StubLink {
                        tx: Arc::new(Mutex::new(Some(tx))),
                    };
                    inner.links.lock().push(link);
                    Ok(stream)
                }
            }
        })
    }
}
