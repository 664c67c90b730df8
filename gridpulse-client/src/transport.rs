//! Message-oriented transport to the upstream feed.
//!
//! The connection manager only sees a [`Transport`] that yields text frames,
//! so the reconnect state machine runs unchanged against the real websocket
//! or the devkit stub.

use crate::error::ConnectionError;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// One established connection: an ordered stream of text frames. `None`
/// means the remote closed.
pub struct FrameStream {
    rx: mpsc::UnboundedReceiver<Result<String, ConnectionError>>,
}

impl FrameStream {
    /// Builds a stream together with the sender that feeds it.
    pub fn channel() -> (
        mpsc::UnboundedSender<Result<String, ConnectionError>>,
        FrameStream,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, FrameStream { rx })
    }

    pub async fn recv(&mut self) -> Option<Result<String, ConnectionError>> {
        self.rx.recv().await
    }
}

pub trait Transport: Send + Sync {
    /// Opens one logical connection to `url`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<FrameStream, ConnectionError>>;
}

/// Production transport over tokio-tungstenite.
pub struct WsTransport;

impl Transport for WsTransport {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<FrameStream, ConnectionError>> {
        let url = url.to_string();
        Box::pin(async move {
            let (socket, _response) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| ConnectionError::Transport(e.to_string()))?;
            let (_write, mut read) = socket.split();
            let (tx, stream) = FrameStream::channel();

            // Pump task: forwards text frames until the socket or the
            // consumer goes away.
            tokio::spawn(async move {
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            if tx.send(Ok(text.to_string())).is_err() {
                                break; // consumer dropped the stream
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {
                            debug!("ignoring non-text websocket message");
                        }
                        Err(e) => {
                            let _ = tx.send(Err(ConnectionError::Transport(e.to_string())));
                            break;
                        }
                    }
                }
            });

            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_stream_ends_when_sender_drops() {
        let (tx, mut stream) = FrameStream::channel();
        tx.send(Ok("D1V07C42T19".to_string())).unwrap();
        drop(tx);

        assert_eq!(stream.recv().await, Some(Ok("D1V07C42T19".to_string())));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn frame_stream_preserves_order() {
        let (tx, mut stream) = FrameStream::channel();
        for i in 0..5u8 {
            tx.send(Ok(crate::codec::encode("D1", i, i, i))).unwrap();
        }
        for i in 0..5u8 {
            let frame = stream.recv().await.unwrap().unwrap();
            assert_eq!(frame, crate::codec::encode("D1", i, i, i));
        }
    }
}
