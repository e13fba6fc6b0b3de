//! One physical WebSocket to the hub's realtime endpoint.
//!
//! [`HubSocket::open`] performs the HTTP upgrade and hands back a socket
//! split into a [`SocketReader`] and a [`SocketWriter`], so a driver task can
//! wait on inbound frames while writing from another branch of a `select!`.
//! Control frames are handled here; callers only ever see text payloads.
//!
//! The socket knows nothing about authentication or request ids -- that
//! lives in `hassdeck-core`.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open socket, not yet split.
pub struct HubSocket {
    stream: Stream,
}

impl HubSocket {
    /// Perform the WebSocket upgrade against `url`, bounded by `timeout`.
    pub async fn open(url: &Url, timeout: Duration) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to hub realtime endpoint");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (stream, _response) = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::debug!("WebSocket upgrade complete");
        Ok(Self { stream })
    }

    /// Split into independent read and write halves.
    pub fn split(self) -> (SocketWriter, SocketReader) {
        let (sink, stream) = self.stream.split();
        (SocketWriter { sink }, SocketReader { stream })
    }
}

// ── Read half ───────────────────────────────────────────────────────

/// Inbound half of a [`HubSocket`].
pub struct SocketReader {
    stream: SplitStream<Stream>,
}

impl SocketReader {
    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer closed the socket (close frame or end of
    /// stream). Ping, pong and binary frames are skipped.
    pub async fn next_text(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong; it goes out with the next write
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return None;
                }
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                    return None;
                }
                Some(Err(e)) => return Some(Err(Error::WebSocketConnect(e.to_string()))),
                None => {
                    tracing::info!("WebSocket stream ended");
                    return None;
                }
                Some(Ok(_)) => {
                    // Binary, Pong, Frame -- ignore
                }
            }
        }
    }
}

// ── Write half ──────────────────────────────────────────────────────

/// Outbound half of a [`HubSocket`].
pub struct SocketWriter {
    sink: SplitSink<Stream, Message>,
}

impl SocketWriter {
    /// Send one JSON text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }

    /// Send a close frame and flush. Errors are logged, not returned: the
    /// socket is being discarded either way.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "error while closing WebSocket");
        }
    }
}
