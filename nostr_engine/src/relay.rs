//! Relay sessions over plain websockets. nostr-sdk's `Client` owns its relay
//! connections and reconnect policy. The publisher needs the `OK` answer of
//! every send and runs its own eviction and quarantine, so events go out
//! through tokio-tungstenite directly.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nostr_sdk::prelude::Event;
use serde_json::json;
use slog as log;
use slog::Logger;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls, MaybeTlsStream, WebSocketStream};
use url::Url;
use xerror::nostr::RelayError;

use std::sync::Arc;
use std::time::Duration;

use crate::relay_pool::RelayPublisherSettings;

/// An open relay session events can be published on.
#[async_trait]
pub trait RelayConnection: Send + Sync {
    /// Sends the event and waits for the relay's `OK`.
    async fn publish(&self, event: &Event) -> Result<(), RelayError>;

    async fn close(&self);
}

#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RelayConnection>, RelayError>;
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;
type WsStream = WebSocketStream<MaybeTlsStream<BoxedStream>>;

/// Reads an `["OK", <id>, <accepted>, <message>]` reply for `event_id`.
fn parse_ok(text: &str, event_id: &serde_json::Value) -> Option<Result<(), String>> {
    let value = serde_json::from_str::<serde_json::Value>(text).ok()?;
    let reply = value.as_array()?;
    if reply.first()?.as_str()? != "OK" || reply.get(1)? != event_id {
        return None;
    }
    let accepted = reply.get(2).and_then(|accepted| accepted.as_bool()).unwrap_or(false);
    if accepted {
        return Some(Ok(()));
    }
    let reason = reply
        .get(3)
        .and_then(|reason| reason.as_str())
        .unwrap_or_default()
        .to_string();
    Some(Err(reason))
}

pub struct WsRelayConnection {
    url: String,
    socket: tokio::sync::Mutex<WsStream>,
    ack_timeout: Duration,
    logger: Logger,
}

#[async_trait]
impl RelayConnection for WsRelayConnection {
    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let event_id = json!(event.id);
        let message = json!(["EVENT", event]).to_string();
        let broken = |cause: String| RelayError::ConnectionBroken(self.url.clone(), cause);

        let mut socket = self.socket.lock().await;
        socket
            .send(Message::Text(message))
            .await
            .map_err(|err| broken(err.to_string()))?;

        let wait_for_ok = async {
            loop {
                match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(result) = parse_ok(&text, &event_id) {
                            return result.map_err(|reason| RelayError::Rejected(self.url.clone(), reason));
                        }
                        log::trace!(self.logger, "Relay {} sent {}", self.url, text);
                    }
                    Some(Ok(Message::Close(_))) | None => return Err(broken("connection closed".to_string())),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(broken(err.to_string())),
                }
            }
        };
        match tokio::time::timeout(self.ack_timeout, wait_for_ok).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::AckTimeout(self.url.clone())),
        }
    }

    async fn close(&self) {
        let mut socket = self.socket.lock().await;
        if let Err(err) = socket.close(None).await {
            log::debug!(self.logger, "Error closing relay {}: {}", self.url, err);
        }
    }
}

/// Opens WebSocket sessions, over Tor for `.onion` relays.
pub struct WsRelayConnector {
    connect_timeout: Duration,
    ack_timeout: Duration,
    tor_proxy: Option<String>,
    logger: Logger,
}

impl WsRelayConnector {
    pub fn new(settings: &RelayPublisherSettings, logger: Logger) -> Self {
        let tor_proxy = settings.tor_proxy_url.as_ref().map(|proxy_url| {
            proxy_url
                .split_once("://")
                .map(|(_, address)| address.to_string())
                .unwrap_or_else(|| proxy_url.clone())
        });
        Self {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
            tor_proxy,
            logger,
        }
    }

    async fn open(&self, relay: &str) -> Result<WsStream, RelayError> {
        let failed = |cause: String| RelayError::ConnectionFailed(relay.to_string(), cause);

        let url = Url::parse(relay).map_err(|err| failed(err.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| failed("missing host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| failed("missing port".to_string()))?;

        let stream: BoxedStream = match (&self.tor_proxy, host.ends_with(".onion")) {
            (Some(proxy), true) => Box::new(
                Socks5Stream::connect(proxy.as_str(), (host.as_str(), port))
                    .await
                    .map_err(|err| failed(err.to_string()))?,
            ),
            (None, true) => return Err(failed("onion relay without tor proxy".to_string())),
            (_, false) => Box::new(
                TcpStream::connect((host.as_str(), port))
                    .await
                    .map_err(|err| failed(err.to_string()))?,
            ),
        };
        let (socket, _) = client_async_tls(relay, stream)
            .await
            .map_err(|err| failed(err.to_string()))?;
        Ok(socket)
    }
}

#[async_trait]
impl RelayConnector for WsRelayConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RelayConnection>, RelayError> {
        let socket = match tokio::time::timeout(self.connect_timeout, self.open(url)).await {
            Ok(socket) => socket?,
            Err(_) => return Err(RelayError::ConnectionFailed(url.to_string(), "timed out".to_string())),
        };
        log::debug!(self.logger, "Connected to relay {}", url);
        Ok(Arc::new(WsRelayConnection {
            url: url.to_string(),
            socket: tokio::sync::Mutex::new(socket),
            ack_timeout: self.ack_timeout,
            logger: self.logger.clone(),
        }))
    }
}
