//! Core Lightning RPC over the Lightning peer protocol, authorised by a rune
//! (the `commando` plugin).

pub mod noise;

use secp256k1::{PublicKey, SecretKey};
use serde_json::json;
use slog as log;
use slog::Logger;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use xerror::ln_backend::BackendError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::connector::{ConnectorSettings, InvoiceRequest};
use crate::descriptor::CommandoParams;
use crate::sparko::{cln_invoice_params, cln_invoice_paid};
use noise::{Handshake, NoiseTransport, ACT_TWO_SIZE, LENGTH_HEADER_SIZE};

pub const DEFAULT_PEER_PORT: u16 = 9735;

const MSG_INIT: u16 = 16;
const MSG_PING: u16 = 18;
const MSG_PONG: u16 = 19;
const MSG_COMMANDO_CMD: u16 = 0x4c4f;
const MSG_COMMANDO_REPLY_CONTINUES: u16 = 0x594b;
const MSG_COMMANDO_REPLY_TERM: u16 = 0x594d;

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

fn transport_error(err: std::io::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

fn message_type(message: &[u8]) -> Option<u16> {
    if message.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([message[0], message[1]]))
}

/// Minimal `init` without any feature bits.
fn init_message() -> Vec<u8> {
    let mut message = MSG_INIT.to_be_bytes().to_vec();
    message.extend([0, 0, 0, 0]);
    message
}

/// Pong for a ping, `None` when the ping asks for no reply.
fn pong_for(ping: &[u8]) -> Option<Vec<u8>> {
    if ping.len() < 4 {
        return None;
    }
    let num_pong_bytes = u16::from_be_bytes([ping[2], ping[3]]);
    if num_pong_bytes >= 65532 {
        return None;
    }
    let mut pong = MSG_PONG.to_be_bytes().to_vec();
    pong.extend(num_pong_bytes.to_be_bytes());
    pong.extend(vec![0u8; num_pong_bytes as usize]);
    Some(pong)
}

fn commando_request(id: u64, method: &str, params: serde_json::Value, rune: &str) -> Result<Vec<u8>, BackendError> {
    let body = json!({
        "method": method,
        "params": params,
        "rune": rune,
        "id": id.to_string(),
    });
    let body = serde_json::to_vec(&body).map_err(|err| BackendError::Transport(err.to_string()))?;
    let mut message = MSG_COMMANDO_CMD.to_be_bytes().to_vec();
    message.extend(id.to_be_bytes());
    message.extend(body);
    Ok(message)
}

fn reply_id(message: &[u8]) -> Option<u64> {
    let id = message.get(2..10)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(id);
    Some(u64::from_be_bytes(bytes))
}

fn parse_reply(reply: &[u8]) -> Result<serde_json::Value, BackendError> {
    let reply = serde_json::from_slice::<serde_json::Value>(reply)
        .map_err(|err| BackendError::Transport(format!("invalid commando reply: {err}")))?;
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(|message| message.as_str())
            .map(|message| message.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(BackendError::Transport(message));
    }
    reply
        .get("result")
        .cloned()
        .ok_or_else(|| BackendError::Transport("commando reply has no result".to_string()))
}

/// Splits `host[:port]`, defaulting to the Lightning peer port.
fn split_address(host: &str) -> Result<(String, u16), BackendError> {
    match host.rsplit_once(':') {
        Some((name, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| BackendError::InvalidConfiguration(format!("invalid commando port in {host}")))?;
            Ok((name.to_string(), port))
        }
        None => Ok((host.to_string(), DEFAULT_PEER_PORT)),
    }
}

struct Connection {
    stream: BoxedStream,
    transport: NoiseTransport,
}

impl Connection {
    async fn establish(mut stream: BoxedStream, local_key: SecretKey, remote: PublicKey) -> Result<Self, BackendError> {
        let ephemeral_key = SecretKey::new(&mut secp256k1::rand::thread_rng());
        let mut handshake = Handshake::new(local_key, ephemeral_key, remote);

        stream.write_all(&handshake.act_one()?).await.map_err(transport_error)?;
        let mut act_two = [0u8; ACT_TWO_SIZE];
        stream.read_exact(&mut act_two).await.map_err(transport_error)?;
        handshake.act_two(&act_two)?;
        let (act_three, transport) = handshake.act_three()?;
        stream.write_all(&act_three).await.map_err(transport_error)?;

        let mut connection = Self { stream, transport };
        connection.send(&init_message()).await?;
        loop {
            let message = connection.recv().await?;
            if message_type(&message) == Some(MSG_INIT) {
                return Ok(connection);
            }
        }
    }

    async fn send(&mut self, message: &[u8]) -> Result<(), BackendError> {
        let frame = self.transport.encrypt_message(message)?;
        self.stream.write_all(&frame).await.map_err(transport_error)?;
        self.stream.flush().await.map_err(transport_error)
    }

    async fn recv(&mut self) -> Result<Vec<u8>, BackendError> {
        let mut header = [0u8; LENGTH_HEADER_SIZE];
        self.stream.read_exact(&mut header).await.map_err(transport_error)?;
        let body_len = self.transport.decrypt_length(&header)?;
        let mut body = vec![0u8; body_len];
        self.stream.read_exact(&mut body).await.map_err(transport_error)?;
        self.transport.decrypt_body(&body)
    }

    async fn call(&mut self, request: &[u8], id: u64) -> Result<serde_json::Value, BackendError> {
        self.send(request).await?;
        let mut reply = Vec::new();
        loop {
            let message = self.recv().await?;
            match message_type(&message) {
                Some(MSG_PING) => {
                    if let Some(pong) = pong_for(&message) {
                        self.send(&pong).await?;
                    }
                }
                Some(MSG_COMMANDO_REPLY_CONTINUES) if reply_id(&message) == Some(id) => {
                    reply.extend_from_slice(&message[10..]);
                }
                Some(MSG_COMMANDO_REPLY_TERM) if reply_id(&message) == Some(id) => {
                    reply.extend_from_slice(&message[10..]);
                    return parse_reply(&reply);
                }
                _ => {}
            }
        }
    }
}

/// A rune authorised client for one node, keeping a single connection open
/// across calls. Calls are serialised on that connection.
pub struct CommandoClient {
    remote: PublicKey,
    host: String,
    port: u16,
    rune: String,
    tor_proxy: Option<String>,
    local_key: SecretKey,
    timeout: Duration,
    next_id: AtomicU64,
    connection: tokio::sync::Mutex<Option<Connection>>,
    logger: Logger,
}

impl CommandoClient {
    pub fn new(params: &CommandoParams, settings: &ConnectorSettings, logger: Logger) -> Result<Self, BackendError> {
        let node_id = hex::decode(&params.node_id)
            .map_err(|_| BackendError::InvalidConfiguration(format!("invalid node id {}", params.node_id)))?;
        let remote = PublicKey::from_slice(&node_id)
            .map_err(|_| BackendError::InvalidConfiguration(format!("invalid node id {}", params.node_id)))?;
        let (host, port) = split_address(&params.host)?;
        let tor_proxy = if host.contains(".onion") {
            Some(proxy_address(&settings.tor_proxy_url))
        } else {
            None
        };
        Ok(Self {
            remote,
            host,
            port,
            rune: params.rune.clone(),
            tor_proxy,
            local_key: SecretKey::new(&mut secp256k1::rand::thread_rng()),
            timeout: settings.request_timeout(),
            next_id: AtomicU64::new(0),
            connection: tokio::sync::Mutex::new(None),
            logger,
        })
    }

    pub fn rune(&self) -> &str {
        &self.rune
    }

    async fn open_stream(&self) -> Result<BoxedStream, BackendError> {
        let stream: BoxedStream = match &self.tor_proxy {
            Some(proxy) => Box::new(
                Socks5Stream::connect(proxy.as_str(), (self.host.as_str(), self.port))
                    .await
                    .map_err(|err| BackendError::Transport(err.to_string()))?,
            ),
            None => Box::new(
                TcpStream::connect((self.host.as_str(), self.port))
                    .await
                    .map_err(transport_error)?,
            ),
        };
        Ok(stream)
    }

    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        request: &[u8],
        id: u64,
    ) -> Result<serde_json::Value, BackendError> {
        if slot.is_none() {
            log::debug!(self.logger, "Connecting to commando node {}:{}", self.host, self.port);
            let stream = self.open_stream().await?;
            *slot = Some(Connection::establish(stream, self.local_key, self.remote).await?);
        }
        match slot.as_mut() {
            Some(connection) => connection.call(request, id).await,
            None => Err(BackendError::Transport("commando connection unavailable".to_string())),
        }
    }

    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = commando_request(id, method, params, &self.rune)?;

        let mut slot = self.connection.lock().await;
        let result = match tokio::time::timeout(self.timeout, self.exchange(&mut slot, &request, id)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Transport(format!("commando {method} timed out"))),
        };
        if let Err(err) = &result {
            log::warn!(self.logger, "Commando {} failed, dropping connection: {}", method, err);
            *slot = None;
        }
        result
    }

    pub async fn create_invoice(&self, request: &InvoiceRequest) -> Result<String, BackendError> {
        let result = self.call("invoice", cln_invoice_params(request)).await?;
        crate::connector::string_field(&result, "bolt11")
    }

    pub async fn check_settlement(&self, payment_hash: &str) -> Result<bool, BackendError> {
        let result = self
            .call("listinvoices", json!({ "payment_hash": payment_hash }))
            .await?;
        Ok(cln_invoice_paid(&result))
    }
}

fn proxy_address(proxy_url: &str) -> String {
    proxy_url
        .split_once("://")
        .map(|(_, address)| address)
        .unwrap_or(proxy_url)
        .to_string()
}

struct PooledClient {
    client: Arc<CommandoClient>,
    last_used: Instant,
}

/// Commando clients shared between requests, so every node keeps one open
/// connection. Clients nobody holds are dropped, with their connection, once
/// idle for `commando_idle_timeout_secs`.
#[derive(Clone, Default)]
pub struct CommandoPool {
    clients: Arc<Mutex<HashMap<String, PooledClient>>>,
}

impl CommandoPool {
    pub fn client(
        &self,
        params: &CommandoParams,
        settings: &ConnectorSettings,
        logger: Logger,
    ) -> Result<Arc<CommandoClient>, BackendError> {
        let key = format!("{}@{}", params.node_id, params.host);
        let idle_timeout = Duration::from_secs(settings.commando_idle_timeout_secs);
        let now = Instant::now();
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| BackendError::Transport("commando pool poisoned".to_string()))?;
        clients.retain(|_, pooled| {
            Arc::strong_count(&pooled.client) > 1 || now.duration_since(pooled.last_used) < idle_timeout
        });

        if let Some(pooled) = clients.get_mut(&key) {
            if pooled.client.rune() == params.rune {
                pooled.last_used = now;
                return Ok(pooled.client.clone());
            }
        }
        let client = Arc::new(CommandoClient::new(params, settings, logger)?);
        clients.insert(
            key,
            PooledClient {
                client: client.clone(),
                last_used: now,
            },
        );
        Ok(client)
    }
}
