// TON minter feed
//
// Streaming subscription to `jetton-minter-created` events. The connection is
// abstracted behind `FeedTransport` / `FeedConnection`; production uses a
// WebSocket (tokio-tungstenite), tests use a scripted transport.
//
// Delivery is at-least-once while connected. Events emitted while disconnected
// are not replayed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use common::MinterEvent;

use crate::config::TonConfig;
use crate::errors::{Result, SniperError};
use crate::metric;

/// Topic of the minter creation stream
pub const MINTER_TOPIC: &str = "jetton-minter-created";

/// Receiver of decoded minter events
#[async_trait]
pub trait MinterConsumer: Send + Sync + 'static {
    async fn on_minter(&self, event: &MinterEvent) -> Result<()>;
}

/// One live connection to the event stream
#[async_trait]
pub trait FeedConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame; `None` once the remote closed the stream
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// Factory for feed connections, called once per connection epoch
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>>;
}

/// Tách `api_key` khỏi query string, trả về (endpoint sạch, api key)
pub fn normalize_ws_endpoint(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim();
    let Some((base, query)) = raw.split_once('?') else {
        return (raw.to_string(), None);
    };

    let mut api_key = None;
    let mut kept = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some(("api_key", value)) if !value.is_empty() => api_key = Some(value.to_string()),
            _ => kept.push(pair),
        }
    }

    let endpoint = if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    };
    (endpoint, api_key)
}

/// WebSocket transport
pub struct WsTransport {
    endpoint: String,
    api_key: Option<String>,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(config: &TonConfig) -> Self {
        let (endpoint, api_key) = normalize_ws_endpoint(&config.ws_endpoint);
        Self {
            endpoint,
            api_key,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SniperError::TransportFailure(format!("invalid ws endpoint: {}", e)))?;

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| SniperError::TransportFailure(format!("invalid api key header: {}", e)))?;
            request.headers_mut().insert("X-API-Key", value);
        }

        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| SniperError::TransportFailure("ws connect timed out".to_string()))?
            .map_err(|e| SniperError::TransportFailure(format!("ws connect: {}", e)))?;

        debug!("Connected to {}", self.endpoint);
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| SniperError::TransportFailure(format!("ws send: {}", e)))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| {
                        SniperError::TransportFailure(format!("non utf-8 binary frame: {}", e))
                    }))
                }
                // tungstenite answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    return Some(Err(SniperError::TransportFailure(format!(
                        "closed by server: {:?}",
                        frame
                    ))))
                }
                Err(e) => return Some(Err(SniperError::TransportFailure(format!("ws read: {}", e)))),
            }
        }
    }
}

/// Decode one feed frame.
///
/// `Ok(None)` for frames of another type. Malformed JSON, or a minter frame
/// without an address, is a decode error.
pub fn decode_frame(text: &str) -> Result<Option<MinterEvent>> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| SniperError::TransportFailure(format!("undecodable frame: {}", e)))?;

    if frame.get("type").and_then(Value::as_str) != Some(MINTER_TOPIC) {
        return Ok(None);
    }

    let payload = frame
        .get("payload")
        .filter(|p| p.is_object())
        .ok_or_else(|| SniperError::TransportFailure("minter frame without payload".to_string()))?;

    let address = payload
        .get("address")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| SniperError::TransportFailure("minter frame without address".to_string()))?;

    let text_field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let total_supply = match payload.get("total_supply") {
        Some(Value::Number(n)) => n.as_u64().map(u128::from),
        Some(Value::String(s)) => s.trim().parse::<u128>().ok(),
        _ => None,
    };

    let timestamp_unix = match frame.get("timestamp") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_else(|| Utc::now().timestamp()),
        _ => Utc::now().timestamp(),
    };

    Ok(Some(MinterEvent {
        address: address.to_string(),
        owner_address: text_field("owner"),
        total_supply,
        symbol: text_field("symbol"),
        timestamp_unix,
        raw: frame.clone(),
    }))
}

/// Feed connector: owns the consumer list and the reconnect loop
pub struct MinterFeed {
    transport: Arc<dyn FeedTransport>,
    network: String,
    reconnect_delay: Duration,
    consumers: RwLock<Vec<Arc<dyn MinterConsumer>>>,
    connections: AtomicU64,
}

impl MinterFeed {
    pub fn new(transport: Arc<dyn FeedTransport>, network: &str, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            network: network.to_string(),
            reconnect_delay,
            consumers: RwLock::new(Vec::new()),
            connections: AtomicU64::new(0),
        }
    }

    /// Đăng ký consumer; không đảm bảo thứ tự giữa các consumer
    pub async fn subscribe(&self, consumer: Arc<dyn MinterConsumer>) {
        self.consumers.write().await.push(consumer);
    }

    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }

    /// Number of successful connects so far
    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn subscribe_message(&self) -> String {
        json!({
            "type": "subscribe",
            "topic": MINTER_TOPIC,
            "network": self.network,
        })
        .to_string()
    }

    /// Dispatch one event to every consumer concurrently; failures are isolated
    pub async fn dispatch(&self, event: &MinterEvent) {
        let consumers = self.consumers.read().await.clone();
        let results = join_all(consumers.iter().map(|c| c.on_minter(event))).await;
        for result in results {
            if let Err(e) = result {
                warn!("Minter consumer failed for {}: {}", event.address, e);
            }
        }
    }

    /// Connect, subscribe and read until `shutdown` flips to true.
    ///
    /// Transport failures never escape: the loop waits the fixed delay and
    /// reconnects.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting minter feed on {} (reconnect delay {:?})",
            self.network, self.reconnect_delay
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_session(&mut shutdown).await {
                Ok(()) => break,
                Err(e) => warn!(
                    "Minter feed transport failure: {}. Reconnecting in {:?}",
                    e, self.reconnect_delay
                ),
            }

            metric::record_reconnect();
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Minter feed stopped");
    }

    /// One connection epoch. `Ok` only when shutdown was requested.
    async fn run_session(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut conn = self.transport.connect().await?;
        self.connections.fetch_add(1, Ordering::Relaxed);

        conn.send_text(self.subscribe_message()).await?;
        info!("Subscribed to {} on {}", MINTER_TOPIC, self.network);

        loop {
            let next = tokio::select! {
                next = conn.next_text() => next,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            };

            let text = match next {
                Some(Ok(text)) => text,
                Some(Err(e)) => return Err(e),
                None => return Err(SniperError::TransportFailure("feed stream closed".to_string())),
            };

            match decode_frame(&text) {
                Ok(Some(event)) => {
                    metric::record_feed_event();
                    debug!("Minter event {} ({})", event.address, event.label());
                    self.dispatch(&event).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Dropping connection after bad frame: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
