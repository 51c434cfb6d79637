#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use okx_ws::core::kernel::{WsDialer, WsSink, WsStream};
use okx_ws::exchanges::okx::{ClientWs, ClientWsBuilder, Sinks};
use okx_ws::{ExchangeConfig, ExchangeError, TeardownScope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const PUBLIC_URL: &str = "mock://public";
pub const PRIVATE_URL: &str = "mock://private";

/// Peer end of one dialed in-memory socket
pub struct MockServer {
    pub url: String,
    inbound: UnboundedReceiver<Message>,
    outbound: UnboundedSender<Result<Message, ExchangeError>>,
}

impl MockServer {
    /// Next text frame written by the client
    pub async fn next_text(&mut self) -> Option<String> {
        while let Some(message) = self.inbound.next().await {
            if let Message::Text(text) = message {
                return Some(text);
            }
        }
        None
    }

    /// Next text frame that is not a keep-alive ping
    pub async fn next_request(&mut self) -> Option<serde_json::Value> {
        loop {
            let text = self.next_text().await?;
            if text != "ping" {
                return serde_json::from_str(&text).ok();
            }
        }
    }

    pub fn push(&self, text: &str) {
        let _ = self.outbound.unbounded_send(Ok(Message::Text(text.to_string())));
    }

    pub fn close(&self) {
        let _ = self.outbound.unbounded_send(Ok(Message::Close(None)));
    }
}

/// In-memory dialer counting dial attempts per URL
pub struct MockDialer {
    dials: Mutex<HashMap<String, usize>>,
    failures: AtomicUsize,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockDialer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        Self::failing(0)
    }

    /// Dialer whose first `failures` attempts are rejected with status 503
    pub fn failing(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let dialer = Self {
            dials: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(failures),
            servers,
        };
        (Arc::new(dialer), accepted)
    }

    pub fn dials(&self, url: &str) -> usize {
        self.dials.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl WsDialer for MockDialer {
    async fn dial(&self, url: &str) -> Result<(WsSink, WsStream), ExchangeError> {
        *self.dials.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExchangeError::DialError {
                status: Some(503),
                message: "service unavailable".to_string(),
            });
        }

        let (client_tx, inbound) = unbounded::<Message>();
        let (outbound, client_rx) = unbounded::<Result<Message, ExchangeError>>();
        let _ = self.servers.send(MockServer {
            url: url.to_string(),
            inbound,
            outbound,
        });

        let sink: WsSink = Box::pin(client_tx.sink_map_err(|_| ExchangeError::ConnectionClosed));
        let stream: WsStream = Box::pin(client_rx);
        Ok((sink, stream))
    }
}

pub fn test_config() -> ExchangeConfig {
    ExchangeConfig::new(
        "test_api_key".to_string(),
        "test_secret_key".to_string(),
        "test_passphrase".to_string(),
    )
    .ws_urls(PUBLIC_URL.to_string(), PRIVATE_URL.to_string())
}

pub fn client(dialer: Arc<MockDialer>, sinks: Sinks, scope: TeardownScope) -> ClientWs {
    ClientWsBuilder::new(test_config())
        .with_dialer(dialer)
        .with_sinks(sinks)
        .with_teardown_scope(scope)
        .build()
}

/// Next accepted server, whichever class dialed it
pub async fn accept(servers: &mut mpsc::UnboundedReceiver<MockServer>) -> MockServer {
    tokio::time::timeout(Duration::from_secs(5), servers.recv())
        .await
        .expect("no dial within 5s")
        .expect("dialer dropped")
}

/// Poll `check` until it holds, failing after 100 attempts 50ms apart
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}
