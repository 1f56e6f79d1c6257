//! DevTools websocket driver
//!
//! Keeps one websocket open to the remote page. A reader task routes responses to their
//! waiting caller by request id and queues every event for `await_event`.

use super::{AutomationDriver, CommandMessage, DriverError, Event, EventFilter, Incoming};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, DriverError>>>;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// One entry of the `/json` target listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Pick the first target whose URL contains `target_match` (case-insensitive).
pub fn select_target(targets: &[TargetInfo], target_match: &str) -> Option<String> {
    let needle = target_match.to_lowercase();
    targets
        .iter()
        .filter(|t| t.url.to_lowercase().contains(&needle))
        .find_map(|t| t.web_socket_debugger_url.clone())
}

/// Query `http://localhost:{port}/json` and return the websocket URL of the matching page.
pub async fn discover_target(port: u16, target_match: &str) -> Result<String, DriverError> {
    let url = format!("http://localhost:{}/json", port);
    let client = reqwest::Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .map_err(|e| DriverError::Discovery(e.to_string()))?;
    let targets: Vec<TargetInfo> = client
        .get(&url)
        .send()
        .await
        .map_err(|e| DriverError::Discovery(format!("{}: {}", url, e)))?
        .json()
        .await
        .map_err(|e| DriverError::Discovery(format!("invalid target list: {}", e)))?;

    debug!(port, targets = targets.len(), "Listed remote targets");
    select_target(&targets, target_match).ok_or_else(|| {
        DriverError::Discovery(format!(
            "no target matching '{}' among {} targets",
            target_match,
            targets.len()
        ))
    })
}

/// Websocket-backed `AutomationDriver`.
pub struct CdpDriver {
    next_id: AtomicU64,
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<Mutex<PendingMap>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    reader: JoinHandle<()>,
}

impl CdpDriver {
    pub async fn connect(ws_url: &str) -> Result<Self, DriverError> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| DriverError::Connect(format!("{}: {}", ws_url, e)))?;
        info!(url = %ws_url, "Connected to remote page");

        let (sink, stream) = stream.split();
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&pending), event_tx));

        Ok(Self {
            next_id: AtomicU64::new(0),
            sink: tokio::sync::Mutex::new(sink),
            pending,
            events: tokio::sync::Mutex::new(event_rx),
            reader,
        })
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn write(&self, command: &CommandMessage) -> Result<(), DriverError> {
        let text = serde_json::to_string(command)
            .map_err(|e| DriverError::Protocol(format!("failed to encode command: {}", e)))?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|_| DriverError::Closed)
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl AutomationDriver for CdpDriver {
    async fn call(
        &self,
        method: &str,
        params: Value,
        wait: Duration,
    ) -> Result<Value, DriverError> {
        if self.reader.is_finished() {
            return Err(DriverError::Closed);
        }
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let command = CommandMessage {
            id,
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.write(&command).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DriverError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(DriverError::timeout(method, wait))
            }
        }
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<(), DriverError> {
        let command = CommandMessage {
            id: self.allocate_id(),
            method: method.to_string(),
            params,
        };
        self.write(&command).await
    }

    async fn await_event(
        &self,
        filter: EventFilter<'_>,
        wait: Duration,
    ) -> Result<Event, DriverError> {
        let deadline = Instant::now() + wait;
        let mut events = self.events.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) if filter(&event) => return Ok(event),
                Ok(Some(event)) => debug!(method = %event.method, "Ignoring event"),
                Ok(None) => return Err(DriverError::Closed),
                Err(_) => return Err(DriverError::timeout("matching event", wait)),
            }
        }
    }

    async fn drain_pending(&self) -> usize {
        let mut events = self.events.lock().await;
        let mut drained = 0;
        while events.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<Mutex<PendingMap>>,
    events: mpsc::UnboundedSender<Event>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                info!("Remote page closed connection: {:?}", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Remote websocket error: {}", e);
                break;
            }
        };

        match Incoming::parse(&text) {
            Ok(Incoming::Response { id, result }) => {
                let waiter = pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let result =
                            result.map_err(|(code, message)| DriverError::Remote { code, message });
                        let _ = tx.send(result);
                    }
                    None => debug!(id, "Dropping uncorrelated response"),
                }
            }
            Ok(Incoming::Event(event)) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    // Dropping the senders wakes every waiter with Closed.
    pending.lock().clear();
}
