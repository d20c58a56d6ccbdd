//! WebSocket client for the protocol sidecar process.
//!
//! The sidecar owns the actual chat-protocol stack and exposes it as JSON
//! frames over a local WebSocket: requests are correlated by UUID, events
//! arrive unsolicited, and media downloads stream back as base64 chunks
//! tagged with a transfer id.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    base64::Engine as _,
    bytes::Bytes,
    futures::{SinkExt, StreamExt, stream::BoxStream},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, warn},
    uuid::Uuid,
};

use recado_common::types::Address;

use crate::{
    client::{ChatClient, ChatSummary, DownloadRef, MediaKind, SendPayload},
    creds::Credentials,
    events::{ClientEvent, RawMessage},
};

/// Upper bound on a single request/response exchange with the sidecar.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered events before the session manager applies backpressure.
const EVENT_BUFFER: usize = 64;

/// Buffered download chunks per transfer.
const CHUNK_BUFFER: usize = 16;

#[derive(Debug, Serialize)]
struct RequestFrame<'a> {
    r#type: &'static str,
    id: Uuid,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    r#type: String,
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    event: Option<String>,
}

/// One base64 chunk of a media transfer.
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    transfer_id: Uuid,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Result<Value, String>>>>>;
type TransferMap = Arc<Mutex<HashMap<Uuid, mpsc::Sender<anyhow::Result<Bytes>>>>>;

/// [`ChatClient`] speaking the sidecar's JSON frame protocol.
pub struct SidecarClient {
    url: String,
    write_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: PendingMap,
    transfers: TransferMap,
}

impl SidecarClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            write_tx: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            transfers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Issue a request frame and wait for its correlated response.
    async fn request(&self, method: &str, params: Option<Value>) -> anyhow::Result<Value> {
        let id = Uuid::new_v4();
        let frame = RequestFrame {
            r#type: "req",
            id,
            method,
            params,
        };
        let json = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let write_tx = self.write_tx.lock().await;
            let Some(write_tx) = write_tx.as_ref() else {
                self.pending.lock().await.remove(&id);
                anyhow::bail!("sidecar not connected");
            };
            if write_tx.send(json).is_err() {
                self.pending.lock().await.remove(&id);
                anyhow::bail!("sidecar connection closed");
            }
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(Ok(payload))) => Ok(payload),
            Ok(Ok(Err(message))) => anyhow::bail!("sidecar error: {message}"),
            Ok(Err(_)) => anyhow::bail!("sidecar connection closed"),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                anyhow::bail!("sidecar request timed out: {method}")
            },
        }
    }
}

#[async_trait]
impl ChatClient for SidecarClient {
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<mpsc::Receiver<ClientEvent>> {
        let (ws_stream, _response) = connect_async(&self.url).await?;
        let (mut ws_sink, ws_reader) = ws_stream.split();

        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        *self.write_tx.lock().await = Some(write_tx);

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        // Writer task: serialize all outbound frames onto the socket.
        tokio::spawn(async move {
            while let Some(json) = write_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "sidecar write failed");
                    break;
                }
            }
            let _ = ws_sink.send(Message::Close(None)).await;
        });

        // Reader task: route responses, transfer chunks, and events.
        let pending = Arc::clone(&self.pending);
        let transfers = Arc::clone(&self.transfers);
        tokio::spawn(read_loop(ws_reader, pending, transfers, event_tx));

        // Hand the sidecar its resume state before anything else.
        let params = serde_json::json!({
            "credentials": credentials.map(|c| c.0),
        });
        self.request("connect", Some(params)).await?;

        Ok(event_rx)
    }

    async fn send(&self, address: &Address, payload: &SendPayload) -> anyhow::Result<()> {
        let params = serde_json::json!({
            "address": address.as_str(),
            "payload": payload,
        });
        self.request("send", Some(params)).await?;
        Ok(())
    }

    async fn download(
        &self,
        reference: &DownloadRef,
        kind: MediaKind,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>> {
        let transfer_id = Uuid::new_v4();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        self.transfers.lock().await.insert(transfer_id, chunk_tx);

        let params = serde_json::json!({
            "transfer_id": transfer_id,
            "reference": reference.0,
            "kind": kind.as_str(),
        });
        if let Err(e) = self.request("download", Some(params)).await {
            self.transfers.lock().await.remove(&transfer_id);
            return Err(e);
        }

        Ok(Box::pin(
            tokio_stream_from_receiver(chunk_rx),
        ))
    }

    async fn list_chats(&self) -> anyhow::Result<Vec<ChatSummary>> {
        let payload = self.request("list-chats", None).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

/// Wrap an mpsc receiver as a stream without pulling in tokio-stream.
fn tokio_stream_from_receiver<T: Send + 'static>(
    rx: mpsc::Receiver<T>,
) -> impl futures::Stream<Item = T> + Send + 'static {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

async fn read_loop(
    mut reader: impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
    + Unpin
    + Send,
    pending: PendingMap,
    transfers: TransferMap,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "sidecar read failed");
                break;
            },
        };

        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "unparseable sidecar frame");
                continue;
            },
        };

        match frame.r#type.as_str() {
            "res" => {
                let Some(id) = frame.id else {
                    warn!("response frame without id");
                    continue;
                };
                let Some(tx) = pending.lock().await.remove(&id) else {
                    debug!(%id, "response for unknown request");
                    continue;
                };
                let result = if frame.ok.unwrap_or(false) {
                    Ok(frame.payload.unwrap_or(Value::Null))
                } else {
                    Err(frame.error.unwrap_or_else(|| "unknown error".into()))
                };
                let _ = tx.send(result);
            },
            "chunk" => {
                let Some(payload) = frame.payload else {
                    continue;
                };
                handle_chunk(&transfers, payload).await;
            },
            "event" => {
                let Some(event) = decode_event(frame.event.as_deref(), frame.payload) else {
                    continue;
                };
                if event_tx.send(event).await.is_err() {
                    // Manager dropped the receiver; the connection is done.
                    break;
                }
            },
            other => debug!(frame_type = %other, "ignoring sidecar frame"),
        }
    }

    // Closing the event channel tells the manager the stream ended. Fail
    // any in-flight requests and transfers too.
    pending.lock().await.clear();
    for (_, tx) in transfers.lock().await.drain() {
        let _ = tx
            .send(Err(anyhow::anyhow!("sidecar connection closed")))
            .await;
    }
}

async fn handle_chunk(transfers: &TransferMap, payload: Value) {
    let chunk: ChunkPayload = match serde_json::from_value(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "unparseable transfer chunk");
            return;
        },
    };

    let mut transfers = transfers.lock().await;
    let Some(tx) = transfers.get(&chunk.transfer_id) else {
        debug!(transfer_id = %chunk.transfer_id, "chunk for unknown transfer");
        return;
    };

    if let Some(message) = chunk.error {
        let _ = tx.send(Err(anyhow::anyhow!(message))).await;
        transfers.remove(&chunk.transfer_id);
        return;
    }

    if let Some(data) = chunk.data {
        match base64::engine::general_purpose::STANDARD.decode(&data) {
            Ok(bytes) => {
                let _ = tx.send(Ok(Bytes::from(bytes))).await;
            },
            Err(e) => {
                let _ = tx
                    .send(Err(anyhow::anyhow!("corrupt transfer chunk: {e}")))
                    .await;
                transfers.remove(&chunk.transfer_id);
                return;
            },
        }
    }

    if chunk.done {
        transfers.remove(&chunk.transfer_id);
    }
}

fn decode_event(name: Option<&str>, payload: Option<Value>) -> Option<ClientEvent> {
    match name? {
        "credentials" => Some(ClientEvent::CredentialsChanged(Credentials(payload?))),
        "qr" => {
            let qr = payload?.get("qr")?.as_str()?.to_string();
            Some(ClientEvent::QrIssued(qr))
        },
        "open" => Some(ClientEvent::Opened),
        "close" => {
            let status_code = payload
                .as_ref()
                .and_then(|p| p.get("status_code"))
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok());
            Some(ClientEvent::Closed { status_code })
        },
        "message" => {
            let message: RawMessage = serde_json::from_value(payload?)
                .map_err(|e| warn!(error = %e, "unparseable inbound message"))
                .ok()?;
            Some(ClientEvent::MessageReceived(message))
        },
        other => {
            debug!(event = %other, "ignoring sidecar event");
            None
        },
    }
}
