//! Minimal JSON-RPC client over a debugger WebSocket.
//!
//! Requests carry an `id`; a reader task routes `{id, result|error}` frames
//! to a pending-request table so each call is resolved exactly once. A call
//! that outlives its timeout removes its own pending entry and fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub(crate) struct CdpClient {
    sink: futures::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    pending: Pending,
    next_id: u64,
    reader: JoinHandle<()>,
}

impl CdpClient {
    pub(crate) async fn connect(url: &str) -> Option<Self> {
        let (stream, _) = match tokio_tungstenite::connect_async(url).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(url, error = %e, "debugger socket connect failed");
                return None;
            }
        };
        let (sink, mut read) = stream.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let routing = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "debugger socket read failed");
                        break;
                    }
                };
                let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                    continue; // protocol event, not a response
                };
                if let Some(tx) = routing.lock().expect("pending table poisoned").remove(&id) {
                    let _ = tx.send(frame);
                }
            }
        });

        Some(Self {
            sink,
            pending,
            next_id: 1,
            reader,
        })
    }

    /// Evaluate an expression in the page, returning its by-value result.
    pub(crate) async fn evaluate(&mut self, expression: &str, timeout: Duration) -> Option<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table poisoned")
            .insert(id, tx);

        let frame = json!({
            "id": id,
            "method": "Runtime.evaluate",
            "params": {
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": false,
            }
        });
        if let Err(e) = self.sink.send(Message::Text(frame.to_string().into())).await {
            debug!(error = %e, "debugger request send failed");
            self.pending
                .lock()
                .expect("pending table poisoned")
                .remove(&id);
            return None;
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return None, // socket closed under us
            Err(_) => {
                debug!(id, "debugger request timed out");
                self.pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&id);
                return None;
            }
        };

        if response.get("error").is_some() {
            debug!(id, "debugger request returned an error");
            return None;
        }
        let value = response.get("result")?.get("result")?.get("value")?;
        if value.is_null() {
            None
        } else {
            Some(value.clone())
        }
    }

    pub(crate) async fn close(mut self) {
        let _ = self.sink.close().await;
        self.reader.abort();
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
