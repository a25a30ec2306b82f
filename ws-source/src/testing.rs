// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! In-process ledger node speaking the websocket JSON protocol, for tests.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// How the mock node answers one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Success response with the given `result` payload.
    Result(Value),
    /// Error response carrying `{"error": {"error_message": ..}}`.
    Error(String),
    /// Success response sent after a delay, letting later requests overtake it.
    Delayed(Value, Duration),
    /// Never answer.
    Silent,
    /// Close the socket instead of answering.
    Close,
}

type Responder = Arc<dyn Fn(&Value) -> MockReply + Send + Sync>;

pub struct MockLedgerNode {
    addr: SocketAddr,
    events: broadcast::Sender<Value>,
    accepted: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl MockLedgerNode {
    pub async fn start<F>(responder: F) -> std::io::Result<Self>
    where
        F: Fn(&Value) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (events, _) = broadcast::channel(64);
        let accepted = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let responder: Responder = Arc::new(responder);

        let accept_events = events.clone();
        let accept_count = Arc::clone(&accepted);
        let request_count = Arc::clone(&requests);
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        accept_count.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(serve_connection(
                            stream,
                            Arc::clone(&responder),
                            accept_events.subscribe(),
                            Arc::clone(&request_count),
                            accept_cancel.child_token(),
                        ));
                    }
                }
            }
        });

        Ok(Self {
            addr,
            events,
            accepted,
            requests,
            cancel,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Pushes a message to every open connection; returns how many received it.
    pub fn push(&self, message: Value) -> usize {
        self.events.send(message).unwrap_or(0)
    }

    pub fn push_ledger_closed(&self, ledger_index: u64) -> usize {
        self.push(json!({
            "type": "ledgerClosed",
            "ledger_index": ledger_index,
            "ledger_hash": format!("{ledger_index:064X}"),
            "txn_count": 0,
        }))
    }

    /// Connections currently able to receive pushed events.
    pub fn listeners(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn connections_accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn requests_seen(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Drops every open connection and stops accepting new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MockLedgerNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn response(id: &Value, result: Value) -> Message {
    Message::Text(
        json!({"id": id, "status": "success", "type": "response", "result": result}).to_string(),
    )
}

async fn serve_connection(
    stream: TcpStream,
    responder: Responder,
    mut events: broadcast::Receiver<Value>,
    requests: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = socket.split();
    let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel::<Message>();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(message) = delayed_rx.recv() => {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(value) => {
                    if sink.send(Message::Text(value.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = source.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(request) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                requests.fetch_add(1, Ordering::SeqCst);
                let id = request.get("id").cloned().unwrap_or(Value::Null);
                let reply = match responder(&request) {
                    MockReply::Result(result) => Some(response(&id, result)),
                    MockReply::Error(message) => Some(Message::Text(
                        json!({
                            "id": id,
                            "status": "error",
                            "type": "response",
                            "error": {"error_message": message},
                        })
                        .to_string(),
                    )),
                    MockReply::Delayed(result, delay) => {
                        let delayed_tx = delayed_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = delayed_tx.send(response(&id, result));
                        });
                        None
                    }
                    MockReply::Silent => None,
                    MockReply::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Some(reply) = reply {
                    if sink.send(reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    let _ = sink.close().await;
}
