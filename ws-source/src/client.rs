// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Correlating websocket client for one ledger node.
//!
//! Each connected session runs two tasks. The dispatcher owns the read half of
//! the socket and the table of pending requests; it is the only code that
//! inserts into or resolves that table, and it handles inbound frames one at a
//! time in arrival order. The writer owns the write half so that a slow send
//! never holds up inbound dispatch. Tearing a session down sweeps the pending
//! table and fails every outstanding request with
//! [`ClientError::ConnectionLost`].

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use core_types::NetworkEndpoint;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::{
    command::Command,
    error::{ClientError, Result},
    protocol::{parse_inbound, Inbound, LedgerClosed},
};

type LedgerClosedHandler = Arc<dyn Fn(LedgerClosed) + Send + Sync>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<Value>>;
type HandlerSlot = Arc<Mutex<Option<LedgerClosedHandler>>>;

struct Outgoing {
    id: u64,
    text: String,
    reply: Reply,
}

struct Session {
    requests: mpsc::UnboundedSender<Outgoing>,
    handler: HandlerSlot,
    cancel: CancellationToken,
    dispatcher: JoinHandle<()>,
}

pub struct LedgerClient {
    endpoint: NetworkEndpoint,
    next_id: AtomicU64,
    session: Mutex<Option<Session>>,
}

impl LedgerClient {
    pub fn new(endpoint: NetworkEndpoint) -> Self {
        Self {
            endpoint,
            next_id: AtomicU64::new(0),
            session: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &NetworkEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.dispatcher.is_finished())
    }

    /// Opens the socket. A no-op while a session is already live.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        crate::install_rustls_provider();
        let url = self.endpoint.url.as_str();
        let (socket, _) = connect_async(url)
            .await
            .map_err(|err| ClientError::Connection {
                url: url.to_string(),
                source: Box::new(err),
            })?;
        let (sink, source) = socket.split();

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(write_loop(self.endpoint.name.clone(), sink, outbound_rx));
        let dispatcher = Dispatcher {
            label: self.endpoint.name.clone(),
            pending: HashMap::new(),
            handler: Arc::clone(&handler),
            outbound: outbound_tx,
        };
        let dispatcher = tokio::spawn(dispatcher.run(source, requests_rx, cancel.clone()));

        let previous = self.session.lock().replace(Session {
            requests: requests_tx,
            handler,
            cancel,
            dispatcher,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        info!("[{}] connected to {}", self.endpoint.name, url);
        Ok(())
    }

    /// Sends a command and waits for the response carrying the same id.
    ///
    /// There is no internal timeout; callers bound the wait themselves.
    pub async fn request<C>(&self, command: &C) -> Result<Value>
    where
        C: Serialize + ?Sized,
    {
        let requests = self
            .session
            .lock()
            .as_ref()
            .map(|session| session.requests.clone())
            .ok_or(ClientError::NotConnected)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let text = encode_request(id, command)?;
        let (reply, response) = oneshot::channel();
        requests
            .send(Outgoing { id, text, reply })
            .map_err(|_| ClientError::ConnectionLost)?;
        response.await.unwrap_or(Err(ClientError::ConnectionLost))
    }

    /// Registers the handler for unsolicited ledger-close events on the
    /// current session. The handler runs on the dispatcher and must not block.
    pub fn on_ledger_closed<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(LedgerClosed) + Send + Sync + 'static,
    {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(ClientError::NotConnected)?;
        *session.handler.lock() = Some(Arc::new(handler));
        Ok(())
    }

    /// Registers `handler` and subscribes to the ledger stream.
    pub async fn subscribe_ledger_closed<F>(&self, handler: F) -> Result<Value>
    where
        F: Fn(LedgerClosed) + Send + Sync + 'static,
    {
        self.on_ledger_closed(handler)?;
        self.request(&Command::subscribe_ledger_stream()).await
    }

    /// Closes the socket and fails everything still pending. Safe to call
    /// when never connected.
    pub async fn disconnect(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            return;
        };
        session.handler.lock().take();
        session.cancel.cancel();
        if let Err(err) = session.dispatcher.await {
            if !err.is_cancelled() {
                warn!("[{}] dispatcher task failed: {err}", self.endpoint.name);
            }
        }
        info!("[{}] disconnected", self.endpoint.name);
    }
}

impl Drop for LedgerClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

fn encode_request<C>(id: u64, command: &C) -> Result<String>
where
    C: Serialize + ?Sized,
{
    let mut value = serde_json::to_value(command)?;
    let object = value.as_object_mut().ok_or(ClientError::InvalidCommand)?;
    object.insert("id".to_string(), Value::from(id));
    Ok(serde_json::to_string(&value)?)
}

async fn write_loop(
    label: String,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            debug!("[{label}] socket write failed: {err}");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

struct Dispatcher {
    label: String,
    pending: HashMap<u64, Reply>,
    handler: HandlerSlot,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut source: SplitStream<WsStream>,
        mut requests: mpsc::UnboundedReceiver<Outgoing>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = self.outbound.send(Message::Close(None));
                    break;
                }
                Some(outgoing) = requests.recv() => self.send_request(outgoing),
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.handle_text(&text),
                        Err(_) => warn!("[{}] dropping non-utf8 binary frame", self.label),
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!("[{}] server closed the connection", self.label);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("[{}] socket read failed: {err}", self.label);
                        break;
                    }
                    None => break,
                },
            }
        }
        self.sweep(&mut requests);
    }

    fn send_request(&mut self, outgoing: Outgoing) {
        let Outgoing { id, text, reply } = outgoing;
        if self.outbound.send(Message::Text(text)).is_err() {
            let _ = reply.send(Err(ClientError::ConnectionLost));
            return;
        }
        self.pending.insert(id, reply);
    }

    fn handle_text(&mut self, text: &str) {
        match parse_inbound(text) {
            Inbound::Response { id, outcome } => match self.pending.remove(&id) {
                // The caller may have stopped waiting; nothing to do then.
                Some(reply) => {
                    let _ = reply.send(outcome);
                }
                None => debug!("[{}] response for unknown request id {id}", self.label),
            },
            Inbound::LedgerClosed(event) => {
                let handler = self.handler.lock().clone();
                match handler {
                    Some(handler) => handler(event),
                    None => debug!(
                        "[{}] ledger {} closed with no handler registered",
                        self.label, event.ledger_index
                    ),
                }
            }
            Inbound::Ignored(kind) => {
                debug!("[{}] ignoring message of type {:?}", self.label, kind)
            }
            Inbound::Malformed(reason) => {
                warn!("[{}] skipping malformed message: {reason}", self.label)
            }
        }
    }

    /// Fails every request that can no longer be answered and drops the
    /// event handler.
    fn sweep(&mut self, requests: &mut mpsc::UnboundedReceiver<Outgoing>) {
        requests.close();
        while let Ok(outgoing) = requests.try_recv() {
            let _ = outgoing.reply.send(Err(ClientError::ConnectionLost));
        }
        let outstanding = self.pending.len();
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(ClientError::ConnectionLost));
        }
        self.handler.lock().take();
        if outstanding > 0 {
            debug!(
                "[{}] failed {outstanding} outstanding requests on teardown",
                self.label
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLedgerNode, MockReply};
    use core_types::NetworkId;
    use serde_json::json;
    use std::time::Duration;

    fn endpoint(url: String) -> NetworkEndpoint {
        NetworkEndpoint::new(NetworkId::Xrpl, url)
    }

    async fn echo_node() -> MockLedgerNode {
        MockLedgerNode::start(|request| {
            let index = request["ledger_index"].clone();
            match index.as_u64() {
                Some(1) => MockReply::Delayed(json!({"ledger_index": 1}), Duration::from_millis(150)),
                Some(99) => MockReply::Error("lgrNotFound".to_string()),
                Some(7) => MockReply::Silent,
                Some(13) => MockReply::Close,
                _ => MockReply::Result(json!({"ledger_index": index, "echo_id": request["id"]})),
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn request_before_connect_fails() {
        let client = LedgerClient::new(endpoint("ws://127.0.0.1:1".to_string()));
        let err = client.request(&Command::validated_ledger()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn connect_to_unreachable_endpoint_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = LedgerClient::new(endpoint(format!("ws://127.0.0.1:{port}")));
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn ids_increase_and_responses_match() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(node.connections_accepted(), 1);

        let first = client.request(&Command::ledger_transactions(5)).await.unwrap();
        let second = client.request(&Command::ledger_transactions(6)).await.unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["result"]["ledger_index"], 5);
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"]["echo_id"], 2);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn out_of_order_responses_resolve_their_own_callers() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();

        let slow_cmd = Command::ledger_transactions(1);
        let slow = client.request(&slow_cmd);
        let fast_cmd = Command::ledger_transactions(2);
        let fast = client.request(&fast_cmd);
        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(slow.unwrap()["result"]["ledger_index"], 1);
        assert_eq!(fast.unwrap()["result"]["ledger_index"], 2);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn error_responses_become_server_errors() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();
        let err = client
            .request(&Command::ledger_transactions(99))
            .await
            .unwrap_err();
        match err {
            ClientError::Server { message } => assert_eq!(message, "lgrNotFound"),
            other => panic!("unexpected {other:?}"),
        }
        // The session survives a protocol-level error.
        assert!(client.request(&Command::ledger_transactions(3)).await.is_ok());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_fails_pending_requests() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();

        let pending_cmd = Command::ledger_transactions(7);
        let pending = client.request(&pending_cmd);
        let teardown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.disconnect().await;
        };
        let (result, ()) = tokio::join!(pending, teardown);
        assert!(matches!(result, Err(ClientError::ConnectionLost)));
        assert!(matches!(
            client.request(&Command::validated_ledger()).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn server_close_fails_pending_requests() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();

        let silent_cmd = Command::ledger_transactions(7);
        let silent = client.request(&silent_cmd);
        let closing_cmd = Command::ledger_transactions(13);
        let closing = client.request(&closing_cmd);
        let (silent, closing) = tokio::join!(silent, closing);
        assert!(matches!(silent, Err(ClientError::ConnectionLost)));
        assert!(matches!(closing, Err(ClientError::ConnectionLost)));

        let after = client.request(&Command::ledger_transactions(3)).await;
        assert!(matches!(after, Err(ClientError::ConnectionLost)));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn ledger_closed_events_reach_the_handler() {
        let node = echo_node().await;
        let client = LedgerClient::new(endpoint(node.url()));
        client.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .subscribe_ledger_closed(move |event| {
                let _ = tx.send(event);
            })
            .await
            .unwrap();
        node.push(json!({"type": "ledgerClosed", "ledger_index": "500"}));
        node.push_ledger_closed(501);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.ledger_index, 500);
        assert_eq!(second.ledger_index, 501);

        client.disconnect().await;
        // Disconnect drops the handler and with it the sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let client = LedgerClient::new(endpoint("ws://127.0.0.1:1".to_string()));
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[test]
    fn encode_request_adds_id() {
        let text = encode_request(42, &Command::validated_ledger()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["command"], "ledger");
        assert!(matches!(
            encode_request(1, &json!(["not", "an", "object"])),
            Err(ClientError::InvalidCommand)
        ));
    }
}
