//! RPC connections.
//!
//! An [`RpcConnection`] runs one reader and one writer task over a
//! [`FrameTransport`]. Each side keeps:
//!
//! - an export table of capabilities the peer may call (id 0 is the bootstrap),
//! - a question table of outgoing calls waiting for a `Return`,
//! - an answer table of incoming calls still running.
//!
//! Capabilities in call parameters and results are exported on the way out and
//! become import handles on the way in. Dropping an import sends `Release`;
//! dropping a pending call sends `Finish`, which aborts the peer's answer task.
//! When the connection closes, pending questions fail with `Transport`, answer
//! tasks are aborted and every export is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hiveot_kernel::{HubError, HubResult, MethodKey};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{Client, ClientHook};
use crate::message::{decode_message, encode_message, CapDescriptor, Message, WirePayload};
use crate::method::MethodCall;
use crate::payload::Payload;
use crate::transport::{FrameSink, FrameStream, FrameTransport};

/// Export id of the capability a connection offers without being asked.
pub const BOOTSTRAP_EXPORT_ID: u32 = 0;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Owning handle of an RPC connection. Dropping it closes the connection.
pub struct RpcConnection {
    inner: Arc<ConnInner>,
}

impl RpcConnection {
    /// Start serving `transport`. `bootstrap` is what the peer gets from
    /// [`RpcConnection::bootstrap`] on its side.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(name: impl Into<String>, transport: FrameTransport, bootstrap: Option<Client>) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let mut exports = ExportTable::default();
        if let Some(bootstrap) = bootstrap {
            exports.entries.insert(BOOTSTRAP_EXPORT_ID, bootstrap);
        }
        let inner = Arc::new(ConnInner {
            name: name.into(),
            outbound,
            questions: Mutex::new(HashMap::new()),
            next_question: AtomicU32::new(1),
            exports: Mutex::new(exports),
            answers: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
        });
        let FrameTransport { sink, stream } = transport;
        tokio::spawn(write_loop(Arc::clone(&inner), sink, rx));
        tokio::spawn(read_loop(Arc::clone(&inner), stream));
        debug!("{}: connection started", inner.name);
        Self { inner }
    }

    /// The capability the peer exported as its bootstrap.
    pub fn bootstrap(&self) -> Client {
        Client::new(ImportClient {
            conn: Arc::clone(&self.inner),
            export_id: BOOTSTRAP_EXPORT_ID,
            owned: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Wait until the connection has closed for any reason.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Token cancelled when the connection closes. Cancelling it closes the
    /// connection without draining its tables; use [`RpcConnection::close`].
    pub fn close_token(&self) -> CancellationToken {
        self.inner.closed.clone()
    }

    pub fn close(&self) {
        self.inner.shutdown("closed locally");
    }

    /// Number of capabilities currently exported to the peer, bootstrap included.
    pub fn export_count(&self) -> usize {
        self.inner.exports.lock().entries.len()
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.inner.shutdown("connection released");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection state
// ─────────────────────────────────────────────────────────────────────────────

struct ExportTable {
    next_id: u32,
    entries: HashMap<u32, Client>,
}

impl Default for ExportTable {
    fn default() -> Self {
        Self {
            next_id: BOOTSTRAP_EXPORT_ID + 1,
            entries: HashMap::new(),
        }
    }
}

impl ExportTable {
    fn insert(&mut self, client: Client) -> u32 {
        while self.next_id == BOOTSTRAP_EXPORT_ID || self.entries.contains_key(&self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(id, client);
        id
    }
}

struct ConnInner {
    name: String,
    outbound: mpsc::UnboundedSender<Message>,
    questions: Mutex<HashMap<u32, oneshot::Sender<HubResult<Payload>>>>,
    next_question: AtomicU32,
    exports: Mutex<ExportTable>,
    answers: Mutex<HashMap<u32, AbortHandle>>,
    closed: CancellationToken,
    close_reason: Mutex<Option<String>>,
}

impl ConnInner {
    fn send(&self, msg: Message) -> HubResult<()> {
        self.outbound.send(msg).map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> HubError {
        let reason = self
            .close_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "connection closed".to_string());
        HubError::transport(format!("{}: {reason}", self.name))
    }

    /// Close once: fail waiting questions, abort answers, drop exports.
    fn shutdown(&self, reason: &str) {
        {
            let mut close_reason = self.close_reason.lock();
            if close_reason.is_some() {
                return;
            }
            *close_reason = Some(reason.to_string());
        }
        debug!("{}: closing: {reason}", self.name);
        self.closed.cancel();

        let questions = std::mem::take(&mut *self.questions.lock());
        for (_, waiter) in questions {
            let _ = waiter.send(Err(self.closed_error()));
        }
        let answers = std::mem::take(&mut *self.answers.lock());
        for (_, task) in answers {
            task.abort();
        }
        let exports = std::mem::take(&mut self.exports.lock().entries);
        drop(exports);
    }

    /// Send a call to the peer's export `target` and wait for the answer.
    async fn question(self: &Arc<Self>, target: u32, call: MethodCall) -> HubResult<Payload> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        let question_id = self.next_question.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.questions.lock().insert(question_id, tx);
        let mut guard = QuestionGuard {
            conn: Arc::clone(self),
            question_id,
            answered: false,
        };
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }

        let params = self.export_payload(call.params);
        self.send(Message::Call {
            question_id,
            target,
            key: call.key,
            params,
        })?;

        let answer = rx.await;
        guard.answered = true;
        answer.unwrap_or_else(|_| Err(self.closed_error()))
    }

    fn export_payload(&self, payload: Payload) -> WirePayload {
        let (content, caps) = payload.into_parts();
        let caps = if self.closed.is_cancelled() {
            vec![CapDescriptor::None; caps.len()]
        } else {
            let mut exports = self.exports.lock();
            caps.into_iter()
                .map(|cap| match cap {
                    Some(client) => CapDescriptor::SenderHosted(exports.insert(client)),
                    None => CapDescriptor::None,
                })
                .collect()
        };
        WirePayload {
            content: content.to_vec(),
            caps,
        }
    }

    fn import_payload(self: &Arc<Self>, wire: WirePayload) -> Payload {
        let caps = wire
            .caps
            .into_iter()
            .map(|desc| match desc {
                CapDescriptor::None => None,
                CapDescriptor::SenderHosted(export_id) => Some(Client::new(ImportClient {
                    conn: Arc::clone(self),
                    export_id,
                    owned: true,
                })),
            })
            .collect();
        Payload::from_parts(Bytes::from(wire.content), caps)
    }

    fn handle_message(self: &Arc<Self>, msg: Message) {
        match msg {
            Message::Call {
                question_id,
                target,
                key,
                params,
            } => self.handle_call(question_id, target, key, params),
            Message::Return { question_id, result } => {
                let result = result.map(|wire| self.import_payload(wire));
                let waiter = self.questions.lock().remove(&question_id);
                if let Some(waiter) = waiter {
                    let _ = waiter.send(result);
                }
            }
            Message::Finish { question_id } => {
                let task = self.answers.lock().remove(&question_id);
                if let Some(task) = task {
                    debug!("{}: call {question_id} cancelled by peer", self.name);
                    task.abort();
                }
            }
            Message::Release { export_id } => {
                if export_id != BOOTSTRAP_EXPORT_ID {
                    let released = self.exports.lock().entries.remove(&export_id);
                    drop(released);
                }
            }
            Message::Abort { reason } => self.shutdown(&format!("peer aborted: {reason}")),
        }
    }

    fn handle_call(self: &Arc<Self>, question_id: u32, target: u32, key: MethodKey, params: WirePayload) {
        let target_client = self.exports.lock().entries.get(&target).cloned();
        let params = self.import_payload(params);
        let conn = Arc::clone(self);

        // The answer table lock is held across spawn so the task cannot remove
        // its entry before it is inserted.
        let mut answers = self.answers.lock();
        let task = tokio::spawn(async move {
            let result = match target_client {
                Some(client) => client.call(MethodCall::new(key, params)).await,
                None => Err(HubError::transport(format!(
                    "{}: capability {target} is not exported",
                    conn.name
                ))),
            };
            conn.answers.lock().remove(&question_id);
            let result = result.map(|payload| conn.export_payload(payload));
            if conn.send(Message::Return { question_id, result }).is_err() {
                debug!("{}: dropped answer to call {question_id}", conn.name);
            }
        });
        answers.insert(question_id, task.abort_handle());
    }
}

/// Removes an unanswered question and tells the peer to stop working on it.
struct QuestionGuard {
    conn: Arc<ConnInner>,
    question_id: u32,
    answered: bool,
}

impl Drop for QuestionGuard {
    fn drop(&mut self) {
        if self.answered {
            return;
        }
        let pending = self.conn.questions.lock().remove(&self.question_id);
        if pending.is_some() && !self.conn.closed.is_cancelled() {
            let _ = self.conn.send(Message::Finish {
                question_id: self.question_id,
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Imported capabilities
// ─────────────────────────────────────────────────────────────────────────────

struct ImportClient {
    conn: Arc<ConnInner>,
    export_id: u32,
    /// Bootstrap imports are never released explicitly.
    owned: bool,
}

#[async_trait]
impl ClientHook for ImportClient {
    async fn call(&self, call: MethodCall) -> HubResult<Payload> {
        self.conn.question(self.export_id, call).await
    }

    fn is_valid(&self) -> bool {
        !self.conn.closed.is_cancelled()
    }

    fn describe(&self) -> String {
        format!("import {} on {}", self.export_id, self.conn.name)
    }
}

impl Drop for ImportClient {
    fn drop(&mut self) {
        if self.owned && !self.conn.closed.is_cancelled() {
            let _ = self.conn.send(Message::Release {
                export_id: self.export_id,
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// I/O tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn write_loop(inner: Arc<ConnInner>, mut sink: FrameSink, mut rx: mpsc::UnboundedReceiver<Message>) {
    loop {
        let msg = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = inner.closed.cancelled() => break,
        };
        let frame = match encode_message(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}: {e}", inner.name);
                continue;
            }
        };
        tokio::select! {
            sent = sink.send(frame) => {
                if let Err(e) = sent {
                    inner.shutdown(&format!("write failed: {e}"));
                    break;
                }
            }
            _ = inner.closed.cancelled() => break,
        }
    }
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
}

async fn read_loop(inner: Arc<ConnInner>, mut stream: FrameStream) {
    let reason = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = inner.closed.cancelled() => return,
        };
        match frame {
            None => break "peer closed the connection".to_string(),
            Some(Err(e)) => break format!("read failed: {e}"),
            Some(Ok(bytes)) => match decode_message(&bytes) {
                Ok(msg) => inner.handle_message(msg),
                Err(e) => {
                    let _ = inner.send(Message::Abort {
                        reason: e.to_string(),
                    });
                    break e.to_string();
                }
            },
        }
    };
    inner.shutdown(&reason);
}
