//! Bridge Session
//!
//! Manages the persistent Node.js process hosting GramJS.
//! Handles JSON protocol communication over stdin/stdout: requests are
//! correlated with responses by id so several calls can be in flight at once,
//! and pushed events are routed to their subscriptions.

use super::protocol::{BridgeEvent, BridgeLine, BridgeRequest, BridgeResponse, WireMessage};
use crate::config::BridgeConfig;
use crate::library::LibraryError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type PendingMap = HashMap<String, oneshot::Sender<BridgeResponse>>;

/// State shared between the session handle and its stdout reader task
struct Shared {
    /// In-flight requests; `None` once the bridge has gone away
    pending: Mutex<Option<PendingMap>>,
    /// Live subscriptions keyed by subscription id
    ///
    /// Unbounded: the reader must never wait on a slow subscriber, or responses
    /// queued behind a burst of events would stall.
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<WireMessage>>>,
    /// Set when the bridge reports the library loaded
    ready: AtomicBool,
    /// Why the bridge stopped, once it has
    closed_reason: Mutex<Option<String>>,
}

/// Handle to the bridge subprocess
///
/// One BridgeSession hosts one GramJS runtime, which may serve any number of
/// clients.
pub struct BridgeSession {
    /// Child process handle (absent for in-memory transports)
    child: Mutex<Option<Child>>,
    /// Stdin handle for sending requests
    writer: Mutex<Writer>,
    /// State shared with the reader task
    shared: Arc<Shared>,
    /// Task reading stdout
    reader_task: JoinHandle<()>,
    /// Task collecting stderr, if any
    stderr_task: Option<JoinHandle<String>>,
    /// Per-request timeout
    request_timeout: Duration,
}

impl BridgeSession {
    /// Spawn the bridge process described by `config`
    pub async fn spawn(config: &BridgeConfig) -> Result<Arc<Self>, LibraryError> {
        debug!(
            node = %config.node_command,
            script = %config.script_path.display(),
            "Spawning bridge process"
        );

        let mut child = Command::new(&config.node_command)
            .arg(&config.script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LibraryError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LibraryError::Spawn("Failed to get stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LibraryError::Spawn("Failed to get stdout handle".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LibraryError::Spawn("Failed to get stderr handle".to_string()))?;

        info!(pid = child.id(), "Bridge process spawned successfully");

        // Collect stderr for debugging; GramJS logs connection chatter there.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(stderr = %line, "Bridge stderr");
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut session = Self::build(stdout, stdin, config.request_timeout);
        session.child = Mutex::new(Some(child));
        session.stderr_task = Some(stderr_task);
        Ok(Arc::new(session))
    }

    /// Run the protocol over an arbitrary transport
    ///
    /// Used for bridges reached over something other than a child process,
    /// and by tests with an in-memory pipe.
    pub fn from_transport<R, W>(reader: R, writer: W, request_timeout: Duration) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self::build(reader, writer, request_timeout))
    }

    fn build<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Some(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
            closed_reason: Mutex::new(None),
        });

        let reader_task = tokio::spawn(read_loop(reader, shared.clone()));

        Self {
            child: Mutex::new(None),
            writer: Mutex::new(Box::new(writer)),
            shared,
            reader_task,
            stderr_task: None,
            request_timeout,
        }
    }

    /// True once the bridge has announced that GramJS is loaded
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response payload
    ///
    /// # Timeout
    /// Fails with `LibraryError::Timeout` if no response arrives within the
    /// configured request timeout.
    pub async fn request(
        &self,
        request_type: &str,
        params: Map<String, Value>,
    ) -> Result<Value, LibraryError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.shared.pending.lock().await;
            match pending.as_mut() {
                Some(map) => {
                    map.insert(id.clone(), tx);
                }
                None => return Err(LibraryError::Closed(self.closed_reason().await)),
            }
        }

        let request = BridgeRequest {
            id: id.clone(),
            request_type: request_type.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        debug!(request_id = %id, request_type, "Sending bridge request");

        if let Err(e) = self.write_line(&line).await {
            self.forget(&id).await;
            return Err(e);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(LibraryError::Closed(self.closed_reason().await)),
            Err(_) => {
                self.forget(&id).await;
                warn!(request_id = %id, request_type, "Bridge request timed out");
                return Err(LibraryError::Timeout(self.request_timeout.as_secs()));
            }
        };

        match response.status.as_str() {
            "success" => Ok(response.data.unwrap_or(Value::Null)),
            "error" => {
                let error_msg = response
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string());
                error!(request_id = %id, request_type, error = %error_msg, "Bridge returned error");
                Err(LibraryError::Remote(error_msg))
            }
            other => Err(LibraryError::Protocol(format!(
                "Unexpected response status: {}",
                other
            ))),
        }
    }

    /// Send a request and decode the response payload
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        request_type: &str,
        params: Map<String, Value>,
    ) -> Result<T, LibraryError> {
        let data = self.request(request_type, params).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Route events for `subscription_id` to the returned receiver
    ///
    /// Register before asking the bridge to subscribe so no event is missed.
    pub async fn register_subscription(
        &self,
        subscription_id: &str,
    ) -> mpsc::UnboundedReceiver<WireMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .subscriptions
            .lock()
            .await
            .insert(subscription_id.to_string(), tx);
        rx
    }

    /// Stop routing events for `subscription_id`
    pub async fn unregister_subscription(&self, subscription_id: &str) {
        self.shared.subscriptions.lock().await.remove(subscription_id);
    }

    /// Kill the bridge process
    pub async fn kill(&self) -> Result<(), LibraryError> {
        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            child
                .kill()
                .await
                .map_err(|e| LibraryError::Io(format!("Failed to kill bridge process: {}", e)))?;
            let _ = child.wait().await;
            info!("Bridge process killed successfully");
        }
        Ok(())
    }

    /// Check if the bridge is still usable
    pub async fn is_running(&self) -> bool {
        if self.shared.pending.lock().await.is_none() {
            return false;
        }
        let mut child_guard = self.child.lock().await;
        match child_guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            // In-memory transport: alive as long as the reader is.
            None => !self.reader_task.is_finished(),
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), LibraryError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn forget(&self, id: &str) {
        if let Some(map) = self.shared.pending.lock().await.as_mut() {
            map.remove(id);
        }
    }

    async fn closed_reason(&self) -> String {
        self.shared
            .closed_reason
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| "connection closed".to_string())
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        // Can't await in Drop; start_kill() is synchronous.
        if let Ok(mut child_guard) = self.child.try_lock() {
            if let Some(mut child) = child_guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}

/// Read stdout line by line until EOF, dispatching responses and events
async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match BridgeLine::parse(line) {
                    Ok(BridgeLine::Response(response)) => {
                        dispatch_response(&shared, response).await
                    }
                    Ok(BridgeLine::Event(event)) => dispatch_event(&shared, event).await,
                    Err(e) => {
                        warn!(error = %e, line = %line, "Ignoring unparseable bridge output")
                    }
                }
            }
            Ok(None) => break "EOF while reading bridge output".to_string(),
            Err(e) => break format!("Failed to read bridge output: {}", e),
        }
    };

    error!(reason = %reason, "Bridge output closed");
    *shared.closed_reason.lock().await = Some(reason);
    // Dropping the senders fails every in-flight request and ends every stream.
    shared.pending.lock().await.take();
    shared.subscriptions.lock().await.clear();
    shared.ready.store(false, Ordering::SeqCst);
}

async fn dispatch_response(shared: &Shared, response: BridgeResponse) {
    let waiter = shared
        .pending
        .lock()
        .await
        .as_mut()
        .and_then(|map| map.remove(&response.id));

    match waiter {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => warn!(request_id = %response.id, "Response for unknown request"),
    }
}

async fn dispatch_event(shared: &Shared, event: BridgeEvent) {
    match event {
        BridgeEvent::Ready => {
            info!("Bridge reports GramJS loaded");
            shared.ready.store(true, Ordering::SeqCst);
        }
        BridgeEvent::NewMessage {
            subscription,
            message,
        } => {
            let sender = shared.subscriptions.lock().await.get(&subscription).cloned();
            match sender {
                Some(tx) => {
                    if tx.send(message).is_err() {
                        debug!(subscription = %subscription, "Subscriber gone, dropping event");
                    }
                }
                None => debug!(subscription = %subscription, "Event for inactive subscription"),
            }
        }
    }
}
