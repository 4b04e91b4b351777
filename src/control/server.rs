//! Unix socket server for the mediation channel.
//!
//! # Lifecycle
//!
//! ```text
//! new()  ──> handle(type, handler)* ──> start() ──> … ──> stop()
//!  │                                      │                 │
//!  └ private temp dir + socket            └ accept loop     └ close listener,
//!                                                             wait in-flight,
//!                                                             delete temp dir
//! ```
//!
//! # Serialization policy
//!
//! Handlers usually block on a prompt rendered in the agent's own terminal.
//! Two prompts at once would interleave on that terminal, so every handler
//! invocation, across all connections, runs under one lock. A human who
//! walks away from a prompt stalls the whole channel; that is accepted.
//! Requests are served in lock-acquisition order, not arrival order.
//!
//! # Registration
//!
//! Registering a second handler for a type replaces the first (logged at
//! debug level). Registration may happen before or after `start()`.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::error::{ControlError, ControlResult};
use super::handler::Handler;
use super::protocol::{ERROR_MESSAGE_TYPE, Request, Response};

/// Maximum request line size (1 MiB).
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// How long a client may take to send its request line.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Socket file name inside the server's temp directory.
pub const SOCKET_FILE_NAME: &str = "broker.sock";

type HandlerMap = Arc<RwLock<HashMap<String, Arc<dyn Handler>>>>;

/// Mediation channel server.
pub struct MediationServer {
    /// Private directory holding the socket; deleted on stop.
    dir: Option<TempDir>,
    socket_path: PathBuf,
    /// Bound listener, taken by `start()`.
    listener: Option<StdUnixListener>,
    handlers: HandlerMap,
    /// Held for the duration of every handler invocation.
    dispatch_lock: Arc<Mutex<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
    read_timeout: Duration,
}

impl MediationServer {
    /// Create a server bound to a fresh socket in a private temp directory.
    ///
    /// The socket is connectable by any local user: the agent container
    /// usually runs under a different uid. Uses std's listener so it can be
    /// created outside a tokio runtime.
    pub fn new() -> ControlResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sandbox-broker-")
            .tempdir()?;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755))?;

        let socket_path = dir.path().join(SOCKET_FILE_NAME);
        let listener = StdUnixListener::bind(&socket_path)?;
        listener.set_nonblocking(true)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o777))?;

        info!("Mediation server listening on {:?}", socket_path);

        Ok(Self {
            dir: Some(dir),
            socket_path,
            listener: Some(listener),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            dispatch_lock: Arc::new(Mutex::new(())),
            shutdown_tx: None,
            accept_task: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Path of the socket file.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Register the handler for a message type, replacing any previous one.
    pub fn handle(&self, kind: impl Into<String>, handler: Arc<dyn Handler>) {
        let kind = kind.into();
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.clone(), handler);
        if previous.is_some() {
            debug!("Replaced handler for message type '{}'", kind);
        }
    }

    /// Deadline for receiving a request line; takes effect at `start()`.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    /// Start accepting connections in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> ControlResult<()> {
        let std_listener = self.listener.take().ok_or(ControlError::AlreadyStarted)?;
        let listener = UnixListener::from_std(std_listener)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handlers = Arc::clone(&self.handlers);
        let lock = Arc::clone(&self.dispatch_lock);

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            handlers,
            lock,
            self.read_timeout,
            shutdown_rx,
        )));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Close the listener, wait for in-flight connections to finish, and
    /// delete the temp directory. Call exactly once.
    ///
    /// A connection still sending its request is dropped once the read
    /// timeout passes. A handler already dispatched has no deadline: `stop`
    /// waits for it, including for a human who never answers a prompt.
    pub async fn stop(&mut self) -> ControlResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            error!("Accept loop terminated abnormally: {}", e);
        }
        self.listener.take();

        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        info!("Mediation server stopped");
        Ok(())
    }
}

impl Drop for MediationServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        // TempDir removes the directory on drop if stop() was skipped.
    }
}

async fn accept_loop(
    listener: UnixListener,
    handlers: HandlerMap,
    lock: Arc<Mutex<()>>,
    read_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    connections.spawn(serve_connection(
                        stream,
                        Arc::clone(&handlers),
                        Arc::clone(&lock),
                        read_timeout,
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!("Connection task failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    debug!("Listener closed, waiting for {} in-flight connection(s)", connections.len());
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            error!("Connection task failed: {}", e);
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    handlers: HandlerMap,
    lock: Arc<Mutex<()>>,
    read_timeout: Duration,
) {
    let (read_half, mut write_half) = stream.into_split();

    let Ok(read) = tokio::time::timeout(read_timeout, read_request_line(read_half)).await else {
        debug!("Client sent no request within {:?}, dropping", read_timeout);
        return;
    };

    let response = match read {
        Ok(line) => match Request::decode(&line) {
            Ok(request) => dispatch(&handlers, &lock, request).await,
            Err(e) => {
                debug!("Rejecting malformed request: {}", e);
                Response::error(ERROR_MESSAGE_TYPE, "", "invalid request")
            }
        },
        Err(ControlError::ConnectionClosed) => {
            debug!("Client disconnected before sending a request");
            return;
        }
        Err(e) => {
            debug!("Failed to read request: {}", e);
            Response::error(ERROR_MESSAGE_TYPE, "", "invalid request")
        }
    };

    let line = match response.encode() {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode response to '{}': {}", response.kind, e);
            match Response::error(response.kind, response.id, e.to_string()).encode() {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode error response: {}", e);
                    return;
                }
            }
        }
    };

    if let Err(e) = write_half.write_all(line.as_bytes()).await {
        debug!("Failed to write response: {}", e);
        return;
    }
    let _ = write_half.flush().await;
    let _ = write_half.shutdown().await;
}

/// Read one newline-terminated line of at most [`MAX_LINE_SIZE`] bytes.
async fn read_request_line(read_half: tokio::net::unix::OwnedReadHalf) -> ControlResult<String> {
    let mut reader = BufReader::new(read_half.take(MAX_LINE_SIZE as u64 + 1));
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;

    if n == 0 {
        return Err(ControlError::ConnectionClosed);
    }
    if buf.len() > MAX_LINE_SIZE {
        return Err(ControlError::MessageTooLarge(MAX_LINE_SIZE));
    }

    String::from_utf8(buf).map_err(|e| ControlError::InvalidPayload(e.to_string()))
}

/// Route a decoded request to its handler under the dispatch lock.
async fn dispatch(handlers: &HandlerMap, lock: &Mutex<()>, request: Request) -> Response {
    let handler = handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&request.kind)
        .cloned();

    let Some(handler) = handler else {
        warn!("Unknown message type '{}'", request.kind);
        let message = format!("unknown message type: {}", request.kind);
        return Response::error(request.kind, request.id, message);
    };

    let _guard = lock.lock().await;
    debug!("Dispatching '{}' (id {:?})", request.kind, request.id);

    match handler.handle(request.payload).await {
        Ok(payload) => Response::new(request.kind, request.id, payload),
        Err(e) => {
            warn!("Handler for '{}' failed: {}", request.kind, e);
            Response::error(request.kind, request.id, e.to_string())
        }
    }
}
