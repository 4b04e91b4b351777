//! Client side of the mediation channel, used from inside the container.
//!
//! The broker advertises its socket through [`SOCKET_ENV_VAR`]. Each call
//! opens a fresh connection, writes one request line and reads one
//! response line.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;
use uuid::Uuid;

use super::error::{ControlError, ControlResult};
use super::protocol::{Request, Response};
use super::server::MAX_LINE_SIZE;

/// Environment variable carrying the broker socket path.
pub const SOCKET_ENV_VAR: &str = "SANDBOX_BROKER_SOCKET";

/// Connection factory for one broker socket.
#[derive(Debug, Clone)]
pub struct MediationClient {
    socket_path: PathBuf,
}

impl MediationClient {
    /// Client for the socket at `socket_path`.
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Client for the socket advertised in [`SOCKET_ENV_VAR`].
    pub fn from_env() -> ControlResult<Self> {
        match std::env::var_os(SOCKET_ENV_VAR) {
            Some(path) if !path.is_empty() => Ok(Self::new(PathBuf::from(path))),
            _ => Err(ControlError::NotRunning(format!("{SOCKET_ENV_VAR} is not set"))),
        }
    }

    /// Socket this client connects to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request with a fresh id and an untyped payload.
    pub async fn request(&self, kind: &str, payload: Value) -> ControlResult<Response> {
        self.send(Request {
            kind: kind.to_string(),
            id: Uuid::new_v4().to_string(),
            payload,
        })
        .await
    }

    /// Send a typed request and decode the typed response payload.
    pub async fn call<Req, Resp>(&self, kind: &str, payload: &Req) -> ControlResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = self.request(kind, serde_json::to_value(payload)?).await?;
        response.payload_as()
    }

    /// Send a prepared request. An empty id is replaced with a fresh one.
    pub async fn send(&self, mut request: Request) -> ControlResult<Response> {
        if request.id.is_empty() {
            request.id = Uuid::new_v4().to_string();
        }

        let stream = UnixStream::connect(&self.socket_path).await?;
        let (read_half, mut write_half) = stream.into_split();

        write_half.write_all(request.encode()?.as_bytes()).await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half.take(MAX_LINE_SIZE as u64 + 1));
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ControlError::ConnectionClosed);
        }
        if line.len() > MAX_LINE_SIZE {
            return Err(ControlError::MessageTooLarge(MAX_LINE_SIZE));
        }

        let response = Response::decode(&line)?;
        if !response.id.is_empty() && response.id != request.id {
            return Err(ControlError::MismatchedResponse(format!(
                "expected id {}, got {}",
                request.id, response.id
            )));
        }
        debug!("Received '{}' response for {}", response.kind, request.id);
        Ok(response)
    }
}

/// Send one request to the broker at `socket_path`.
pub async fn request(socket_path: impl AsRef<Path>, request: Request) -> ControlResult<Response> {
    MediationClient::new(socket_path).send(request).await
}

/// Client for the broker advertised in the environment.
pub fn client_from_env() -> ControlResult<MediationClient> {
    MediationClient::from_env()
}
