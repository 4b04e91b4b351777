//! `kv_get`, `kv_set`, `kv_delete` and `kv_list` handlers.
//!
//! The scratch store is unprotected: no prompts. Each request opens the
//! store, performs one operation and closes it; nothing is cached between
//! requests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::backend::{KvBackend, KvStore};
use super::error::{KvError, KvResult};
use crate::control::{
    ControlResult, Handler, decode_payload, encode_payload,
    protocol::{
        KvAckResponse, KvDeleteRequest, KvEntry, KvGetRequest, KvGetResponse, KvListRequest,
        KvListResponse, KvSetRequest,
    },
};

/// Shared logic behind the scratch store handlers.
pub struct KvService {
    backend: Arc<dyn KvBackend>,
}

impl KvService {
    /// Service over `backend`.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Open, run `op`, close, all on the blocking pool. A close failure is
    /// reported only if `op` succeeded.
    async fn with_store<T, F>(&self, op: F) -> KvResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn KvStore) -> KvResult<T> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || -> KvResult<T> {
            let mut store = backend.open()?;
            let result = op(store.as_mut());
            let closed = store.close();
            let value = result?;
            closed?;
            Ok(value)
        })
        .await?
    }

    /// Read one key.
    pub async fn get(&self, request: KvGetRequest) -> KvGetResponse {
        if request.key.is_empty() {
            return KvGetResponse {
                error: Some(KvError::MissingKey.to_string()),
                ..KvGetResponse::default()
            };
        }
        let key = request.key;
        match self.with_store(move |store| store.get(&key)).await {
            Ok(value) => KvGetResponse {
                found: value.is_some(),
                value,
                error: None,
            },
            Err(e) => KvGetResponse {
                error: Some(e.to_string()),
                ..KvGetResponse::default()
            },
        }
    }

    /// Write one key.
    pub async fn set(&self, request: KvSetRequest) -> KvAckResponse {
        if request.key.is_empty() {
            return ack(Err(KvError::MissingKey));
        }
        debug!("kv_set {}", request.key);
        let KvSetRequest { key, value } = request;
        ack(self.with_store(move |store| store.set(&key, &value)).await)
    }

    /// Delete one key.
    pub async fn delete(&self, request: KvDeleteRequest) -> KvAckResponse {
        if request.key.is_empty() {
            return ack(Err(KvError::MissingKey));
        }
        debug!("kv_delete {}", request.key);
        let key = request.key;
        ack(self.with_store(move |store| store.delete(&key)).await)
    }

    /// List entries under a prefix.
    pub async fn list(&self, request: KvListRequest) -> KvListResponse {
        let prefix = request.prefix;
        let listed = self
            .with_store(move |store| {
                let mut entries = Vec::new();
                store.iterate(&prefix, &mut |key, value| {
                    entries.push(KvEntry {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                })?;
                Ok(entries)
            })
            .await;
        match listed {
            Ok(entries) => KvListResponse {
                entries,
                error: None,
            },
            Err(e) => KvListResponse {
                entries: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

fn ack(result: KvResult<()>) -> KvAckResponse {
    KvAckResponse {
        error: result.err().map(|e| e.to_string()),
    }
}

/// `kv_get` handler.
pub struct KvGetHandler(pub Arc<KvService>);

/// `kv_set` handler.
pub struct KvSetHandler(pub Arc<KvService>);

/// `kv_delete` handler.
pub struct KvDeleteHandler(pub Arc<KvService>);

/// `kv_list` handler.
pub struct KvListHandler(pub Arc<KvService>);

#[async_trait]
impl Handler for KvGetHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.get(decode_payload(payload)?).await)
    }
}

#[async_trait]
impl Handler for KvSetHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.set(decode_payload(payload)?).await)
    }
}

#[async_trait]
impl Handler for KvDeleteHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.delete(decode_payload(payload)?).await)
    }
}

#[async_trait]
impl Handler for KvListHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.list(decode_payload(payload)?).await)
    }
}
