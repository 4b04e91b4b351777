//! Handler abstraction for message dispatch.
//!
//! The server maps a message type tag to one [`Handler`]. A handler turns a
//! request payload into a response payload; an `Err` is reported to the
//! client as the payload's `error` field.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{ControlError, ControlResult};

/// Processes one message type.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a request payload and produce the response payload.
    ///
    /// May block indefinitely (e.g. waiting on a human).
    async fn handle(&self, payload: Value) -> ControlResult<Value>;
}

/// Decode a request payload. A missing (`null`) payload decodes as `{}`.
pub fn decode_payload<T: DeserializeOwned>(payload: Value) -> ControlResult<T> {
    let payload = if payload.is_null() {
        Value::Object(Default::default())
    } else {
        payload
    };
    serde_json::from_value(payload).map_err(|e| ControlError::InvalidPayload(e.to_string()))
}

/// Encode a typed response payload.
pub fn encode_payload<T: Serialize>(response: &T) -> ControlResult<Value> {
    Ok(serde_json::to_value(response)?)
}
