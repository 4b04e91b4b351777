//! Wire protocol for the mediation channel.
//!
//! Every connection carries exactly one request line and one response line,
//! both newline-terminated JSON objects:
//!
//! ```text
//! → {"type":"vault_get","id":"7f0c…","payload":{"key":"GITHUB_TOKEN"}}
//! ← {"type":"vault_get","id":"7f0c…","payload":{"value":"…","approved":true}}
//! ```
//!
//! The envelope is untyped (`payload` is any JSON value) so the server can
//! route on `type` without knowing every message. Typed payload structs for
//! each capability live alongside it; request fields default so a missing
//! field becomes a validation error in the handler rather than a decode
//! failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ControlError, ControlResult};
use super::server::MAX_LINE_SIZE;

/// Message type tags understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Request outbound access to a domain.
    AllowDomain,
    /// Read one secret from the vault.
    VaultGet,
    /// List secret names in the vault.
    VaultList,
    /// Write one secret to the vault.
    VaultSet,
    /// Read one key from the scratch store.
    KvGet,
    /// Write one key to the scratch store.
    KvSet,
    /// Delete one key from the scratch store.
    KvDelete,
    /// List scratch store entries under a prefix.
    KvList,
}

impl MessageType {
    /// Every message type.
    pub const ALL: [MessageType; 8] = [
        MessageType::AllowDomain,
        MessageType::VaultGet,
        MessageType::VaultList,
        MessageType::VaultSet,
        MessageType::KvGet,
        MessageType::KvSet,
        MessageType::KvDelete,
        MessageType::KvList,
    ];

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::AllowDomain => "allow_domain",
            MessageType::VaultGet => "vault_get",
            MessageType::VaultList => "vault_list",
            MessageType::VaultSet => "vault_set",
            MessageType::KvGet => "kv_get",
            MessageType::KvSet => "kv_set",
            MessageType::KvDelete => "kv_delete",
            MessageType::KvList => "kv_list",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag used for responses to lines that could not be decoded.
pub const ERROR_MESSAGE_TYPE: &str = "error";

/// A request from the contained process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Handler-selecting tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Caller-chosen correlation id, echoed in the response.
    #[serde(default)]
    pub id: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Request {
    /// Build a request from a typed payload.
    pub fn new<P: Serialize>(
        kind: impl Into<String>,
        id: impl Into<String>,
        payload: &P,
    ) -> ControlResult<Self> {
        Ok(Self {
            kind: kind.into(),
            id: id.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Encode as one newline-terminated line.
    pub fn encode(&self) -> ControlResult<String> {
        encode_line(self)
    }

    /// Decode from one line (trailing newline optional).
    pub fn decode(line: &str) -> ControlResult<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

/// A response from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request's type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Echo of the request's id.
    #[serde(default)]
    pub id: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Response {
    /// Response carrying `payload` for a request.
    pub fn new(kind: impl Into<String>, id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            payload,
        }
    }

    /// Response whose payload is only an error string.
    pub fn error(kind: impl Into<String>, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, id, serde_json::json!({ "error": message.into() }))
    }

    /// The payload's `error` field, if set.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }

    /// Decode the payload into a typed response.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> ControlResult<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ControlError::InvalidPayload(e.to_string()))
    }

    /// Encode as one newline-terminated line.
    pub fn encode(&self) -> ControlResult<String> {
        encode_line(self)
    }

    /// Decode from one line (trailing newline optional).
    pub fn decode(line: &str) -> ControlResult<Self> {
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

fn encode_line<T: Serialize>(msg: &T) -> ControlResult<String> {
    // serde_json escapes control characters, so the encoded form never
    // contains a raw newline.
    let mut line = serde_json::to_string(msg)?;
    if line.len() >= MAX_LINE_SIZE {
        return Err(ControlError::MessageTooLarge(MAX_LINE_SIZE));
    }
    line.push('\n');
    Ok(line)
}

/// `allow_domain` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDomainRequest {
    /// Hostname, URL or IP to allow.
    #[serde(default)]
    pub domain: String,
}

/// `allow_domain` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDomainResponse {
    /// Whether access was granted.
    #[serde(default)]
    pub approved: bool,
    /// Validation or mechanism failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `vault_get` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultGetRequest {
    /// Secret name.
    #[serde(default)]
    pub key: String,
}

/// `vault_get` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultGetResponse {
    /// Secret value, only when approved and found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the read was approved.
    #[serde(default)]
    pub approved: bool,
    /// Validation or mechanism failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `vault_list` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultListRequest {}

/// `vault_list` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultListResponse {
    /// Secret names, only when approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    /// Whether the listing was approved.
    #[serde(default)]
    pub approved: bool,
    /// Mechanism failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `vault_set` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSetRequest {
    /// Secret name (`[A-Za-z0-9_]+`).
    #[serde(default)]
    pub key: String,
    /// Secret value.
    #[serde(default)]
    pub value: String,
}

/// `vault_set` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSetResponse {
    /// Whether the write was approved.
    #[serde(default)]
    pub approved: bool,
    /// Validation or mechanism failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `kv_get` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvGetRequest {
    /// Key to read.
    #[serde(default)]
    pub key: String,
}

/// `kv_get` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvGetResponse {
    /// Stored value, when found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the key exists.
    #[serde(default)]
    pub found: bool,
    /// Validation or store failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `kv_set` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvSetRequest {
    /// Key to write.
    #[serde(default)]
    pub key: String,
    /// Value to store.
    #[serde(default)]
    pub value: String,
}

/// Response for requests that only report failure (`kv_set`, `kv_delete`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvAckResponse {
    /// Validation or store failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `kv_delete` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvDeleteRequest {
    /// Key to delete.
    #[serde(default)]
    pub key: String,
}

/// `kv_list` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvListRequest {
    /// Key prefix; empty lists everything.
    #[serde(default)]
    pub prefix: String,
}

/// One scratch store entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

/// `kv_list` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvListResponse {
    /// Matching entries in store order.
    #[serde(default)]
    pub entries: Vec<KvEntry>,
    /// Store failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_line_not_encoded() {
        let big = "x".repeat(MAX_LINE_SIZE);
        let request = Request::new("kv_set", "1", &KvSetRequest {
            key: "k".to_string(),
            value: big,
        })
        .unwrap();
        assert!(matches!(
            request.encode(),
            Err(ControlError::MessageTooLarge(MAX_LINE_SIZE))
        ));

        let small = Response::new("kv_get", "1", serde_json::json!({"found": false}));
        assert!(small.encode().unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_message_type_tags() {
        assert_eq!(MessageType::AllowDomain.as_str(), "allow_domain");
        assert_eq!(MessageType::KvList.to_string(), "kv_list");
        for t in MessageType::ALL {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::parse("vault_delete"), None);
    }

    #[test]
    fn test_request_line_roundtrip_preserves_type_and_id() {
        let req = Request::new(
            "vault_get",
            "req-42",
            &VaultGetRequest {
                key: "multi\nline".to_string(),
            },
        )
        .unwrap();

        let line = req.encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let decoded = Request::decode(&line).unwrap();
        assert_eq!(decoded.kind, "vault_get");
        assert_eq!(decoded.id, "req-42");
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_wire_field_names() {
        let req = Request::new("kv_get", "1", &KvGetRequest { key: "k".into() }).unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"kv_get","id":"1","payload":{"key":"k"}}"#);
    }

    #[test]
    fn test_missing_id_and_payload_default() {
        let req = Request::decode(r#"{"type":"vault_list"}"#).unwrap();
        assert_eq!(req.id, "");
        assert!(req.payload.is_null());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Request::decode("not json").is_err());
        assert!(Request::decode(r#"{"id":"no type"}"#).is_err());
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error("kv_get", "7", "boom");
        assert_eq!(resp.error_message(), Some("boom"));
        assert_eq!(resp.kind, "kv_get");
        assert_eq!(resp.id, "7");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let resp = VaultGetResponse {
            value: None,
            approved: false,
            error: None,
        };
        assert_eq!(serde_json::to_string(&resp).unwrap(), r#"{"approved":false}"#);

        let list = KvListResponse::default();
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"{"entries":[]}"#);
    }

    #[test]
    fn test_typed_payload_decode() {
        let resp = Response::new(
            "kv_get",
            "1",
            serde_json::json!({"value": "v", "found": true}),
        );
        let typed: KvGetResponse = resp.payload_as().unwrap();
        assert!(typed.found);
        assert_eq!(typed.value.as_deref(), Some("v"));
        assert!(typed.error.is_none());
    }
}
