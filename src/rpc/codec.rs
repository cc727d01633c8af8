//! Wire message shapes for the JSON codec.
//!
//! This is an external contract: field names, base64 encoding of bytes
//! fields, and omission of empty values are fixed so non-Rust clients can
//! speak the protocol directly.

use serde::{Deserialize, Serialize};

/// Base64 (standard alphabet) encoding for bytes fields.
mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

// ============================================================================
// Subscribe
// ============================================================================

/// Worker → main: subscription handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    /// Caller-chosen stable worker identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worker_id: String,
    /// PEM-encoded RSA public key (bytes on the wire).
    #[serde(with = "b64", default, skip_serializing_if = "Vec::is_empty")]
    pub pubkey: Vec<u8>,
    /// RPC address the worker serves `Process` on; empty when the worker
    /// cannot receive forwards.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub addr: String,
}

/// Main → worker: handshake result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscribeResponse {
    /// Opaque session token scoped to the `Process` RPC.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    /// Master key encrypted to the worker's public key.
    #[serde(with = "b64", default, skip_serializing_if = "Vec::is_empty")]
    pub wrapped_key: Vec<u8>,
    /// Identifier of the wrapped master key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_id: String,
}

// ============================================================================
// Process
// ============================================================================

/// Entity operation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub entity_key: String,
    /// Schema to validate against on PUT; empty means none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_id: String,
    /// `"GET"` or `"PUT"`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
    /// Plaintext JSON payload for PUT; empty for GET.
    #[serde(with = "b64", default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
    /// Bearer credential; validated by the main worker before routing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

/// Entity operation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessResponse {
    /// `"OK"` on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Plaintext JSON payload for GET; empty for PUT.
    #[serde(with = "b64", default, skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<u8>,
    /// Persisted entity version.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u64,
    /// Reserved; errors normally travel as the RPC error envelope.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// `HIT` when the payload came from the worker's cache, `MISS` when it
    /// was read from disk. Surfaced to REST clients as `X-Cache`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bytes_fields_are_base64() {
        let request = ProcessRequest {
            database_name: "chatdb".to_string(),
            entity_key: "Chat_id".to_string(),
            operation: "PUT".to_string(),
            payload: br#"{"chat":[]}"#.to_vec(),
            ..Default::default()
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["payload"], "eyJjaGF0IjpbXX0=");

        let parsed: ProcessRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_empty_fields_omitted() {
        let response = ProcessResponse {
            status: "OK".to_string(),
            version: 1,
            ..Default::default()
        };
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire, json!({"status": "OK", "version": 1}));

        let put_ack: ProcessResponse = serde_json::from_value(json!({"status": "OK"})).unwrap();
        assert_eq!(put_ack.version, 0);
        assert!(put_ack.result.is_empty());
    }

    #[test]
    fn test_subscribe_roundtrip() {
        let request = SubscribeRequest {
            worker_id: "proc-1".to_string(),
            pubkey: b"-----BEGIN PUBLIC KEY-----".to_vec(),
            addr: "127.0.0.1:7001".to_string(),
        };
        let wire = serde_json::to_string(&request).unwrap();
        let parsed: SubscribeRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let wire = json!({"worker_id": "w", "pubkey": "***not-base64***"});
        assert!(serde_json::from_value::<SubscribeRequest>(wire).is_err());
    }

    #[test]
    fn test_missing_fields_default() {
        let request: ProcessRequest = serde_json::from_value(json!({
            "database_name": "chatdb",
            "entity_key": "k",
            "operation": "GET"
        }))
        .unwrap();
        assert!(request.payload.is_empty());
        assert!(request.token.is_empty());
        assert!(request.schema_id.is_empty());
    }
}
