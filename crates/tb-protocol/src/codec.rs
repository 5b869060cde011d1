//! Capacity-checked JSON encoding for outbound payloads.

use serde::Serialize;

use crate::error::{ProtocolError, ProtocolResult};

/// Default outbound payload capacity in bytes.
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 1500;

/// Serialize `value` to JSON, refusing anything larger than `capacity`.
///
/// Oversized payloads are rejected whole; nothing is truncated.
pub fn encode_capped<T: Serialize + ?Sized>(value: &T, capacity: usize) -> ProtocolResult<Vec<u8>> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > capacity {
        return Err(ProtocolError::PayloadTooLarge {
            size: bytes.len(),
            capacity,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::KeyValue;

    #[test]
    fn small_payload_passes() {
        let bytes = encode_capped(&KeyValue::new("a", 1), 16).unwrap();
        assert_eq!(bytes, br#"{"a":1}"#);
    }

    #[test]
    fn exact_capacity_passes() {
        // {"a":1} is 7 bytes
        assert!(encode_capped(&KeyValue::new("a", 1), 7).is_ok());
    }

    #[test]
    fn oversized_payload_rejected() {
        let kv = KeyValue::new("blob", "x".repeat(64));
        let err = encode_capped(&kv, 32).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadTooLarge { capacity: 32, .. }
        ));
    }
}
