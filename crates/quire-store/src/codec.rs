//! DAG-CBOR block codec.
//!
//! Every structured block (tree nodes, record values, commits, event frames)
//! is encoded as DAG-CBOR, which is deterministic and self-delimiting.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Encode a value as DAG-CBOR bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode DAG-CBOR bytes. The input must hold exactly one value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_documents_survive_encoding() {
        let doc = json!({"text": "hello", "n": 3, "nested": {"list": [1, 2, null]}});
        let bytes = encode(&doc).unwrap();
        let back: serde_json::Value = decode(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn map_key_order_does_not_change_bytes() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&json!({"x": 1})).unwrap();
        bytes.push(0x00);
        assert!(matches!(
            decode::<serde_json::Value>(&bytes),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode::<serde_json::Value>(&[0xff, 0xff]).is_err());
    }
}
