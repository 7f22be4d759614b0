//! Opaque pagination cursors
//!
//! A cursor is the store's last evaluated key as canonical JSON, base64url encoded.
//! Only round-trip fidelity is promised; callers must not rely on the byte layout.
//! Every key attribute of the table is a string, and cursors carry string values only:
//! numbers would pass through JSON floats and could come back with different digits.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};
use crate::store::Item;

/// Encodes a last evaluated key into an opaque cursor
///
/// # Errors
///
/// Returns `StorageError::SerializationError` if the key holds a value that is not a
/// string
pub fn encode(key: &Item) -> StorageResult<String> {
    if let Some((name, _)) = key.iter().find(|(_, value)| !value.is_s()) {
        return Err(StorageError::SerializationError(format!(
            "key attribute {name} is not a string"
        )));
    }

    let json: Map<String, Value> = serde_dynamo::from_item(key.clone())?;
    let bytes =
        serde_json::to_vec(&json).map_err(|e| StorageError::SerializationError(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Decodes a cursor back into the key it was issued for
///
/// Stale cursors decode fine; the store rejects them when they are used.
///
/// # Errors
///
/// Returns `StorageError::MalformedCursor` unless the cursor holds a non-empty JSON
/// object whose values are strings
pub fn decode(cursor: &str) -> StorageResult<Item> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| StorageError::MalformedCursor(format!("invalid encoding: {e}")))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::MalformedCursor(format!("invalid JSON: {e}")))?;

    let Value::Object(key) = value else {
        return Err(StorageError::MalformedCursor(
            "cursor is not a key object".to_string(),
        ));
    };

    if key.is_empty() {
        return Err(StorageError::MalformedCursor("cursor key is empty".to_string()));
    }

    if let Some((name, _)) = key
        .iter()
        .find(|(_, value)| !value.is_string())
    {
        return Err(StorageError::MalformedCursor(format!(
            "attribute {name} is not a key value"
        )));
    }

    serde_dynamo::to_item(key).map_err(|e| StorageError::MalformedCursor(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use aws_sdk_dynamodb::types::AttributeValue;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::StorageErrorKind;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn raw_cursor(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    #[test]
    fn test_round_trip_primary_key() {
        let key = HashMap::from([
            ("partitionKey".to_string(), s("TEAM#1")),
            ("sortKey".to_string(), s("USER#2")),
        ]);

        let cursor = encode(&key).unwrap();
        assert_eq!(decode(&cursor).unwrap(), key);
    }

    #[test]
    fn test_round_trip_index_key() {
        let key = HashMap::from([
            ("partitionKey".to_string(), s("TEAM#1")),
            ("sortKey".to_string(), s("USER#2")),
            ("indexOnePartitionKey".to_string(), s("USER#2")),
            (
                "indexOneSortKey".to_string(),
                s("TEAM_MEMBERSHIP#2024-01-01T00:00:00.000Z"),
            ),
        ]);

        let cursor = encode(&key).unwrap();
        assert_eq!(decode(&cursor).unwrap(), key);
    }

    #[test]
    fn test_number_values_are_refused() {
        let key = HashMap::from([
            ("partitionKey".to_string(), s("TEAM#1")),
            ("position".to_string(), AttributeValue::N("1.50".to_string())),
        ]);
        let err = encode(&key).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Serialization);

        let err = decode(&raw_cursor(r#"{"partitionKey":"TEAM#1","position":1.50}"#)).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::MalformedCursor);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let key = HashMap::from([("partitionKey".to_string(), s("?>>?/+=="))]);
        let cursor = encode(&key).unwrap();

        assert!(cursor
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_encoding_is_canonical() {
        let first = HashMap::from([
            ("sortKey".to_string(), s("b")),
            ("partitionKey".to_string(), s("a")),
        ]);
        let second = HashMap::from([
            ("partitionKey".to_string(), s("a")),
            ("sortKey".to_string(), s("b")),
        ]);

        assert_eq!(encode(&first).unwrap(), encode(&second).unwrap());
    }

    #[test]
    fn test_rejects_non_object_values() {
        for json in ["[1,2,3]", "null", "42", "\"partitionKey\"", "true"] {
            let err = decode(&raw_cursor(json)).unwrap_err();
            assert_eq!(err.kind(), StorageErrorKind::MalformedCursor, "{json}");
        }
    }

    #[test]
    fn test_rejects_empty_and_nested_objects() {
        for json in ["{}", r#"{"partitionKey":{"S":"x"}}"#, r#"{"sortKey":[1]}"#] {
            let err = decode(&raw_cursor(json)).unwrap_err();
            assert_eq!(err.kind(), StorageErrorKind::MalformedCursor, "{json}");
        }
    }

    #[test]
    fn test_rejects_garbage() {
        let err = decode("not a cursor!").unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::MalformedCursor);

        let err = decode(&raw_cursor("{\"partitionKey\":")).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::MalformedCursor);
    }
}
