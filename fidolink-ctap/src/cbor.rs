//! CBOR helpers for CTAP2 parameter and response maps
//!
//! CTAP2 bodies are CBOR (RFC 8949) maps keyed by small integers. Requests are
//! assembled with [`MapBuilder`] and responses are picked apart with
//! [`MapParser`]. Any failure is reported as a CTAP2 status so callers can
//! hand it straight back to the operation that asked.

use crate::status::{Result, StatusCode};

use std::collections::BTreeMap;

use ciborium::Value;
use serde::{Deserialize, Serialize};

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|_| StatusCode::InvalidCbor)?;
    Ok(buffer)
}

/// Decode exactly one CBOR item from `data`.
///
/// Trailing bytes after the first item are rejected.
pub fn decode_value(data: &[u8]) -> Result<Value> {
    let mut reader = data;
    let value: Value = ciborium::from_reader(&mut reader).map_err(|_| StatusCode::InvalidCbor)?;
    if !reader.is_empty() {
        return Err(StatusCode::InvalidCbor);
    }
    Ok(value)
}

/// Decode CBOR bytes to a value
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    from_value(decode_value(data)?)
}

/// Encode value to CBOR Value for manual map construction
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Value::serialized(value).map_err(|_| StatusCode::InvalidCbor)
}

/// Decode CBOR Value to typed value
pub fn from_value<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    value.deserialized().map_err(|_| StatusCode::InvalidCbor)
}

/// Build a CBOR map with integer keys
pub struct MapBuilder {
    entries: Vec<(i32, Value)>,
}

impl MapBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert an integer key and a serializable value
    pub fn insert<T: Serialize>(mut self, key: i32, value: T) -> Result<Self> {
        self.entries.push((key, to_value(&value)?));
        Ok(self)
    }

    /// Insert an optional value (only if Some)
    pub fn insert_opt<T: Serialize>(self, key: i32, value: Option<T>) -> Result<Self> {
        match value {
            Some(v) => self.insert(key, v),
            None => Ok(self),
        }
    }

    /// Insert bytes as a CBOR byte string rather than an array of integers
    pub fn insert_bytes(mut self, key: i32, bytes: &[u8]) -> Self {
        self.entries.push((key, Value::Bytes(bytes.to_vec())));
        self
    }

    /// Insert an already-built CBOR value
    pub fn insert_value(mut self, key: i32, value: Value) -> Self {
        self.entries.push((key, value));
        self
    }

    /// Build the map and encode to CBOR bytes
    pub fn build(self) -> Result<Vec<u8>> {
        encode(&self.build_value())
    }

    /// Build the map as a CBOR Value
    pub fn build_value(self) -> Value {
        let map: Vec<(Value, Value)> = self
            .entries
            .into_iter()
            .map(|(k, v)| (Value::Integer(k.into()), v))
            .collect();
        Value::Map(map)
    }
}

impl Default for MapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a CBOR map with integer keys
pub struct MapParser {
    map: BTreeMap<i128, Value>,
}

impl MapParser {
    /// Parse from CBOR bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(decode_value(data)?)
    }

    /// Parse from a borrowed CBOR Value
    pub fn from_ref(value: &Value) -> Result<Self> {
        Self::from_value(value.clone())
    }

    /// Parse from a CBOR Value
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(pairs) = value else {
            return Err(StatusCode::InvalidCbor);
        };

        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            let Value::Integer(key) = k else {
                return Err(StatusCode::InvalidCbor);
            };
            // Duplicate keys are malformed
            if map.insert(i128::from(key), v).is_some() {
                return Err(StatusCode::InvalidCbor);
            }
        }
        Ok(Self { map })
    }

    /// Get a required value by key
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<T> {
        let value = self.get_raw(key).ok_or(StatusCode::MissingParameter)?;
        from_value(value.clone())
    }

    /// Get an optional value by key
    pub fn get_opt<T: for<'de> Deserialize<'de>>(&self, key: i32) -> Result<Option<T>> {
        match self.get_raw(key) {
            Some(value) => Ok(Some(from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: i32) -> bool {
        self.map.contains_key(&(key as i128))
    }

    pub fn get_raw(&self, key: i32) -> Option<&Value> {
        self.map.get(&(key as i128))
    }

    /// Get a required CBOR byte string.
    ///
    /// `Value::Bytes` does not deserialize to `Vec<u8>` through [`get`](Self::get),
    /// so byte strings go through here.
    pub fn get_bytes(&self, key: i32) -> Result<Vec<u8>> {
        match self.get_raw(key) {
            Some(Value::Bytes(bytes)) => Ok(bytes.clone()),
            Some(_) => Err(StatusCode::InvalidCbor),
            None => Err(StatusCode::MissingParameter),
        }
    }

    /// Get an optional CBOR byte string
    pub fn get_bytes_opt(&self, key: i32) -> Result<Option<Vec<u8>>> {
        match self.get_raw(key) {
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(StatusCode::InvalidCbor),
            None => Ok(None),
        }
    }
}

/// Look up a text key in a CBOR map value
pub fn text_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Map(pairs) => pairs
            .iter()
            .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
            .map(|(_, v)| v),
        _ => None,
    }
}
