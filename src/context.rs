//! Key-derivation contexts.
//!
//! A [`DerivationContext`] is the arbitrary mapping an encryption provider
//! turns into a key. Re-deriving at decrypt time only works if the same
//! mapping always serializes to the same bytes, so serialization is
//! canonical: object keys are sorted at every depth and the output is
//! compact JSON. Insertion order never affects the derived key.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, VaultError};

/// An order-independent mapping from names to JSON-representable values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationContext {
    entries: BTreeMap<String, Value>,
}

impl DerivationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from any value that serializes to a JSON object.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        match to_value(value)? {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => Err(VaultError::KeyDerivation(format!(
                "context must be a map, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Insert or replace one entry.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.entries.insert(key.into(), to_value(value)?);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Insert an already-canonical JSON document, e.g. a stored policy
    /// snapshot. Fails if `json` does not parse.
    pub fn insert_json(&mut self, key: impl Into<String>, json: &str) -> Result<()> {
        let value = serde_json::from_str(json)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
        self.entries.insert(key.into(), value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The canonical byte encoding fed to key derivation.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let root: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), canonicalize(v)))
            .collect();
        serde_json::to_vec(&Value::Object(root)).map_err(|e| VaultError::KeyDerivation(e.to_string()))
    }
}

/// Serialize any value to its canonical JSON string.
pub(crate) fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = canonicalize(&to_value(value)?);
    serde_json::to_string(&value).map_err(|e| VaultError::KeyDerivation(e.to_string()))
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| VaultError::KeyDerivation(e.to_string()))
}

/// Rebuild `value` with every object's keys in sorted order. Does not rely
/// on `serde_json`'s map type, which preserves insertion order when the
/// `preserve_order` feature is enabled anywhere in the build.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
