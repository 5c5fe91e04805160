//! Ordered YAML document model.
//!
//! The base configuration and every fragment's primary entry are parsed into a
//! [`Document`]: a top-level mapping that keeps its key order on round trip.
//! Generation only ever replaces whole top-level keys, so nothing below the
//! top level is interpreted.

use serde_yaml_ng::{Mapping, Sequence, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("{0}")]
    Parse(#[source] serde_yaml_ng::Error),

    #[error("expected a mapping at the top level, found {found}")]
    NotMapping { found: &'static str },

    #[error("serializing document: {0}")]
    Serialize(#[source] serde_yaml_ng::Error),
}

/// A YAML mapping with string keys at the top level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Mapping,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML text. An empty (or all-comment) document is an empty mapping.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml_ng::from_str(text).map_err(DocumentError::Parse)?;
        match value {
            Value::Null => Ok(Self::new()),
            Value::Mapping(root) => Ok(Self { root }),
            other => Err(DocumentError::NotMapping {
                found: kind_name(&other),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// The value under `key` if it is a sequence.
    pub fn sequence(&self, key: &str) -> Option<&Sequence> {
        self.get(key).and_then(Value::as_sequence)
    }

    /// Set `key`, replacing any previous value in place (its position is kept).
    pub fn set(&mut self, key: &str, value: Value) {
        self.root.insert(Value::String(key.to_string()), value);
    }

    pub fn set_sequence(&mut self, key: &str, items: Sequence) {
        self.set(key, Value::Sequence(items));
    }

    /// Top-level keys in document order. Non-string keys are skipped.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().filter_map(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        serde_yaml_ng::to_string(&self.root).map_err(DocumentError::Serialize)
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
