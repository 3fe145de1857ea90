//! Session options
//!
//! An opaque key/value mapping scoping a single connection attempt. The
//! client never inspects the contents; the whole map is handed to the
//! session engine, which owns the option contract (server choice, codec
//! preferences and so on).

use std::collections::BTreeMap;

use serde::Serialize;

/// Options for one `connect` attempt.
///
/// Created at connect time, held for the duration of the session, discarded
/// on disconnect. Serializes as a plain JSON object so engines can pass it
/// through to their rendezvous service verbatim.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SessionOptions(BTreeMap<String, serde_json::Value>);

impl SessionOptions {
    pub fn new() -> SessionOptions {
        SessionOptions::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}
