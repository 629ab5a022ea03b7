pub mod idb_read;
pub mod local_storage_write;

use std::borrow::Cow;

use serde_json::Value;

/// Value written by a benchmark: either a plain string or a structured document.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Text(s) => Value::String(s.clone()),
            Payload::Json(v) => v.clone(),
        }
    }

    /// The payload as a string value; structured payloads are serialized on every call.
    pub fn to_stored_string(&self) -> serde_json::Result<Cow<'_, str>> {
        match self {
            Payload::Text(s) => Ok(Cow::Borrowed(s)),
            Payload::Json(v) => serde_json::to_string(v).map(Cow::Owned),
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_owned())
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

pub(crate) fn doc_key(i: usize) -> String {
    format!("doc_{i}")
}
