//! Interception reply documents (`INTERCEPTION_RESULT:` payloads).
//!
//! A reply is a JSON document:
//!
//! ```json
//! {
//!   "event": "Interceptor",
//!   "request": 7,
//!   "params": { "entries": [ { "key": "arg0", "value": "99" } ] }
//! }
//! ```
//!
//! Controllers written against Unity's `JsonUtility` send the same shape with
//! `mEvent`/`mParams`/`mEntries`/`mKey`/`mValue` field names, and some send
//! capitalised names; all three spellings are accepted. `params` may also be
//! a flat object (`{"arg0": "99"}`).
//!
//! An empty payload or the literal `null` decodes to `None`: an explicit veto.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::ProtocolError;

/// A controller's answer to one blocking interception.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptionReply {
    event: Option<String>,
    request: Option<u64>,
    params: HashMap<String, String>,
}

impl InterceptionReply {
    /// A reply with no overrides (lets the call proceed unchanged).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter override (builder style).
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Tag the reply with the request id it answers (builder style).
    #[must_use]
    pub fn for_request(mut self, request: u64) -> Self {
        self.request = Some(request);
        self
    }

    /// Event name the controller echoed back, if any.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Request id this reply answers, if the controller sent one.
    pub fn request(&self) -> Option<u64> {
        self.request
    }

    /// All parameter overrides.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Override for the positional argument at `index` (key `arg<index>`).
    pub fn override_for(&self, index: usize) -> Option<&str> {
        self.params.get(&format!("arg{index}")).map(String::as_str)
    }

    /// Decode an `INTERCEPTION_RESULT:` payload.
    ///
    /// Returns `Ok(None)` for an empty payload or `null` (explicit veto).
    pub fn parse_payload(payload: &str) -> Result<Option<Self>, ProtocolError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(None);
        }
        let document: Option<ReplyDocument> = serde_json::from_str(payload)?;
        Ok(document.map(Self::from))
    }
}

#[derive(Debug, Deserialize)]
struct ReplyDocument {
    #[serde(default, alias = "Event", alias = "mEvent", alias = "m_event")]
    event: Option<String>,
    #[serde(default, alias = "Request", alias = "requestId")]
    request: Option<u64>,
    #[serde(default, alias = "Params", alias = "mParams", alias = "m_params")]
    params: Option<ParamsDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamsDocument {
    Entries(EntriesDocument),
    Flat(serde_json::Map<String, Value>),
}

#[derive(Debug, Deserialize)]
struct EntriesDocument {
    #[serde(alias = "Entries", alias = "mEntries", alias = "m_entries")]
    entries: Vec<ParamEntry>,
}

#[derive(Debug, Deserialize)]
struct ParamEntry {
    #[serde(alias = "Key", alias = "mKey", alias = "m_key")]
    key: String,
    #[serde(default, alias = "Value", alias = "mValue", alias = "m_value")]
    value: Value,
}

impl From<ReplyDocument> for InterceptionReply {
    fn from(document: ReplyDocument) -> Self {
        let params = match document.params {
            Some(ParamsDocument::Entries(doc)) => doc
                .entries
                .into_iter()
                .filter_map(|entry| leaf_string(entry.value).map(|v| (entry.key, v)))
                .collect(),
            Some(ParamsDocument::Flat(map)) => map
                .into_iter()
                .filter_map(|(key, value)| leaf_string(value).map(|v| (key, v)))
                .collect(),
            None => HashMap::new(),
        };
        Self {
            event: document.event,
            request: document.request,
            params,
        }
    }
}

/// Leaf values are strings on the wire; other scalars are stringified and
/// nulls dropped.
fn leaf_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
