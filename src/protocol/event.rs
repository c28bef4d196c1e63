//! Outbound event records.

use std::fmt::Write as _;

/// A named, ordered set of key/value fields describing one observed
/// occurrence.
///
/// Values are stored already stringified; field order is insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    name: String,
    fields: Vec<(String, String)>,
}

impl EventRecord {
    /// Create an empty record with the given event name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style).
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a field.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.fields.push((key.into(), value.to_string()));
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the wire format.
    ///
    /// ```text
    /// Event: <name>
    /// <key>: <value>
    /// ---
    /// ```
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(32 + self.fields.len() * 24);
        let _ = writeln!(out, "Event: {}", self.name);
        for (key, value) in &self.fields {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push_str("---\n");
        out
    }
}

/// Render a list of values as `[a, b, c]`.
pub fn render_list<T: std::fmt::Display>(items: &[T]) -> String {
    let mut out = String::from("[");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{item}");
    }
    out.push(']');
    out
}
