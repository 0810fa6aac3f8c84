//! Events and the records that carry them through a pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A structured document addressed by field paths.
///
/// Paths use `/` or `.` as separators and may start with a leading `/`, so
/// `/trace/id`, `trace/id` and `trace.id` all address the same field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    event_type: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    data: Value,
}

impl Event {
    /// Creates an empty event of the given type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            attributes: Map::new(),
            data: Value::Object(Map::new()),
        }
    }

    /// Creates an event whose body is `data`. Non-object bodies are wrapped
    /// under a `message` field.
    pub fn from_value(event_type: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(_) => data,
            other => {
                let mut map = Map::new();
                map.insert("message".to_string(), other);
                Value::Object(map)
            }
        };
        Self {
            event_type: event_type.into(),
            attributes: Map::new(),
            data,
        }
    }

    pub(crate) fn from_parts(event_type: String, attributes: Map<String, Value>, data: Value) -> Self {
        Self {
            event_type,
            attributes,
            data,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        segments(path).try_fold(&self.data, |value, segment| value.as_object()?.get(segment))
    }

    /// Returns the field as a string. Strings are returned verbatim, other
    /// values in their JSON form; `null` counts as absent.
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Sets a field, creating intermediate objects and replacing non-object
    /// values that sit in the way.
    pub fn put(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };

        let mut current = &mut self.data;
        for segment in parents {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert(last.to_string(), value);
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '.']).filter(|s| !s.is_empty())
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// A unit of pipeline data: an event plus provenance metadata.
///
/// The metadata is only used by the pipeline for acknowledgement and is
/// never inspected or forwarded to peers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub data: Event,
    pub metadata: BTreeMap<String, String>,
}

impl Record {
    pub fn new(data: Event) -> Self {
        Self {
            data,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        Record::new(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_separators_are_interchangeable() {
        let event = Event::from_value("trace", json!({"trace": {"id": "abc"}}));
        assert_eq!(event.get_string("/trace/id"), Some("abc".to_string()));
        assert_eq!(event.get_string("trace/id"), Some("abc".to_string()));
        assert_eq!(event.get_string("trace.id"), Some("abc".to_string()));
        assert_eq!(event.get("trace/missing"), None);
    }

    #[test]
    fn non_strings_are_stringified() {
        let event = Event::from_value(
            "log",
            json!({"status": 404, "ok": false, "tags": ["a"], "gone": null}),
        );
        assert_eq!(event.get_string("status"), Some("404".to_string()));
        assert_eq!(event.get_string("ok"), Some("false".to_string()));
        assert_eq!(event.get_string("tags"), Some("[\"a\"]".to_string()));
        assert_eq!(event.get_string("gone"), None);
    }

    #[test]
    fn put_creates_nested_objects() {
        let mut event = Event::new("log");
        event.put("/http/response/status", json!(200));
        event.put("http.method", json!("GET"));
        assert_eq!(event.data(), &json!({"http": {"response": {"status": 200}, "method": "GET"}}));

        // Scalars in the way are replaced.
        event.put("http/method/verb", json!("POST"));
        assert_eq!(event.get_string("http/method/verb"), Some("POST".to_string()));
    }

    #[test]
    fn scalar_bodies_are_wrapped() {
        let event = Event::from_value("log", json!("plain line"));
        assert_eq!(event.get_string("message"), Some("plain line".to_string()));
    }
}
