//! Wire encoding of forwarded batches.
//!
//! A batch travels as one JSON document naming the pipeline and plugin it is
//! destined for. Record metadata stays on the sending node.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::event::{Event, Record};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub event_type: String,
    #[serde(default)]
    pub event_attributes: Map<String, Value>,
    pub event_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvents {
    pub events: Vec<WireEvent>,
    pub destination_plugin_id: String,
    pub destination_pipeline_name: String,
}

impl WireEvents {
    pub fn into_records(self) -> Vec<Record> {
        self.events
            .into_iter()
            .map(|e| Record::new(Event::from_parts(e.event_type, e.event_attributes, e.event_data)))
            .collect()
    }
}

pub fn encode(records: &[Record], pipeline_name: &str, plugin_id: &str) -> Result<Bytes, CodecError> {
    let wire = WireEvents {
        events: records
            .iter()
            .map(|r| WireEvent {
                event_type: r.data.event_type().to_string(),
                event_attributes: r.data.attributes().clone(),
                event_data: r.data.data().clone(),
            })
            .collect(),
        destination_plugin_id: plugin_id.to_string(),
        destination_pipeline_name: pipeline_name.to_string(),
    };
    serde_json::to_vec(&wire).map(Bytes::from).map_err(CodecError::Encode)
}

pub fn decode(payload: &[u8]) -> Result<WireEvents, CodecError> {
    serde_json::from_slice(payload).map_err(CodecError::Decode)
}
