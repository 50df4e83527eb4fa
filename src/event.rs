//! Event property composition.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::util::{epoch_seconds, generate_insert_id};

/// An open property bag, keyed by property name.
pub type Properties = Map<String, Value>;

/// A fully composed tracking payload, ready for the wire.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct EventPayload {
    pub event: String,
    pub properties: Properties,
}

/// Assembles the final property set for an event. Merge order is strict and
/// later steps win on key collision: environment defaults, then
/// super-properties, then caller properties, then the non-negotiable fields
/// (`token`, `distinct_id`, `time`, a fresh `$insert_id`).
pub(crate) fn compose(
    event_name: &str,
    defaults: Properties,
    super_properties: Properties,
    caller_properties: Properties,
    token: &str,
    distinct_id: &str,
) -> EventPayload {
    let mut properties = defaults;
    for (key, value) in super_properties {
        properties.insert(key, value);
    }
    for (key, value) in caller_properties {
        properties.insert(key, value);
    }

    properties.insert("token".into(), Value::String(token.to_string()));
    properties.insert("distinct_id".into(), Value::String(distinct_id.to_string()));
    properties.insert("time".into(), serde_json::json!(epoch_seconds()));
    properties.insert(
        "$insert_id".into(),
        Value::String(generate_insert_id()),
    );

    EventPayload {
        event: event_name.to_string(),
        properties,
    }
}
