//! Profile (people) mutations: `$set`, `$set_once`, `$unset`, `$add` and
//! charge tracking, all routed to the `/engage` endpoint.
//!
//! Every mutation requires a current distinct id; without one the operation
//! fails before any network contact. The JS SDK's dual-shape overloads
//! (`set(prop, to)` vs `set(props)`) become explicit paired entry points.

use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};

use crate::api::Minipanel;
use crate::error::{invalid_amount, missing_identity, MinipanelResult};
use crate::event::Properties;
use crate::transport::DeliveryResult;

/// Handle to the profile-mutation API, obtained from
/// [`Minipanel::people`].
#[derive(Clone)]
pub struct People {
    client: Minipanel,
}

impl People {
    pub(crate) fn new(client: Minipanel) -> Self {
        Self { client }
    }

    /// Sets profile properties, overwriting existing values.
    pub async fn set(&self, properties: Properties) -> DeliveryResult {
        let payload = self.mutation_payload("$set", Value::Object(properties))?;
        self.client.send_engage(&payload).await
    }

    /// Single-property form of [`set`](Self::set).
    pub async fn set_one(&self, property: &str, value: impl Into<Value>) -> DeliveryResult {
        self.set(single(property, value.into())).await
    }

    /// Sets profile properties only if they are not already set.
    pub async fn set_once(&self, properties: Properties) -> DeliveryResult {
        let payload = self.mutation_payload("$set_once", Value::Object(properties))?;
        self.client.send_engage(&payload).await
    }

    /// Single-property form of [`set_once`](Self::set_once).
    pub async fn set_once_one(&self, property: &str, value: impl Into<Value>) -> DeliveryResult {
        self.set_once(single(property, value.into())).await
    }

    /// Removes properties from the profile.
    pub async fn unset(&self, properties: Vec<String>) -> DeliveryResult {
        let names = properties.into_iter().map(Value::String).collect();
        let payload = self.mutation_payload("$unset", Value::Array(names))?;
        self.client.send_engage(&payload).await
    }

    /// Single-property form of [`unset`](Self::unset).
    pub async fn unset_one(&self, property: &str) -> DeliveryResult {
        self.unset(vec![property.to_string()]).await
    }

    /// Adds the given deltas to numeric profile properties.
    pub async fn increment(&self, counts: Properties) -> DeliveryResult {
        let payload = self.mutation_payload("$add", Value::Object(counts))?;
        self.client.send_engage(&payload).await
    }

    /// Increments one property by `by`. Pass `1.0` for the conventional
    /// single-step increment.
    pub async fn increment_one(&self, property: &str, by: f64) -> DeliveryResult {
        self.increment(single(property, Value::from(by))).await
    }

    /// Appends a transaction to the profile's `$transactions` list. The
    /// amount is validated before any network contact; a numeric `$time`
    /// property is interpreted as epoch seconds and converted to an
    /// ISO-8601 string.
    pub async fn track_charge(
        &self,
        amount: impl Into<ChargeAmount>,
        properties: Properties,
    ) -> DeliveryResult {
        let distinct_id = self.require_distinct_id()?;
        let amount = amount.into().resolve()?;

        let mut transaction = properties;
        transaction.insert("$amount".into(), Value::from(amount));
        if let Some(time) = transaction.get("$time").and_then(Value::as_f64) {
            if let Some(iso) = epoch_to_iso8601(time) {
                transaction.insert("$time".into(), Value::String(iso));
            }
        }

        let mut append = Map::new();
        append.insert("$transactions".into(), Value::Object(transaction));
        let payload = self.payload_for(distinct_id, "$append", Value::Object(append));
        self.client.send_engage(&payload).await
    }

    fn mutation_payload(&self, operation: &str, value: Value) -> MinipanelResult<Value> {
        let distinct_id = self.require_distinct_id()?;
        Ok(self.payload_for(distinct_id, operation, value))
    }

    fn payload_for(&self, distinct_id: String, operation: &str, value: Value) -> Value {
        let mut payload = Map::new();
        payload.insert(operation.to_string(), value);
        payload.insert(
            "$token".into(),
            Value::String(self.client.token().to_string()),
        );
        payload.insert("$distinct_id".into(), Value::String(distinct_id));
        Value::Object(payload)
    }

    fn require_distinct_id(&self) -> MinipanelResult<String> {
        self.client
            .current_distinct_id()
            .ok_or_else(|| missing_identity("profile mutation requires a distinct_id"))
    }
}

/// A charge amount: either numeric or text to be parsed. Unparseable text
/// and non-finite values fail validation.
#[derive(Clone, Debug, PartialEq)]
pub enum ChargeAmount {
    Number(f64),
    Text(String),
}

impl ChargeAmount {
    pub(crate) fn resolve(&self) -> MinipanelResult<f64> {
        let amount = match self {
            ChargeAmount::Number(amount) => *amount,
            ChargeAmount::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid_amount(format!("cannot parse charge amount '{text}'")))?,
        };
        if amount.is_finite() {
            Ok(amount)
        } else {
            Err(invalid_amount("charge amount must be finite"))
        }
    }
}

impl From<f64> for ChargeAmount {
    fn from(amount: f64) -> Self {
        ChargeAmount::Number(amount)
    }
}

impl From<i64> for ChargeAmount {
    fn from(amount: i64) -> Self {
        ChargeAmount::Number(amount as f64)
    }
}

impl From<&str> for ChargeAmount {
    fn from(amount: &str) -> Self {
        ChargeAmount::Text(amount.to_string())
    }
}

impl From<String> for ChargeAmount {
    fn from(amount: String) -> Self {
        ChargeAmount::Text(amount)
    }
}

fn single(property: &str, value: Value) -> Properties {
    let mut bag = Map::new();
    bag.insert(property.to_string(), value);
    bag
}

fn epoch_to_iso8601(epoch_seconds: f64) -> Option<String> {
    let seconds = epoch_seconds.trunc() as i64;
    let nanos = (epoch_seconds.fract() * 1_000_000_000.0) as u32;
    let time = DateTime::from_timestamp(seconds, nanos)?;
    Some(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
