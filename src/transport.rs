//! Wire encoding and transmission of tracking payloads.
//!
//! A payload travels as `data=<base64 of JSON>` in a form-encoded POST body;
//! POST is used instead of GET specifically to avoid URL-length ceilings.
//! The collector acknowledges with a literal `1` (or `"1"`) body; anything
//! else is a failure. Nothing here panics: every failure surfaces through
//! the returned [`DeliveryResult`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

use crate::constants::{LIB_NAME, LIB_VERSION, MAX_STRING_LENGTH};
use crate::error::{internal_error, network_error, rejected, MinipanelError, MinipanelResult};

/// Collection endpoints understood by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Event ingestion.
    Track,
    /// Profile (people) mutations.
    Engage,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Track => "/track",
            Endpoint::Engage => "/engage",
        }
    }
}

/// Acknowledgement from the collector. `status` is always `1`, preserving
/// the success shape of the upstream wire contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryAck {
    pub status: u32,
}

/// Outcome of one delivery attempt. Awaiting the future that yields this is
/// the completion callback of the contract: failures are values, never
/// panics, and two in-flight deliveries may complete in any order.
pub type DeliveryResult = Result<DeliveryAck, MinipanelError>;

/// The network seam. Tests substitute a recording implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs a form-encoded body and returns the response text.
    async fn post_form(&self, url: &str, body: String) -> MinipanelResult<String>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> MinipanelResult<Self> {
        let http = Client::builder()
            .user_agent(format!("{LIB_NAME}/{LIB_VERSION}"))
            .build()
            .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, body: String) -> MinipanelResult<String> {
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|err| network_error(format!("request to {url} failed: {err}")))?;

        response
            .text()
            .await
            .map_err(|err| network_error(format!("failed to read response from {url}: {err}")))
    }
}

pub(crate) struct RequestDispatcher {
    transport: std::sync::Arc<dyn Transport>,
}

impl RequestDispatcher {
    pub fn new(transport: std::sync::Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Truncates, serializes, encodes and transmits `payload` to
    /// `<api_host><endpoint>/`.
    pub async fn send(
        &self,
        api_host: &str,
        endpoint: Endpoint,
        payload: &Value,
        debug: bool,
    ) -> DeliveryResult {
        let truncated = truncate_strings(payload, MAX_STRING_LENGTH);
        let body = encode_form_body(&truncated)?;
        let url = format!("{api_host}{}/", endpoint.path());

        if debug {
            log::debug!("sending {} payload: {}", endpoint.path(), truncated);
        }

        let text = match self.transport.post_form(&url, body).await {
            Ok(text) => text,
            Err(err) => {
                if debug {
                    log::warn!("request to {url} failed: {err}");
                }
                return Err(err);
            }
        };

        if text == "1" || text == "\"1\"" {
            Ok(DeliveryAck { status: 1 })
        } else {
            if debug {
                log::warn!("collector rejected {} payload: {}", endpoint.path(), text);
            }
            Err(rejected(format!("collector responded with '{text}'")))
        }
    }
}

/// Characters escaped the way `encodeURIComponent` escapes them.
const FORM_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_form_body(payload: &Value) -> MinipanelResult<String> {
    let json = serde_json::to_string(payload)
        .map_err(|err| internal_error(format!("failed to serialize payload: {err}")))?;
    let encoded = STANDARD.encode(json);
    Ok(format!("data={}", utf8_percent_encode(&encoded, FORM_COMPONENT)))
}

/// Recursively truncates every string value to `limit` characters. Arrays
/// and objects are traversed; everything else passes through unchanged.
pub(crate) fn truncate_strings(value: &Value, limit: usize) -> Value {
    match value {
        Value::String(text) => Value::String(text.chars().take(limit).collect()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| truncate_strings(item, limit))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, item)| (key.clone(), truncate_strings(item, limit)))
                .collect(),
        ),
        other => other.clone(),
    }
}
