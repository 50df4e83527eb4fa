//! Test utilities shared across crate-level unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::api::Minipanel;
use crate::config::MinipanelConfig;
use crate::error::MinipanelResult;
use crate::persistence::MemoryStorage;
use crate::transport::Transport;

/// Transport that records every request and answers with a canned response
/// (`"1"` unless overridden).
pub struct RecordingTransport {
    requests: Mutex<Vec<(String, String)>>,
    response: Mutex<MinipanelResult<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new(Ok("1".to_string())),
        })
    }

    pub fn set_response(&self, response: MinipanelResult<String>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post_form(&self, url: &str, body: String) -> MinipanelResult<String> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), body));
        self.response.lock().unwrap().clone()
    }
}

/// Decodes a `data=<base64 of JSON>` form body back into the JSON payload.
pub fn decode_payload(body: &str) -> Value {
    let encoded = body.strip_prefix("data=").expect("form body");
    let decoded = percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .expect("percent decoding");
    let bytes = STANDARD.decode(decoded.as_bytes()).expect("base64");
    serde_json::from_slice(&bytes).expect("JSON payload")
}

/// A client over in-memory storage and a recording transport.
pub fn test_client(token: &str) -> (Minipanel, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let client = Minipanel::builder(token)
        .config(MinipanelConfig::default().with_api_host("https://api.example.com"))
        .storage(Arc::new(MemoryStorage::new()))
        .transport(transport.clone())
        .build()
        .expect("test client");
    (client, transport)
}
