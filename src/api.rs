use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config::{ConfigUpdate, MinipanelConfig};
use crate::constants::RESERVED_PROPERTY_KEYS;
use crate::environment::{self, EnvironmentProvider, HostEnvironment};
use crate::error::{internal_error, invalid_argument, MinipanelResult};
use crate::event::{self, Properties};
use crate::identity::IdentityManager;
use crate::people::People;
use crate::persistence::{FileStorage, MemoryStorage, Persistence, PropertyStorage};
use crate::transport::{DeliveryResult, Endpoint, HttpTransport, RequestDispatcher, Transport};

/// A Minipanel client. Cheap to clone; all clones share the same state.
///
/// Obtained from [`Minipanel::init`] or [`Minipanel::builder`] — there is no
/// process-wide singleton, the caller owns the handle.
#[derive(Clone)]
pub struct Minipanel {
    inner: Arc<MinipanelInner>,
}

struct MinipanelInner {
    token: String,
    config: Mutex<MinipanelConfig>,
    persistence: Arc<Persistence>,
    identity: IdentityManager,
    environment: Arc<dyn EnvironmentProvider>,
    dispatcher: RequestDispatcher,
}

impl fmt::Debug for Minipanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Minipanel")
            .field("token", &self.inner.token)
            .finish()
    }
}

/// Builder used to substitute the storage, environment or transport
/// collaborators. [`Minipanel::init`] covers the common case.
pub struct MinipanelBuilder {
    token: String,
    config: MinipanelConfig,
    storage: Option<Arc<dyn PropertyStorage>>,
    environment: Option<Arc<dyn EnvironmentProvider>>,
    transport: Option<Arc<dyn Transport>>,
}

impl MinipanelBuilder {
    fn new(token: String) -> Self {
        Self {
            token,
            config: MinipanelConfig::default(),
            storage: None,
            environment: None,
            transport: None,
        }
    }

    pub fn config(mut self, config: MinipanelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn PropertyStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn EnvironmentProvider>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> MinipanelResult<Minipanel> {
        if self.token.is_empty() {
            return Err(invalid_argument("project token is required"));
        }
        self.config.validate()?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => default_storage(),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(HostEnvironment));

        let storage_key = self.config.storage_key(&self.token);
        let persistence = Arc::new(Persistence::new(storage, storage_key, self.config.debug()));
        let identity = IdentityManager::new(persistence.clone());

        Ok(Minipanel {
            inner: Arc::new(MinipanelInner {
                token: self.token,
                config: Mutex::new(self.config),
                persistence,
                identity,
                environment,
                dispatcher: RequestDispatcher::new(transport),
            }),
        })
    }
}

fn default_storage() -> Arc<dyn PropertyStorage> {
    match FileStorage::default_dir() {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            // Tracking must keep working without durable storage.
            log::warn!("falling back to in-memory storage: {err}");
            Arc::new(MemoryStorage::new())
        }
    }
}

impl Minipanel {
    /// Creates a client for the given project token. An empty token is the
    /// single construction error.
    pub fn init(token: impl Into<String>, config: Option<MinipanelConfig>) -> MinipanelResult<Self> {
        let mut builder = Self::builder(token);
        if let Some(config) = config {
            builder = builder.config(config);
        }
        builder.build()
    }

    pub fn builder(token: impl Into<String>) -> MinipanelBuilder {
        MinipanelBuilder::new(token.into())
    }

    /// Tracks an event. The final property set merges environment defaults,
    /// super-properties and `properties` (later wins), then stamps `token`,
    /// `distinct_id`, `time` and a fresh `$insert_id`.
    pub async fn track(&self, event_name: &str, properties: Properties) -> DeliveryResult {
        let snapshot = self.inner.environment.snapshot();
        let defaults = environment::default_properties(&snapshot);
        let super_properties = self.inner.persistence.properties();
        let distinct_id = self.inner.identity.distinct_id();

        let payload = event::compose(
            event_name,
            defaults,
            super_properties,
            properties,
            &self.inner.token,
            &distinct_id,
        );
        let payload = serde_json::to_value(&payload)
            .map_err(|err| internal_error(format!("failed to serialize event: {err}")))?;

        let (api_host, debug) = self.config_snapshot();
        self.inner
            .dispatcher
            .send(&api_host, Endpoint::Track, &payload, debug)
            .await
    }

    /// Switches to an identified distinct id and reports the transition as a
    /// `$identify` event carrying the previous (anonymous) id. The identity
    /// mutation is applied before the network call is issued.
    pub async fn identify(&self, distinct_id: &str) -> DeliveryResult {
        let previous = self.inner.identity.identify(distinct_id)?;

        let mut properties = Properties::new();
        properties.insert("$anon_distinct_id".into(), Value::String(previous));
        properties.insert(
            "distinct_id".into(),
            Value::String(distinct_id.to_string()),
        );
        self.track("$identify", properties).await
    }

    /// Registers super-properties merged into every subsequent event.
    /// Reserved identity keys are dropped from the patch.
    pub fn register(&self, properties: Properties) {
        self.inner.persistence.register(strip_reserved(properties));
    }

    /// Like [`register`](Self::register), but existing keys keep their
    /// current value.
    pub fn register_once(&self, properties: Properties) {
        self.inner
            .persistence
            .register_once(strip_reserved(properties));
    }

    /// Removes a super-property. Reserved identity keys cannot be removed.
    pub fn unregister(&self, property: &str) {
        if RESERVED_PROPERTY_KEYS.contains(&property) {
            return;
        }
        self.inner.persistence.unregister(property);
    }

    /// Clears all persisted state and re-enters the anonymous state with a
    /// fresh device id.
    pub fn reset(&self) {
        self.inner.identity.reset();
    }

    /// The current distinct id. Never empty.
    pub fn distinct_id(&self) -> String {
        self.inner.identity.distinct_id()
    }

    /// Reads one persisted property (super-property or identity key).
    pub fn get_property(&self, property: &str) -> Option<Value> {
        self.inner.persistence.get(property)
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> MinipanelConfig {
        self.inner.config.lock().unwrap().clone()
    }

    /// Applies a runtime configuration patch.
    pub fn set_config(&self, update: ConfigUpdate) {
        let mut config = self.inner.config.lock().unwrap();
        config.apply(&update);
        self.inner.persistence.set_debug(config.debug());
    }

    /// Handle to the profile-mutation API.
    pub fn people(&self) -> People {
        People::new(self.clone())
    }

    pub(crate) fn token(&self) -> &str {
        &self.inner.token
    }

    pub(crate) fn current_distinct_id(&self) -> Option<String> {
        self.inner.identity.current_distinct_id()
    }

    pub(crate) async fn send_engage(&self, payload: &Value) -> DeliveryResult {
        let (api_host, debug) = self.config_snapshot();
        self.inner
            .dispatcher
            .send(&api_host, Endpoint::Engage, payload, debug)
            .await
    }

    fn config_snapshot(&self) -> (String, bool) {
        let config = self.inner.config.lock().unwrap();
        (config.api_host().to_string(), config.debug())
    }

    #[cfg(test)]
    pub(crate) fn clear_identity_for_tests(&self) {
        self.inner.persistence.unregister("distinct_id");
    }
}

fn strip_reserved(mut properties: Properties) -> Properties {
    for key in RESERVED_PROPERTY_KEYS {
        properties.remove(key);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{decode_payload, test_client};
    use crate::transport::DeliveryAck;
    use serde_json::json;

    fn props(entries: &[(&str, Value)]) -> Properties {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn init_requires_a_token() {
        let err = Minipanel::init("", None).unwrap_err();
        assert_eq!(err.code_str(), "minipanel/invalid-argument");
    }

    #[test]
    fn register_overwrites_and_register_once_does_not() {
        let (client, _) = test_client("T");

        client.register(props(&[("plan", json!("free"))]));
        client.register(props(&[("plan", json!("pro"))]));
        assert_eq!(client.get_property("plan"), Some(json!("pro")));

        client.register_once(props(&[("source", json!("ad"))]));
        client.register_once(props(&[("source", json!("organic"))]));
        assert_eq!(client.get_property("source"), Some(json!("ad")));
    }

    #[test]
    fn reserved_keys_survive_caller_registration() {
        let (client, _) = test_client("T");
        let device_distinct = client.distinct_id();

        client.register(props(&[
            ("distinct_id", json!("spoofed")),
            ("$device_id", json!("spoofed")),
            ("$user_id", json!("spoofed")),
            ("plan", json!("pro")),
        ]));
        assert_eq!(client.distinct_id(), device_distinct);
        assert_eq!(client.get_property("plan"), Some(json!("pro")));
        assert_ne!(client.get_property("$device_id"), Some(json!("spoofed")));

        client.unregister("distinct_id");
        assert_eq!(client.distinct_id(), device_distinct);
    }

    #[test]
    fn distinct_id_is_stable_between_reads() {
        let (client, _) = test_client("T");
        let first = client.distinct_id();
        assert!(first.starts_with("$device:"));
        assert_eq!(client.distinct_id(), first);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reset_abandons_both_identities() {
        let (client, _) = test_client("T");
        let anon = client.distinct_id();
        client.identify("user-X").await.unwrap();

        client.reset();
        let fresh = client.distinct_id();
        assert_ne!(fresh, "user-X");
        assert_ne!(fresh, anon);
        assert!(fresh.starts_with("$device:"));
        // Super-properties are gone too.
        assert_eq!(client.get_property("$user_id"), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn anonymous_to_identified_flow() {
        let (client, transport) = test_client("T");
        assert!(client.distinct_id().starts_with("$device:"));

        client.register(props(&[("plan", json!("pro"))]));

        let ack = client.track("Page View", Properties::new()).await.unwrap();
        assert_eq!(ack, DeliveryAck { status: 1 });

        client.identify("u-42").await.unwrap();
        assert_eq!(client.distinct_id(), "u-42");

        client.track("Login", Properties::new()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3); // Page View, $identify, Login
        assert!(requests.iter().all(|(url, _)| url.ends_with("/track/")));

        let login = decode_payload(&requests[2].1);
        assert_eq!(login["event"], json!("Login"));
        assert_eq!(login["properties"]["plan"], json!("pro"));
        assert_eq!(login["properties"]["distinct_id"], json!("u-42"));
        assert_eq!(login["properties"]["token"], json!("T"));
        assert!(login["properties"]["time"].is_f64());
        assert!(login["properties"]["$insert_id"].is_string());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn identify_reports_the_previous_anonymous_id() {
        let (client, transport) = test_client("T");
        let anon = client.distinct_id();

        client.identify("u-42").await.unwrap();

        let payload = decode_payload(&transport.requests()[0].1);
        assert_eq!(payload["event"], json!("$identify"));
        assert_eq!(payload["properties"]["$anon_distinct_id"], json!(anon));
        assert_eq!(payload["properties"]["distinct_id"], json!("u-42"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn identify_rejects_an_empty_id_without_a_request() {
        let (client, transport) = test_client("T");
        let err = client.identify("").await.unwrap_err();
        assert_eq!(err.code_str(), "minipanel/invalid-argument");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn caller_properties_beat_super_properties() {
        let (client, transport) = test_client("T");
        client.register(props(&[("plan", json!("free"))]));

        client
            .track("Upgrade", props(&[("plan", json!("pro"))]))
            .await
            .unwrap();

        let payload = decode_payload(&transport.requests()[0].1);
        assert_eq!(payload["properties"]["plan"], json!("pro"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unregistered_properties_stop_flowing() {
        let (client, transport) = test_client("T");
        client.register(props(&[("plan", json!("pro"))]));
        client.unregister("plan");

        client.track("Page View", Properties::new()).await.unwrap();

        let payload = decode_payload(&transport.requests()[0].1);
        assert!(payload["properties"].get("plan").is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejection_surfaces_through_the_result() {
        let (client, transport) = test_client("T");
        transport.set_response(Ok("0".to_string()));

        let err = client.track("Page View", Properties::new()).await.unwrap_err();
        assert_eq!(err.code_str(), "minipanel/rejected");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn set_config_redirects_subsequent_requests() {
        let (client, transport) = test_client("T");
        client.set_config(ConfigUpdate::new().with_api_host("https://proxy.example.net/"));

        client.track("Page View", Properties::new()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].0, "https://proxy.example.net/track/");
        assert_eq!(client.config().api_host(), "https://proxy.example.net");
    }
}
