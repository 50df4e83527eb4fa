use url::Url;

use crate::constants::{DEFAULT_API_HOST, STORAGE_KEY_PREFIX};
use crate::error::{invalid_argument, MinipanelResult};

/// Construction-time configuration for a [`Minipanel`](crate::Minipanel) client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinipanelConfig {
    api_host: String,
    debug: bool,
    persistence_name: Option<String>,
}

impl Default for MinipanelConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            debug: false,
            persistence_name: None,
        }
    }
}

impl MinipanelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the collection endpoint host, e.g. for a proxy or a mock
    /// server in tests. A trailing slash is stripped so endpoint paths can be
    /// appended verbatim.
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        let host = api_host.into();
        self.api_host = host.trim_end_matches('/').to_string();
        self
    }

    /// Enables diagnostic logging of requests and swallowed storage failures.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overrides the storage key the persisted property bag lives under.
    /// Defaults to `"mon_" + token`.
    pub fn with_persistence_name(mut self, name: impl Into<String>) -> Self {
        self.persistence_name = Some(name.into());
        self
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn persistence_name(&self) -> Option<&str> {
        self.persistence_name.as_deref()
    }

    pub(crate) fn validate(&self) -> MinipanelResult<()> {
        Url::parse(&self.api_host)
            .map_err(|err| invalid_argument(format!("invalid api_host '{}': {}", self.api_host, err)))?;
        Ok(())
    }

    pub(crate) fn storage_key(&self, token: &str) -> String {
        match &self.persistence_name {
            Some(name) => name.clone(),
            None => format!("{STORAGE_KEY_PREFIX}{token}"),
        }
    }

    pub(crate) fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(api_host) = &update.api_host {
            self.api_host = api_host.trim_end_matches('/').to_string();
        }
        if let Some(debug) = update.debug {
            self.debug = debug;
        }
    }
}

/// Runtime configuration patch applied through
/// [`Minipanel::set_config`](crate::Minipanel::set_config). Unset fields keep
/// their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub api_host: Option<String>,
    pub debug: Option<bool>,
}

impl ConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = Some(api_host.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }
}
