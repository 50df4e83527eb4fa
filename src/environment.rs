//! Environment metadata and user-agent classification.
//!
//! All metadata is optional: a headless host that supplies nothing still
//! tracks events, just with fewer default properties.

use serde_json::{json, Map, Value};

use crate::constants::{LIB_NAME, LIB_VERSION};

/// Point-in-time environment metadata attached to every tracked event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvironmentSnapshot {
    pub user_agent: Option<String>,
    pub vendor: Option<String>,
    pub current_url: Option<String>,
    pub referrer: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

/// Source of environment metadata. The provider is consulted once per
/// tracked event so embedders can report a live URL or screen size.
pub trait EnvironmentProvider: Send + Sync {
    fn snapshot(&self) -> EnvironmentSnapshot;
}

/// Default provider for hosts without browser-style metadata. Every field is
/// absent, which degrades event richness but never blocks tracking.
#[derive(Clone, Debug, Default)]
pub struct HostEnvironment;

impl EnvironmentProvider for HostEnvironment {
    fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot::default()
    }
}

/// A fixed snapshot doubles as a provider for embedders whose metadata does
/// not change over the client's lifetime.
impl EnvironmentProvider for EnvironmentSnapshot {
    fn snapshot(&self) -> EnvironmentSnapshot {
        self.clone()
    }
}

/// Classifies the browser from the user-agent string. Matching is ordered:
/// some tokens are substrings of others ("Edg/" user agents also contain
/// "Chrome"), so the earlier, more specific checks must win.
pub fn browser(user_agent: &str, vendor: &str) -> Option<&'static str> {
    if user_agent.contains(" OPR/") {
        if user_agent.contains("Mini") {
            return Some("Opera Mini");
        }
        return Some("Opera");
    }
    if user_agent.contains("Edge") || user_agent.contains("Edg/") {
        Some("Microsoft Edge")
    } else if user_agent.contains("Chrome") {
        Some("Chrome")
    } else if user_agent.contains("CriOS") {
        Some("Chrome iOS")
    } else if user_agent.contains("FxiOS") {
        Some("Firefox iOS")
    } else if vendor.contains("Apple") {
        if user_agent.contains("Mobile") {
            Some("Mobile Safari")
        } else {
            Some("Safari")
        }
    } else if user_agent.contains("Android") {
        Some("Android Mobile")
    } else if user_agent.contains("Firefox") {
        Some("Firefox")
    } else if user_agent.contains("Gecko") {
        Some("Mozilla")
    } else {
        None
    }
}

/// Extracts the major.minor browser version following the version token of
/// the classified browser.
pub fn browser_version(user_agent: &str, vendor: &str) -> Option<f64> {
    match browser(user_agent, vendor)? {
        "Microsoft Edge" => {
            version_after(user_agent, "Edge/").or_else(|| version_after(user_agent, "Edg/"))
        }
        "Chrome" => version_after(user_agent, "Chrome/"),
        "Chrome iOS" => version_after(user_agent, "CriOS/"),
        "Safari" | "Mobile Safari" => version_after(user_agent, "Version/"),
        "Opera" => version_after(user_agent, "OPR/").or_else(|| version_after(user_agent, "Opera/")),
        "Firefox" => version_after(user_agent, "Firefox/"),
        "Firefox iOS" => version_after(user_agent, "FxiOS/"),
        "Android Mobile" => version_after(user_agent, "android "),
        "Mozilla" => version_after(user_agent, "rv:"),
        _ => None,
    }
}

pub fn operating_system(user_agent: &str) -> Option<&'static str> {
    // iOS must be checked before Mac: iPhone user agents contain "Mac OS X".
    if contains_ignore_case(user_agent, "windows") {
        Some("Windows")
    } else if user_agent.contains("iPhone")
        || user_agent.contains("iPad")
        || user_agent.contains("iPod")
    {
        Some("iOS")
    } else if user_agent.contains("Android") {
        Some("Android")
    } else if contains_ignore_case(user_agent, "mac") {
        Some("Mac OS X")
    } else if user_agent.contains("Linux") {
        Some("Linux")
    } else if user_agent.contains("CrOS") {
        Some("Chrome OS")
    } else {
        None
    }
}

pub fn device(user_agent: &str) -> Option<&'static str> {
    if user_agent.contains("iPad") {
        Some("iPad")
    } else if user_agent.contains("iPhone") {
        Some("iPhone")
    } else if user_agent.contains("Android") {
        Some("Android")
    } else {
        None
    }
}

/// The referring domain is the third `/`-separated segment of the referrer
/// URL, i.e. the host of `scheme://host/...`.
pub fn referring_domain(referrer: &str) -> Option<String> {
    let mut segments = referrer.split('/');
    let third = segments.nth(2)?;
    if third.is_empty() {
        None
    } else {
        Some(third.to_string())
    }
}

/// Builds the environment-derived default event properties. Keys whose
/// source metadata is absent are omitted entirely.
pub(crate) fn default_properties(snapshot: &EnvironmentSnapshot) -> Map<String, Value> {
    let mut props = Map::new();

    if let Some(user_agent) = &snapshot.user_agent {
        let vendor = snapshot.vendor.as_deref().unwrap_or("");
        if let Some(os) = operating_system(user_agent) {
            props.insert("$os".into(), json!(os));
        }
        if let Some(name) = browser(user_agent, vendor) {
            props.insert("$browser".into(), json!(name));
        }
        if let Some(version) = browser_version(user_agent, vendor) {
            props.insert("$browser_version".into(), json!(version));
        }
        if let Some(device) = device(user_agent) {
            props.insert("$device".into(), json!(device));
        }
    }

    if let Some(url) = &snapshot.current_url {
        props.insert("$current_url".into(), json!(url));
    }
    if let Some(referrer) = &snapshot.referrer {
        props.insert("$referrer".into(), json!(referrer));
        if let Some(domain) = referring_domain(referrer) {
            props.insert("$referring_domain".into(), json!(domain));
        }
    }
    if let Some(height) = snapshot.screen_height {
        props.insert("$screen_height".into(), json!(height));
    }
    if let Some(width) = snapshot.screen_width {
        props.insert("$screen_width".into(), json!(width));
    }

    props.insert("mp_lib".into(), json!(LIB_NAME));
    props.insert("$lib_version".into(), json!(LIB_VERSION));
    props
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

fn version_after(user_agent: &str, token: &str) -> Option<f64> {
    let start = user_agent.find(token)? + token.len();
    let rest = &user_agent[start..];

    let mut end = 0;
    let mut seen_dot = false;
    for (idx, ch) in rest.char_indices() {
        if ch.is_ascii_digit() {
            end = idx + 1;
        } else if ch == '.' && !seen_dot && end > 0 {
            seen_dot = true;
        } else {
            break;
        }
    }

    if end == 0 {
        return None;
    }
    rest[..end].parse().ok()
}
