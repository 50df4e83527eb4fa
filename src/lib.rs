//! Rust port of the Minipanel analytics client.
//!
//! A minimal Mixpanel-compatible event-tracking client: identity management,
//! super-properties, event property composition, payload encoding and
//! transmission, and profile (people) mutations.
//!
//! ```no_run
//! use minipanel::{Minipanel, Properties};
//!
//! # async fn run() -> Result<(), minipanel::MinipanelError> {
//! let client = Minipanel::init("YOUR_PROJECT_TOKEN", None)?;
//!
//! let mut props = Properties::new();
//! props.insert("plan".into(), serde_json::json!("pro"));
//! client.register(props);
//!
//! client.track("Page View", Properties::new()).await?;
//! client.identify("u-42").await?;
//! client.people().set_one("$email", "u42@example.com").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Tracking never panics: every asynchronous failure surfaces through the
//! awaited [`DeliveryResult`], and storage failures are swallowed (logged in
//! debug mode) so the client cannot crash its host.

mod api;
mod config;
mod constants;
mod environment;
mod error;
mod event;
mod identity;
mod people;
mod persistence;
mod transport;
mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{Minipanel, MinipanelBuilder};
pub use config::{ConfigUpdate, MinipanelConfig};
pub use environment::{
    browser, browser_version, device, operating_system, referring_domain, EnvironmentProvider,
    EnvironmentSnapshot, HostEnvironment,
};
pub use error::{MinipanelError, MinipanelErrorCode, MinipanelResult};
pub use event::{EventPayload, Properties};
pub use people::{ChargeAmount, People};
pub use persistence::{FileStorage, MemoryStorage, Persistence, PropertyStorage};
pub use transport::{DeliveryAck, DeliveryResult, Endpoint, HttpTransport, Transport};
