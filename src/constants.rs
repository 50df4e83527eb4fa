pub(crate) const DEFAULT_API_HOST: &str = "https://api.mixpanel.com";

pub(crate) const LIB_NAME: &str = "minipanel-rs";
pub(crate) const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mixpanel truncates every string value to this many characters server-side;
/// the client applies the same ceiling before transmission.
pub(crate) const MAX_STRING_LENGTH: usize = 255;

/// Prefix marking an anonymous distinct id derived from the device id.
pub(crate) const DEVICE_ID_PREFIX: &str = "$device:";

/// Persisted state lives under one storage key derived from the project token.
pub(crate) const STORAGE_KEY_PREFIX: &str = "mon_";

/// Identity keys owned by the client; caller-supplied super-property patches
/// must never overwrite them.
pub(crate) const RESERVED_PROPERTY_KEYS: [&str; 3] = ["distinct_id", "$device_id", "$user_id"];
