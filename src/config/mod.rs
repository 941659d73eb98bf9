//! Process configuration resolved from environment variables.
//!
//! [`Config::from_env`] takes a snapshot at startup. The store URI is the one
//! value allowed to be absent here: its absence is reported by
//! [`ConnectionCache::acquire`](crate::store::ConnectionCache::acquire) on
//! first store use, so a misconfigured deployment fails with a configuration
//! error instead of a crash deep in business logic.

use std::env;

use tracing::debug;

/// Default HTTP bind address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default `From:` identity for outbound mail.
pub const DEFAULT_SENDER: &str = "MarketPulse <noreply@marketpulse.dev>";

/// Default site name used in email subjects and copy.
pub const DEFAULT_SITE_NAME: &str = "MarketPulse";

/// Environment snapshot for the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store address (`DOCSTORE_URI`). `None` when unset.
    pub store_uri: Option<String>,

    /// HTTP bind address (`MARKETPULSE_ADDR`).
    pub bind_addr: String,

    /// Sender identity for outbound mail (`SMTP_SENDER`).
    pub smtp_sender: String,

    /// Site name used in email subjects and copy (`SITE_NAME`).
    pub site_name: String,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            store_uri: env::var("DOCSTORE_URI")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            bind_addr: or_default("MARKETPULSE_ADDR", DEFAULT_ADDR),
            smtp_sender: or_default("SMTP_SENDER", DEFAULT_SENDER),
            site_name: or_default("SITE_NAME", DEFAULT_SITE_NAME),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_uri: None,
            bind_addr: DEFAULT_ADDR.to_owned(),
            smtp_sender: DEFAULT_SENDER.to_owned(),
            site_name: DEFAULT_SITE_NAME.to_owned(),
        }
    }
}

fn or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            debug!(key, default, "environment variable not set, using default");
            default.to_owned()
        }
    }
}
