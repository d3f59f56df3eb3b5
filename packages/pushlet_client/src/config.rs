use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

// =============================================================================
// Client config (figment-deserialized from defaults / pushlet.toml / env vars)
// =============================================================================
//
//   pushlet.toml:    base_url = "pushlet.srv"
//                    origin = "http://localhost:8080/pushlet/"
//
//   env var:         PUSHLET_ORIGIN=http://localhost:8080/pushlet/
//                    PUSHLET_RETRY_INTERVAL_MS=250

/// Default server endpoint, relative to `origin`.
pub const DEFAULT_BASE_URL: &str = "pushlet.srv";

/// Client tunables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint every request targets. May be relative to `origin`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Absolute URL relative base URLs resolve against.
    #[serde(default)]
    pub origin: Option<String>,
    /// Re-check interval for commands waiting on their precondition.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Renewal delay used when a refresh event lacks a usable `p_wait`.
    #[serde(default = "default_refresh_fallback_ms")]
    pub refresh_fallback_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            origin: None,
            retry_interval_ms: default_retry_interval_ms(),
            refresh_fallback_ms: default_refresh_fallback_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn from_figment(figment: &figment::Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn refresh_fallback(&self) -> Duration {
        Duration::from_millis(self.refresh_fallback_ms)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_retry_interval_ms() -> u64 {
    100
}
fn default_refresh_fallback_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    format!("pushlet-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a figment that layers: defaults → config file (if given) → PUSHLET_* env vars.
///
/// A missing config file is not an error; figment skips it.
pub fn load_config(config_file: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("PUSHLET_").split("__"))
}
