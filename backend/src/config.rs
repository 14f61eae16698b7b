//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Library readiness gate configuration
    pub readiness: ReadinessConfig,
    /// Client behaviour configuration
    pub client: ClientConfig,
    /// Bridge process configuration
    pub bridge: BridgeConfig,
    /// Values used to prefill the connection form
    pub prefill: PrefillConfig,
}

/// Library readiness gate configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// How long to wait for the library before failing
    pub timeout: Duration,
    /// Fixed interval between presence probes
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Client behaviour configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Reconnection attempts handed to the library (the library owns the policy)
    pub reconnect_retries: u32,
    /// Number of conversations requested per list call
    pub dialog_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_retries: 5,
            dialog_limit: 100,
        }
    }
}

/// Bridge process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Executable used to run the bridge script
    pub node_command: String,
    /// Path to the GramJS bridge script
    pub script_path: PathBuf,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            script_path: default_script_path(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Values used to prefill the connection form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefillConfig {
    /// Application id, if set
    pub app_id: Option<i32>,
    /// Application secret (api hash)
    pub app_secret: String,
    /// Serialized session string
    pub session_token: String,
}

/// Location of the bridge script inside the backend crate
///
/// In development the script lives in `backend/bridge/`; deployments point
/// `TG_BRIDGE_SCRIPT` somewhere else.
pub fn default_script_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("bridge");
    path.push("gramjs-bridge.js");
    path
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let readiness_defaults = ReadinessConfig::default();
        let client_defaults = ClientConfig::default();
        let bridge_defaults = BridgeConfig::default();

        Self {
            readiness: ReadinessConfig {
                timeout: parse_var::<u64>("TG_LIBRARY_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(readiness_defaults.timeout),
                poll_interval: parse_var::<u64>("TG_LIBRARY_POLL_MS")
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(readiness_defaults.poll_interval),
            },
            client: ClientConfig {
                reconnect_retries: parse_var("TG_CONNECTION_RETRIES")
                    .unwrap_or(client_defaults.reconnect_retries),
                dialog_limit: parse_var::<usize>("TG_DIALOG_LIMIT")
                    .filter(|n| *n > 0)
                    .unwrap_or(client_defaults.dialog_limit),
            },
            bridge: BridgeConfig {
                node_command: env::var("TG_BRIDGE_NODE")
                    .unwrap_or(bridge_defaults.node_command),
                script_path: env::var_os("TG_BRIDGE_SCRIPT")
                    .map(PathBuf::from)
                    .unwrap_or(bridge_defaults.script_path),
                request_timeout: parse_var::<u64>("TG_BRIDGE_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(bridge_defaults.request_timeout),
            },
            prefill: PrefillConfig {
                app_id: parse_var("TG_API_ID"),
                app_secret: env::var("TG_API_HASH").unwrap_or_default(),
                session_token: env::var("TG_SESSION").unwrap_or_default(),
            },
        }
    }
}
