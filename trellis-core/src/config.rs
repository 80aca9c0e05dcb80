//! Host configuration for the render bridge.

use serde::{Deserialize, Serialize};

/// Environment variable consulted by [`BridgeConfig::from_env`].
pub const HOST_MODE_ENV: &str = "TRELLIS_HOST_MODE";

/// How the host drives render passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    /// Every render pass is eventually committed or unmounted.
    #[default]
    Production,

    /// The host may run render passes that are never committed (double
    /// invocation in development builds). Bridges treat an uncommitted first
    /// pass as provisional and discard its scope when the pass ends.
    Development,
}

impl HostMode {
    /// Whether render passes may be discarded without a teardown signal.
    pub fn double_invokes(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Bridge configuration supplied by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Render model of the host.
    pub mode: HostMode,
}

impl BridgeConfig {
    /// Configuration for a development host.
    pub fn development() -> Self {
        Self {
            mode: HostMode::Development,
        }
    }

    /// Read the mode from `TRELLIS_HOST_MODE`.
    ///
    /// Unknown or missing values fall back to production.
    pub fn from_env() -> Self {
        let mode = match std::env::var(HOST_MODE_ENV) {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "development" | "dev" => HostMode::Development,
                "production" | "prod" | "" => HostMode::Production,
                other => {
                    tracing::warn!(value = other, "unknown {HOST_MODE_ENV}, using production");
                    HostMode::Production
                }
            },
            Err(_) => HostMode::Production,
        };
        Self { mode }
    }
}
