//! Engine configuration.
//!
//! Loaded with precedence: Env vars > Config file > Defaults
//!
//! # Example config file (idlink.toml)
//! ```toml
//! max_retries = 5
//! retry_backoff_ms = 10
//! ```
//!
//! Environment variables use the `IDLINK_` prefix, e.g. `IDLINK_MAX_RETRIES=8`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Tuning for the identify retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transaction attempts before a serialization conflict is surfaced
    /// as `ConflictRetryExhausted`.
    pub max_retries: u32,
    /// Base backoff between attempts; multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_backoff_ms: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration with precedence: Env > `idlink.toml` > defaults.
    pub fn load() -> anyhow::Result<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("idlink.toml"))
            .merge(Env::prefixed("IDLINK_"))
            .extract()?;
        Ok(config)
    }
}
