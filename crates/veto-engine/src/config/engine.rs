//! Engine and logging configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Upper bound for one blocking listener round-trip
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    /// Upper bound for a whole evaluation (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_timeout_ms: Option<u64>,
}

fn default_action_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: default_action_timeout_ms(),
            evaluation_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `veto_engine=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
