//! Configuration types for the veto engine.

mod engine;
mod host;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use engine::{EngineConfig, LoggingConfig};
pub use host::{BundleResource, HostConfig};

use crate::rule::{ListenerSubscription, Rule, RuleDefinition};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub host: HostConfig,

    /// Rules registered at startup, in order
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    /// Listener subscriptions registered after `rules`
    #[serde(default)]
    pub listeners: Vec<ListenerSubscription>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse a YAML (or JSON) document and validate it.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, anyhow::Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.engine.action_timeout_ms == 0 {
            anyhow::bail!("engine.action_timeout_ms must be greater than 0");
        }
        if self.engine.evaluation_timeout_ms == Some(0) {
            anyhow::bail!("engine.evaluation_timeout_ms must be greater than 0 when set");
        }

        tracing_subscriber::EnvFilter::try_new(&self.logging.level).map_err(|e| {
            anyhow::anyhow!("Invalid logging.level '{}': {}", self.logging.level, e)
        })?;

        self.compile_rules()?;
        Ok(())
    }

    /// Compile every preloaded rule and listener, in registration order.
    pub fn compile_rules(&self) -> Result<Vec<Rule>, anyhow::Error> {
        let mut compiled = Vec::with_capacity(self.rules.len() + self.listeners.len());
        for (index, definition) in self.rules.iter().enumerate() {
            let rule = Rule::compile(definition).with_context(|| {
                format!(
                    "Invalid rule #{} ({}) of registrant '{}'",
                    index,
                    definition
                        .id
                        .as_ref()
                        .map(|id| id.as_str())
                        .unwrap_or("unnamed"),
                    definition.registrant
                )
            })?;
            compiled.push(rule);
        }
        for subscription in &self.listeners {
            let rule = subscription.compile().with_context(|| {
                format!(
                    "Invalid listener '{}' of registrant '{}'",
                    subscription.callback_id, subscription.registrant
                )
            })?;
            compiled.push(rule);
        }
        Ok(compiled)
    }
}
