// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default receive timeout of the worker and consumer loops.
pub const QUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// What the consumer loop does with a result that carries an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Errors skip the handler chain and go straight to the error report.
    #[default]
    Report,
    /// Errors run through the handler chain and are reported only if no handler consumed them.
    Dispatch,
}

/// Plain, serializable part of a scheduler's setup. Hooks and shared state are
/// added through [`SchedulerBuilder`](crate::SchedulerBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Used in thread names and log lines.
    pub name: String,
    pub workers: usize,
    /// Spawn a consumer loop that runs output handlers.
    pub has_results: bool,
    /// Workers keep producer outcomes alive and advance them round-robin.
    pub streaming: bool,
    pub queue_timeout_ms: u64,
    pub error_policy: ErrorPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            workers: 1,
            has_results: true,
            streaming: false,
            queue_timeout_ms: QUEUE_TIMEOUT.as_millis() as u64,
            error_policy: ErrorPolicy::Report,
        }
    }
}

impl SchedulerConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    /// Reads a config from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SchedulerConfig::from_json(r#"{"workers": 3, "streaming": true}"#).unwrap();
        assert_eq!(config.workers, 3);
        assert!(config.streaming);
        assert_eq!(config.name, "main");
        assert_eq!(config.queue_timeout(), QUEUE_TIMEOUT);
        assert_eq!(config.error_policy, ErrorPolicy::Report);
    }

    #[test]
    fn test_error_policy_names() {
        let config = SchedulerConfig::from_json(r#"{"error_policy": "dispatch"}"#).unwrap();
        assert_eq!(config.error_policy, ErrorPolicy::Dispatch);
    }
}
