use crate::core::errors::{MuxDemuxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a mux/demux bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxDemuxConfig {
    /// Interval between `is_pending` checks in `wait_result`
    pub poll_interval_ms: u64,
    /// Upper bound for `wait_result`; `None` waits forever
    pub result_timeout_ms: Option<u64>,
    /// Name used for the router task in logs
    pub router_name: String,
}

impl Default for MuxDemuxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            result_timeout_ms: None,
            router_name: "mux-demux-router".to_string(),
        }
    }
}

impl MuxDemuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(MuxDemuxError::configuration_field(
                "poll_interval_ms must be greater than 0",
                "poll_interval_ms",
            ));
        }
        if self.result_timeout_ms == Some(0) {
            return Err(MuxDemuxError::configuration_field(
                "result_timeout_ms must be greater than 0 when set",
                "result_timeout_ms",
            ));
        }
        if self.router_name.trim().is_empty() {
            return Err(MuxDemuxError::configuration_field(
                "router_name cannot be empty",
                "router_name",
            ));
        }
        Ok(())
    }

    /// Parse and validate a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the poll interval. Resolution is whole milliseconds; a non-zero
    /// interval below 1ms becomes 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = whole_millis(interval);
        self
    }

    /// Set the result timeout, rounded up to whole milliseconds
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout_ms = Some(whole_millis(timeout));
        self
    }

    /// Set the router name
    pub fn with_router_name(mut self, name: impl Into<String>) -> Self {
        self.router_name = name.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn result_timeout(&self) -> Option<Duration> {
        self.result_timeout_ms.map(Duration::from_millis)
    }
}

/// Milliseconds in `duration`, rounded up and saturating at `u64::MAX`
fn whole_millis(duration: Duration) -> u64 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}
