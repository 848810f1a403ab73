use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::Result;

fn default_gateway_class_name() -> String {
    "kubvernor".to_owned()
}

fn default_domain_suffix() -> String {
    "cluster.local".to_owned()
}

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct StatusConfiguration {
    /// Delay used to coalesce bursts of status updates.
    #[builder(default = 500)]
    #[serde(default = "StatusConfiguration::default_interval_ms")]
    pub interval_ms: u64,
    #[builder(default = 5)]
    #[serde(default = "StatusConfiguration::default_max_attempts")]
    pub max_attempts: u32,
    #[builder(default = 100)]
    #[serde(default = "StatusConfiguration::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[builder(default = 5_000)]
    #[serde(default = "StatusConfiguration::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl StatusConfiguration {
    fn default_interval_ms() -> u64 {
        500
    }
    fn default_max_attempts() -> u32 {
        5
    }
    fn default_initial_backoff_ms() -> u64 {
        100
    }
    fn default_max_backoff_ms() -> u64 {
        5_000
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for StatusConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    #[builder(default = default_gateway_class_name())]
    #[serde(default = "default_gateway_class_name")]
    pub gateway_class_name: String,
    #[builder(default = default_domain_suffix())]
    #[serde(default = "default_domain_suffix")]
    pub domain_suffix: String,
    #[builder(default)]
    #[serde(default)]
    pub status: StatusConfiguration,
    #[builder(default)]
    #[serde(default)]
    pub log_file: Option<String>,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("gateway class name must be not empty")]
    GatewayClassName,
    #[error("status max attempts must be at least 1")]
    StatusAttempts,
    #[error("status initial backoff must not exceed max backoff")]
    StatusBackoff,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.gateway_class_name.is_empty() {
            return Err(ConfigurationError::GatewayClassName.into());
        }
        if self.status.max_attempts == 0 {
            return Err(ConfigurationError::StatusAttempts.into());
        }
        if self.status.initial_backoff_ms > self.status.max_backoff_ms {
            return Err(ConfigurationError::StatusBackoff.into());
        }
        Ok(())
    }
}
