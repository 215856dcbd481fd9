use crate::shared::error::{ProvisionerError, ProvisionerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Budget for polling a spot bid until the provider satisfies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotPollingConfig {
    #[serde(with = "seconds")]
    pub total_wait: Duration,
    pub retry_count: u32,
}

impl SpotPollingConfig {
    /// Fixed delay between two polls of the same request.
    pub fn poll_interval(&self) -> Duration {
        if self.retry_count == 0 {
            return self.total_wait;
        }
        self.total_wait / self.retry_count
    }
}

impl Default for SpotPollingConfig {
    fn default() -> Self {
        Self {
            total_wait: Duration::from_secs(300),
            retry_count: 10,
        }
    }
}

/// Fixed-interval polling policy used while waiting on a resource state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    #[serde(with = "seconds")]
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub region: String,
    pub spot: SpotPollingConfig,
    /// Delay before retrying a launch whose private IP was still in use.
    #[serde(with = "seconds")]
    pub instance_create_wait: Duration,
    pub running_wait: WaitPolicy,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            spot: SpotPollingConfig::default(),
            instance_create_wait: Duration::from_secs(30),
            running_wait: WaitPolicy::default(),
        }
    }
}

impl ProvisionerConfig {
    pub fn from_env() -> ProvisionerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_json(raw: &str) -> ProvisionerResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            ProvisionerError::ConfigurationError(format!("invalid provisioner config: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the config from `STRATUS_*` variables resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> ProvisionerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            region: lookup("STRATUS_REGION")
                .map(|region| region.trim().to_string())
                .unwrap_or(defaults.region),
            spot: SpotPollingConfig {
                total_wait: parse_secs(
                    &lookup,
                    "STRATUS_SPOT_TOTAL_WAIT_SECS",
                    defaults.spot.total_wait,
                )?,
                retry_count: parse_u32(
                    &lookup,
                    "STRATUS_SPOT_RETRY_COUNT",
                    defaults.spot.retry_count,
                )?,
            },
            instance_create_wait: parse_secs(
                &lookup,
                "STRATUS_INSTANCE_CREATE_WAIT_SECS",
                defaults.instance_create_wait,
            )?,
            running_wait: WaitPolicy {
                interval: parse_secs(
                    &lookup,
                    "STRATUS_RUNNING_WAIT_INTERVAL_SECS",
                    defaults.running_wait.interval,
                )?,
                max_attempts: parse_u32(
                    &lookup,
                    "STRATUS_RUNNING_WAIT_MAX_ATTEMPTS",
                    defaults.running_wait.max_attempts,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ProvisionerResult<()> {
        if self.region.is_empty() {
            return Err(ProvisionerError::ConfigurationError(
                "region cannot be empty".to_string(),
            ));
        }
        if self.spot.retry_count == 0 {
            return Err(ProvisionerError::ConfigurationError(
                "spot retry_count must be at least 1".to_string(),
            ));
        }
        if self.running_wait.max_attempts == 0 {
            return Err(ProvisionerError::ConfigurationError(
                "running_wait max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, name: &str, default: Duration) -> ProvisionerResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or_else(|| {
                ProvisionerError::ConfigurationError(format!(
                    "{name} must be a non-negative number of seconds, got '{raw}'"
                ))
            }),
        None => Ok(default),
    }
}

fn parse_u32<F>(lookup: &F, name: &str, default: u32) -> ProvisionerResult<u32>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            ProvisionerError::ConfigurationError(format!(
                "{name} must be a non-negative integer, got '{raw}'"
            ))
        }),
        None => Ok(default),
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
