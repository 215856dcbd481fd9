//! Spot market request records exchanged with the compute provider.

use crate::params::ProviderInstanceParams;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code the provider reports when the bid is below the market price.
pub const PRICE_TOO_LOW: &str = "price-too-low";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotRequestState {
    Open,
    Active,
    Closed,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl SpotRequestState {
    /// States from which the bid can no longer be satisfied.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SpotRequestState::Failed | SpotRequestState::Cancelled | SpotRequestState::Closed
        )
    }
}

impl fmt::Display for SpotRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpotRequestState::Open => "open",
            SpotRequestState::Active => "active",
            SpotRequestState::Closed => "closed",
            SpotRequestState::Cancelled => "cancelled",
            SpotRequestState::Failed => "failed",
            SpotRequestState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single-instance bid on the spot market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotInstanceRequest {
    pub spot_price: String,
    pub instance_count: u32,
    pub launch_specification: ProviderInstanceParams,
}

impl SpotInstanceRequest {
    pub fn new(launch_specification: ProviderInstanceParams, bid_price: f64) -> Self {
        Self {
            spot_price: format_spot_price(bid_price),
            instance_count: 1,
            launch_specification,
        }
    }
}

/// Renders a bid price in plain decimal notation, e.g. `0.15` as `"0.15"`.
pub fn format_spot_price(bid_price: f64) -> String {
    bid_price.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRequestDescription {
    pub spot_instance_request_id: String,
    pub state: SpotRequestState,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
}

impl SpotRequestDescription {
    pub fn new(spot_instance_request_id: impl Into<String>, state: SpotRequestState) -> Self {
        Self {
            spot_instance_request_id: spot_instance_request_id.into(),
            state,
            instance_id: None,
            status_code: None,
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_status_code(mut self, status_code: impl Into<String>) -> Self {
        self.status_code = Some(status_code.into());
        self
    }

    pub fn price_rejected(&self) -> bool {
        self.status_code.as_deref() == Some(PRICE_TOO_LOW)
    }
}
