pub mod params;
pub mod placement;
pub mod spot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

pub use params::ProviderInstanceParams;
pub use placement::{common_availability_zone, PlacementError};
pub use spot::{SpotInstanceRequest, SpotRequestDescription, SpotRequestState};

/// Error codes reported by the compute provider.
///
/// Two codes are transient and are handled where they occur instead of being
/// surfaced: [`ProviderError::AddressInUse`] on instance creation and
/// [`ProviderError::SpotRequestNotFound`] right after a spot bid is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("InvalidIPAddress.InUse: {0}")]
    AddressInUse(String),
    #[error("InvalidSpotInstanceRequestID.NotFound: {0}")]
    SpotRequestNotFound(String),
    #[error("InvalidInstanceID.NotFound: {0}")]
    InstanceNotFound(String),
    #[error("InvalidParameterValue: {0}")]
    InvalidParameter(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("{code}: {message}")]
    Api { code: String, message: String },
}

impl ProviderError {
    pub fn code(&self) -> &str {
        match self {
            ProviderError::AddressInUse(_) => "InvalidIPAddress.InUse",
            ProviderError::SpotRequestNotFound(_) => "InvalidSpotInstanceRequestID.NotFound",
            ProviderError::InstanceNotFound(_) => "InvalidInstanceID.NotFound",
            ProviderError::InvalidParameter(_) => "InvalidParameterValue",
            ProviderError::Unavailable(_) => "Unavailable",
            ProviderError::Api { code, .. } => code,
        }
    }

    pub fn is_address_in_use(&self) -> bool {
        matches!(self, ProviderError::AddressInUse(_))
    }

    pub fn is_spot_request_not_found(&self) -> bool {
        matches!(self, ProviderError::SpotRequestNotFound(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Provider view of a single instance, fetched fresh on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub availability_zone: String,
    pub state: InstanceState,
    pub source_dest_check: bool,
    pub launch_time: DateTime<Utc>,
}

impl InstanceDescription {
    pub fn new(instance_id: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            availability_zone: availability_zone.into(),
            state: InstanceState::Pending,
            source_dest_check: true,
            launch_time: Utc::now(),
        }
    }
}

/// Security group known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
}

impl SecurityGroup {
    pub fn new(group_id: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            group_name: group_name.into(),
        }
    }
}

/// Cloud properties of the VM type the instance is created from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmTypeProperties {
    pub instance_type: Option<String>,
    pub availability_zone: Option<String>,
    pub key_name: Option<String>,
    pub spot_bid_price: Option<f64>,
    pub spot_ondemand_fallback: bool,
    pub source_dest_check: Option<bool>,
    pub elbs: Vec<String>,
    pub security_groups: Vec<String>,
    pub iam_instance_profile: Option<String>,
    pub placement_group: Option<String>,
    pub tenancy: Option<String>,
}

impl VmTypeProperties {
    pub fn new(instance_type: impl Into<String>) -> Self {
        Self {
            instance_type: Some(instance_type.into()),
            ..Default::default()
        }
    }

    /// Requested zone, ignoring blank values.
    pub fn requested_zone(&self) -> Option<&str> {
        self.availability_zone
            .as_deref()
            .filter(|zone| !zone.is_empty())
    }

    /// Source/destination checking is only touched when explicitly disabled.
    pub fn disables_source_dest_check(&self) -> bool {
        self.source_dest_check == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Dynamic,
    Manual,
    Vip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCloudProperties {
    pub subnet: Option<String>,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub cloud_properties: NetworkCloudProperties,
}

impl Network {
    pub fn dynamic(subnet: impl Into<String>) -> Self {
        Self {
            network_type: NetworkType::Dynamic,
            ip: None,
            dns: Vec::new(),
            cloud_properties: NetworkCloudProperties {
                subnet: Some(subnet.into()),
                security_groups: Vec::new(),
            },
        }
    }

    pub fn manual(subnet: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            network_type: NetworkType::Manual,
            ip: Some(ip.into()),
            dns: Vec::new(),
            cloud_properties: NetworkCloudProperties {
                subnet: Some(subnet.into()),
                security_groups: Vec::new(),
            },
        }
    }
}

/// Named networks the VM is attached to.
pub type NetworkSpec = BTreeMap<String, Network>;

/// Arbitrary environment metadata forwarded to the VM's user data.
pub type Environment = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLocation {
    pub volume_id: String,
    pub availability_zone: String,
}

/// Where the disks that will be attached to the VM already live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskLocality {
    pub volumes: Vec<VolumeLocation>,
    /// Existing instance the VM must be placed next to.
    pub instance_id: Option<String>,
}

impl DiskLocality {
    /// Distinct non-blank volume zones, in first-seen order.
    pub fn volume_zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = Vec::new();
        for volume in &self.volumes {
            let zone = &volume.availability_zone;
            if !zone.is_empty() && !zones.contains(zone) {
                zones.push(zone.clone());
            }
        }
        zones
    }
}

/// Everything the caller wants from a new VM. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub agent_id: String,
    pub stemcell_id: String,
    #[serde(default)]
    pub vm_type: VmTypeProperties,
    #[serde(default)]
    pub networks: NetworkSpec,
    #[serde(default)]
    pub disk_locality: DiskLocality,
    #[serde(default)]
    pub environment: Environment,
}

impl InstanceSpec {
    pub fn new(
        agent_id: impl Into<String>,
        stemcell_id: impl Into<String>,
        vm_type: VmTypeProperties,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            stemcell_id: stemcell_id.into(),
            vm_type,
            networks: NetworkSpec::new(),
            disk_locality: DiskLocality::default(),
            environment: Environment::new(),
        }
    }

    pub fn with_network(mut self, name: impl Into<String>, network: Network) -> Self {
        self.networks.insert(name.into(), network);
        self
    }

    pub fn with_disk_locality(mut self, disk_locality: DiskLocality) -> Self {
        self.disk_locality = disk_locality;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

/// Provider-wide defaults supplied alongside every create call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub region: String,
    pub default_key_name: Option<String>,
    pub default_security_groups: Vec<String>,
}

impl GlobalConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub ok_to_retry: bool,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            ok_to_retry: false,
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn retryable(mut self, ok_to_retry: bool) -> Self {
        self.ok_to_retry = ok_to_retry;
        self
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}
