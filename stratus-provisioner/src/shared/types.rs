use serde::{Deserialize, Serialize};

pub use stratus_core::{
    DiskLocality, Environment, GlobalConfig, InstanceDescription, InstanceSpec, InstanceState,
    Network, NetworkSpec, NetworkType, ProviderInstanceParams, SecurityGroup, SpotInstanceRequest,
    SpotRequestDescription, SpotRequestState, VmTypeProperties, VolumeLocation,
};

/// Request to create a new VM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVmRequest {
    pub spec: InstanceSpec,
    #[serde(default)]
    pub options: GlobalConfig,
}

/// Request to look up an existing VM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindVmRequest {
    pub instance_id: String,
}

/// Created VM response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmResponse {
    pub instance_id: String,
    pub availability_zone: String,
    pub state: InstanceState,
}

impl From<InstanceDescription> for VmResponse {
    fn from(description: InstanceDescription) -> Self {
        Self {
            instance_id: description.instance_id,
            availability_zone: description.availability_zone,
            state: description.state,
        }
    }
}
