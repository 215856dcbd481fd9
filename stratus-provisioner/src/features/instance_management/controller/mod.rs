use crate::features::instance_management::service::InstanceOrchestrator;
use crate::shared::error::ProvisionerError;
use crate::shared::types::{CreateVmRequest, FindVmRequest, VmResponse};
use std::sync::Arc;
use stratus_core::ErrorResponse;
use tracing::info;

/// Entry points used by the fleet orchestrator
pub struct InstanceController {
    orchestrator: Arc<InstanceOrchestrator>,
}

impl InstanceController {
    pub fn new(orchestrator: Arc<InstanceOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Handle create VM request
    pub async fn create_vm(&self, request: CreateVmRequest) -> Result<VmResponse, ErrorResponse> {
        info!(
            agent_id = %request.spec.agent_id,
            stemcell_id = %request.spec.stemcell_id,
            "Received create VM request"
        );

        let instance = self
            .orchestrator
            .create(&request.spec, &request.options)
            .await
            .map_err(ErrorResponse::from)?;

        instance
            .describe()
            .await
            .map(VmResponse::from)
            .map_err(|e| e.into())
    }

    /// Handle describe VM request
    pub async fn describe_vm(&self, request: FindVmRequest) -> Result<VmResponse, ErrorResponse> {
        info!(instance_id = %request.instance_id, "Received describe VM request");

        if request.instance_id.is_empty() {
            return Err(
                ProvisionerError::ValidationError("Instance ID cannot be empty".to_string()).into(),
            );
        }

        self.orchestrator
            .find(&request.instance_id)
            .describe()
            .await
            .map(VmResponse::from)
            .map_err(|e| e.into())
    }

    /// Handle availability zone selection request
    pub async fn select_availability_zone(
        &self,
        existing_instance_id: Option<&str>,
    ) -> Result<String, ErrorResponse> {
        self.orchestrator
            .zone_selector()
            .select_availability_zone(existing_instance_id)
            .await
            .map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute::repo::{InMemoryComputeClient, InMemoryLoadBalancerClient};
    use crate::shared::config::ProvisionerConfig;
    use crate::shared::types::{
        GlobalConfig, InstanceDescription, InstanceSpec, InstanceState, Network, VmTypeProperties,
    };
    use std::time::Duration;

    fn controller(compute: InMemoryComputeClient) -> InstanceController {
        let mut config = ProvisionerConfig::default();
        config.running_wait.interval = Duration::ZERO;
        config.instance_create_wait = Duration::ZERO;
        let orchestrator = InstanceOrchestrator::from_config(
            Arc::new(compute),
            Arc::new(InMemoryLoadBalancerClient::new()),
            config,
        );
        InstanceController::new(Arc::new(orchestrator))
    }

    fn region() -> InMemoryComputeClient {
        InMemoryComputeClient::new(
            "us-east-1",
            vec!["us-east-1a".to_string(), "us-east-1b".to_string()],
        )
    }

    fn request(vm_type: VmTypeProperties) -> CreateVmRequest {
        let mut options = GlobalConfig::new("us-east-1");
        options.default_key_name = Some("bosh".to_string());
        CreateVmRequest {
            spec: InstanceSpec::new("agent-id", "ami-1234", vm_type)
                .with_network("default", Network::dynamic("subnet-1")),
            options,
        }
    }

    #[tokio::test]
    async fn test_create_vm() {
        let mut vm_type = VmTypeProperties::new("m1.small");
        vm_type.availability_zone = Some("us-east-1b".to_string());

        let response = controller(region()).create_vm(request(vm_type)).await.unwrap();

        assert!(response.instance_id.starts_with("i-"));
        assert_eq!(response.availability_zone, "us-east-1b");
        assert_eq!(response.state, InstanceState::Running);
    }

    #[tokio::test]
    async fn test_create_vm_maps_validation_error() {
        let mut vm_type = VmTypeProperties::new("m1.small");
        vm_type.instance_type = None;

        let response = controller(region())
            .create_vm(request(vm_type))
            .await
            .unwrap_err();
        assert_eq!(response.error_code, "VALIDATION_ERROR");
        assert!(!response.ok_to_retry);
    }

    #[tokio::test]
    async fn test_create_vm_maps_placement_conflict() {
        let mut vm_type = VmTypeProperties::new("m1.small");
        vm_type.availability_zone = Some("us-east-1a".to_string());
        let mut request = request(vm_type);
        request.spec.disk_locality.instance_id = Some("i-existing".to_string());

        let compute = region()
            .with_instance(InstanceDescription::new("i-existing", "us-east-1b"))
            .unwrap();
        let response = controller(compute).create_vm(request).await.unwrap_err();

        assert_eq!(response.error_code, "PLACEMENT_CONFLICT");
        assert_eq!(
            response.message,
            "can't use multiple availability zones: subnet in us-east-1b, VM in us-east-1a"
        );
    }

    #[tokio::test]
    async fn test_describe_vm() {
        let compute = region()
            .with_instance(InstanceDescription::new("i-existing", "us-east-1a"))
            .unwrap();
        let controller = controller(compute);

        let response = controller
            .describe_vm(FindVmRequest {
                instance_id: "i-existing".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.availability_zone, "us-east-1a");

        let missing = controller
            .describe_vm(FindVmRequest {
                instance_id: "i-missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.error_code, "PROVIDER_ERROR");

        let empty = controller
            .describe_vm(FindVmRequest {
                instance_id: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(empty.error_code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_select_availability_zone() {
        let compute = region()
            .with_instance(InstanceDescription::new("i-existing", "us-east-1b"))
            .unwrap();
        let controller = controller(compute);

        assert_eq!(
            controller
                .select_availability_zone(Some("i-existing"))
                .await
                .unwrap(),
            "us-east-1b"
        );

        let zone = controller.select_availability_zone(None).await.unwrap();
        assert!(zone == "us-east-1a" || zone == "us-east-1b");
    }
}
