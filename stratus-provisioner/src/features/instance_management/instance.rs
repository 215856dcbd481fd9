use crate::features::compute::repo::{ComputeClient, LoadBalancerClient};
use crate::features::resource_wait::service::ResourceWaiter;
use crate::shared::config::WaitPolicy;
use crate::shared::error::ProvisionerResult;
use crate::shared::types::{InstanceDescription, InstanceState};
use std::fmt;
use std::sync::Arc;
use stratus_core::ProviderError;
use tracing::{debug, info};

/// Handle to a provider instance. Holds only the id; every query goes to the
/// provider.
#[derive(Clone)]
pub struct Instance {
    id: String,
    compute: Arc<dyn ComputeClient>,
    load_balancers: Arc<dyn LoadBalancerClient>,
    waiter: Arc<dyn ResourceWaiter>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance").field("id", &self.id).finish()
    }
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        compute: Arc<dyn ComputeClient>,
        load_balancers: Arc<dyn LoadBalancerClient>,
        waiter: Arc<dyn ResourceWaiter>,
    ) -> Self {
        Self {
            id: id.into(),
            compute,
            load_balancers,
            waiter,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn describe(&self) -> ProvisionerResult<InstanceDescription> {
        Ok(self.compute.get_instance(&self.id).await?)
    }

    pub async fn availability_zone(&self) -> ProvisionerResult<String> {
        Ok(self.describe().await?.availability_zone)
    }

    pub async fn wait_for_running(&self, policy: &WaitPolicy) -> ProvisionerResult<()> {
        debug!(instance_id = %self.id, "Waiting for instance to be running");
        self.waiter
            .wait_for(&self.id, InstanceState::Running, policy)
            .await
    }

    pub async fn attach_to_load_balancers(&self, load_balancers: &[String]) -> ProvisionerResult<()> {
        for load_balancer in load_balancers {
            self.load_balancers
                .register_instance(load_balancer, &self.id)
                .await?;
            info!(instance_id = %self.id, load_balancer = %load_balancer, "Attached instance to load balancer");
        }
        Ok(())
    }

    pub async fn disable_source_dest_check(&self) -> ProvisionerResult<()> {
        self.compute.set_source_dest_check(&self.id, false).await?;
        debug!(instance_id = %self.id, "Disabled source/destination check");
        Ok(())
    }

    /// Terminates the instance. An instance that is already gone counts as
    /// terminated.
    pub async fn terminate(&self) -> ProvisionerResult<()> {
        match self.compute.terminate_instance(&self.id).await {
            Ok(()) => {
                info!(instance_id = %self.id, "Terminated instance");
                Ok(())
            }
            Err(ProviderError::InstanceNotFound(_)) => {
                debug!(instance_id = %self.id, "Instance already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
