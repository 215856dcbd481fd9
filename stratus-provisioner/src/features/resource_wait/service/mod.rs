use crate::features::compute::repo::ComputeClient;
use crate::shared::clock::Sleeper;
use crate::shared::config::WaitPolicy;
use crate::shared::error::{ProvisionerError, ProvisionerResult};
use crate::shared::types::InstanceState;
use async_trait::async_trait;
use std::sync::Arc;
use stratus_core::ProviderError;
use tracing::debug;

/// Blocks until a resource reaches a target state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceWaiter: Send + Sync {
    async fn wait_for(
        &self,
        instance_id: &str,
        target: InstanceState,
        policy: &WaitPolicy,
    ) -> ProvisionerResult<()>;
}

/// Fixed-interval polling of the instance state
pub struct PollingResourceWaiter {
    compute: Arc<dyn ComputeClient>,
    sleeper: Arc<dyn Sleeper>,
}

impl PollingResourceWaiter {
    pub fn new(compute: Arc<dyn ComputeClient>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { compute, sleeper }
    }
}

#[async_trait]
impl ResourceWaiter for PollingResourceWaiter {
    async fn wait_for(
        &self,
        instance_id: &str,
        target: InstanceState,
        policy: &WaitPolicy,
    ) -> ProvisionerResult<()> {
        for attempt in 1..=policy.max_attempts {
            match self.compute.get_instance(instance_id).await {
                Ok(instance) if instance.state == target => {
                    debug!(instance_id, state = %target, attempt, "Instance reached target state");
                    return Ok(());
                }
                Ok(instance)
                    if target == InstanceState::Running
                        && instance.state == InstanceState::Terminated =>
                {
                    return Err(ProvisionerError::vm_creation_failed(
                        format!("instance {instance_id} terminated while waiting for it to run"),
                        false,
                    ));
                }
                Ok(instance) => {
                    debug!(instance_id, state = %instance.state, attempt, "Waiting for instance");
                }
                // Freshly created instances can be missing from lookups for a while.
                Err(ProviderError::InstanceNotFound(_)) => {
                    debug!(instance_id, attempt, "Instance not visible yet");
                }
                Err(error) => return Err(error.into()),
            }

            if attempt < policy.max_attempts {
                self.sleeper.sleep(policy.interval).await;
            }
        }

        Err(ProvisionerError::Timeout(format!(
            "instance {instance_id} did not become {target} after {} attempts",
            policy.max_attempts
        )))
    }
}
