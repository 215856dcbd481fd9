use crate::features::compute::repo::ComputeClient;
use crate::features::spot_request::state::SpotRequestPhase;
use crate::shared::clock::Sleeper;
use crate::shared::config::SpotPollingConfig;
use crate::shared::error::{ProvisionerError, ProvisionerResult};
use crate::shared::types::{ProviderInstanceParams, SpotInstanceRequest, SpotRequestDescription};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A spot bid the provider has satisfied with a running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotFulfillment {
    pub spot_request_id: String,
    pub instance_id: String,
}

/// Submits a spot bid and polls it until it is fulfilled or fails.
///
/// Every failure after a successful submission cancels the bid before
/// returning, and every failure is non-retryable.
pub struct SpotRequestTracker {
    compute: Arc<dyn ComputeClient>,
    sleeper: Arc<dyn Sleeper>,
    config: SpotPollingConfig,
}

impl SpotRequestTracker {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        sleeper: Arc<dyn Sleeper>,
        config: SpotPollingConfig,
    ) -> Self {
        Self {
            compute,
            sleeper,
            config,
        }
    }

    pub async fn create(
        &self,
        params: &ProviderInstanceParams,
        bid_price: f64,
    ) -> ProvisionerResult<SpotFulfillment> {
        let group_names = params.security_group_names();
        if !group_names.is_empty() {
            let message = "Cannot use security group names when creating spot instances";
            error!(security_groups = ?group_names, "{message}");
            return Err(ProvisionerError::vm_creation_failed(message, false));
        }

        let request = SpotInstanceRequest::new(params.clone(), bid_price);
        let spot_request_id = match self.compute.request_spot_instances(&request).await {
            Ok(id) => id,
            Err(err) => {
                let message = format!("Failed to get spot instance request: {err} ({err:?})");
                error!(error = %err, "{message}");
                return Err(ProvisionerError::vm_creation_failed(message, false));
            }
        };
        info!(
            spot_request_id = %spot_request_id,
            spot_price = %request.spot_price,
            "Submitted spot instance request"
        );

        let phase = self.poll(&spot_request_id).await?;
        match phase {
            SpotRequestPhase::Active { instance_id } => {
                info!(
                    spot_request_id = %spot_request_id,
                    instance_id = %instance_id,
                    "Spot instance request fulfilled"
                );
                Ok(SpotFulfillment {
                    spot_request_id,
                    instance_id,
                })
            }
            phase => {
                let reason = phase.failure_reason(&spot_request_id).unwrap_or_else(|| {
                    format!("Spot instance request {spot_request_id} was not fulfilled")
                });
                Err(self.fail_and_cancel(&spot_request_id, reason).await)
            }
        }
    }

    /// Polls until a terminal phase or the retry budget runs out. Only a
    /// non-transient provider error is returned as `Err`.
    async fn poll(&self, spot_request_id: &str) -> ProvisionerResult<SpotRequestPhase> {
        let request_ids = vec![spot_request_id.to_string()];
        let retry_count = self.config.retry_count;
        let mut phase = SpotRequestPhase::Submitted;

        for attempt in 1..=retry_count {
            let description = match self.compute.describe_spot_requests(&request_ids).await {
                Ok(descriptions) => Self::find_description(spot_request_id, descriptions),
                Err(err) if err.is_spot_request_not_found() => {
                    debug!(spot_request_id, attempt, "Spot instance request not visible yet");
                    None
                }
                Err(err) => {
                    let message = format!(
                        "Failed to check spot instance request {spot_request_id}: {err}"
                    );
                    return Err(self.fail_and_cancel(spot_request_id, message).await);
                }
            };

            phase = SpotRequestPhase::advance(description.as_ref(), attempt, retry_count);
            if phase.is_terminal() {
                break;
            }

            debug!(
                spot_request_id,
                attempt,
                state = ?description.map(|d| d.state),
                "Spot instance request not fulfilled yet"
            );
            self.sleeper.sleep(self.config.poll_interval()).await;
        }

        Ok(phase)
    }

    /// Descriptions of other bids are ignored. A response without ours counts
    /// like a request the provider does not know about yet.
    fn find_description(
        spot_request_id: &str,
        descriptions: Vec<SpotRequestDescription>,
    ) -> Option<SpotRequestDescription> {
        descriptions
            .into_iter()
            .find(|description| description.spot_instance_request_id == spot_request_id)
    }

    async fn fail_and_cancel(&self, spot_request_id: &str, message: String) -> ProvisionerError {
        error!(spot_request_id, "{message}");

        let request_ids = [spot_request_id.to_string()];
        if let Err(err) = self.compute.cancel_spot_requests(&request_ids).await {
            error!(
                spot_request_id,
                error = %err,
                "Failed to cancel spot instance request"
            );
        }

        ProvisionerError::vm_creation_failed(message, false)
    }
}
