use crate::features::compute::repo::ComputeClient;
use crate::shared::error::{ProvisionerError, ProvisionerResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Resolves the availability zone a new VM is launched in
pub struct AvailabilityZoneSelector {
    compute: Arc<dyn ComputeClient>,
    region: String,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl AvailabilityZoneSelector {
    pub fn new(compute: Arc<dyn ComputeClient>, region: impl Into<String>) -> Self {
        Self::with_rng(compute, region, StdRng::from_entropy())
    }

    /// Uses `rng` for the unconstrained zone pick.
    pub fn with_rng<R>(compute: Arc<dyn ComputeClient>, region: impl Into<String>, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        Self {
            compute,
            region: region.into(),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Reconciles the zone hints into at most one zone. `None` leaves the
    /// choice to the provider.
    pub fn common_availability_zone(
        &self,
        volume_zones: &[String],
        vm_zone: Option<&str>,
        subnet_zone: Option<&str>,
    ) -> ProvisionerResult<Option<String>> {
        let zone = stratus_core::common_availability_zone(volume_zones, vm_zone, subnet_zone)?;
        debug!(zone = ?zone, "Resolved common availability zone");
        Ok(zone)
    }

    /// Zone of `existing_instance_id` when given, otherwise a uniformly random
    /// zone of the region.
    pub async fn select_availability_zone(
        &self,
        existing_instance_id: Option<&str>,
    ) -> ProvisionerResult<String> {
        if let Some(instance_id) = existing_instance_id.filter(|id| !id.is_empty()) {
            let instance = self.compute.get_instance(instance_id).await?;
            return Ok(instance.availability_zone);
        }

        let zones = self.compute.list_zones(&self.region).await?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        zones.choose(&mut *rng).cloned().ok_or_else(|| {
            ProvisionerError::ConfigurationError(format!(
                "no availability zones available in region {}",
                self.region
            ))
        })
    }
}
