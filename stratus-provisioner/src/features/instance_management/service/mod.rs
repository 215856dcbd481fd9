use crate::features::availability_zone::service::AvailabilityZoneSelector;
use crate::features::compute::repo::{ComputeClient, LoadBalancerClient};
use crate::features::instance_management::instance::Instance;
use crate::features::param_mapping::service::{InstanceParamMapper, ParameterBuilder};
use crate::features::resource_wait::service::{PollingResourceWaiter, ResourceWaiter};
use crate::features::spot_request::service::SpotRequestTracker;
use crate::shared::clock::{Sleeper, TokioSleeper};
use crate::shared::config::ProvisionerConfig;
use crate::shared::error::{ProvisionerError, ProvisionerResult};
use crate::shared::types::{GlobalConfig, InstanceSpec, ProviderInstanceParams, VmTypeProperties};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How the instance is launched, decided by the VM type
#[derive(Debug, Clone, Copy, PartialEq)]
enum LaunchStrategy {
    OnDemand,
    Spot {
        bid_price: f64,
        ondemand_fallback: bool,
    },
}

impl LaunchStrategy {
    fn for_vm_type(vm_type: &VmTypeProperties) -> Self {
        match vm_type.spot_bid_price {
            Some(bid_price) => LaunchStrategy::Spot {
                bid_price,
                ondemand_fallback: vm_type.spot_ondemand_fallback,
            },
            None => LaunchStrategy::OnDemand,
        }
    }
}

/// Creates instances end to end: zone resolution, launch, wait, attach and
/// rollback.
pub struct InstanceOrchestrator {
    compute: Arc<dyn ComputeClient>,
    load_balancers: Arc<dyn LoadBalancerClient>,
    param_builder: Arc<dyn ParameterBuilder>,
    waiter: Arc<dyn ResourceWaiter>,
    sleeper: Arc<dyn Sleeper>,
    zone_selector: AvailabilityZoneSelector,
    spot_tracker: SpotRequestTracker,
    config: ProvisionerConfig,
}

impl InstanceOrchestrator {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        load_balancers: Arc<dyn LoadBalancerClient>,
        param_builder: Arc<dyn ParameterBuilder>,
        waiter: Arc<dyn ResourceWaiter>,
        sleeper: Arc<dyn Sleeper>,
        config: ProvisionerConfig,
    ) -> Self {
        let zone_selector = AvailabilityZoneSelector::new(compute.clone(), config.region.clone());
        let spot_tracker =
            SpotRequestTracker::new(compute.clone(), sleeper.clone(), config.spot.clone());

        Self {
            compute,
            load_balancers,
            param_builder,
            waiter,
            sleeper,
            zone_selector,
            spot_tracker,
            config,
        }
    }

    /// Production wiring: default parameter mapping, polling waiter and real
    /// sleeps.
    pub fn from_config(
        compute: Arc<dyn ComputeClient>,
        load_balancers: Arc<dyn LoadBalancerClient>,
        config: ProvisionerConfig,
    ) -> Self {
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let waiter = Arc::new(PollingResourceWaiter::new(compute.clone(), sleeper.clone()));
        Self::new(
            compute,
            load_balancers,
            Arc::new(InstanceParamMapper::new()),
            waiter,
            sleeper,
            config,
        )
    }

    pub fn with_zone_selector(mut self, zone_selector: AvailabilityZoneSelector) -> Self {
        self.zone_selector = zone_selector;
        self
    }

    pub fn zone_selector(&self) -> &AvailabilityZoneSelector {
        &self.zone_selector
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Creates a running instance for `spec`. On any failure after the
    /// instance exists, the instance is terminated before the original error
    /// is returned.
    pub async fn create(
        &self,
        spec: &InstanceSpec,
        global: &GlobalConfig,
    ) -> ProvisionerResult<Instance> {
        let zone = self.resolve_zone(spec).await?;

        self.param_builder.validate(spec, global)?;
        let params = self
            .param_builder
            .build_instance_params(spec, global, zone.as_deref())?;

        let instance_id = match LaunchStrategy::for_vm_type(&spec.vm_type) {
            LaunchStrategy::OnDemand => self.create_on_demand(&params).await?,
            LaunchStrategy::Spot {
                bid_price,
                ondemand_fallback,
            } => {
                let spot_params = self.with_security_group_ids(&params).await;
                match self.spot_tracker.create(&spot_params, bid_price).await {
                    Ok(fulfillment) => fulfillment.instance_id,
                    Err(err @ ProvisionerError::VmCreationFailed {
                        ok_to_retry: false, ..
                    }) if ondemand_fallback => {
                        info!(
                            agent_id = %spec.agent_id,
                            error = %err,
                            "Spot instance creation failed, falling back to on-demand instance"
                        );
                        self.create_on_demand(&params).await?
                    }
                    Err(err) => {
                        warn!(agent_id = %spec.agent_id, error = %err, "Spot instance creation failed");
                        return Err(err);
                    }
                }
            }
        };

        let instance = self.find(&instance_id);
        if let Err(err) = self.configure(&instance, &spec.vm_type).await {
            warn!(instance_id = %instance_id, error = %err, "Failed to configure instance");
            if let Err(terminate_err) = instance.terminate().await {
                error!(
                    instance_id = %instance_id,
                    error = %terminate_err,
                    "Failed to terminate mis-configured instance"
                );
            }
            return Err(err);
        }

        info!(instance_id = %instance_id, agent_id = %spec.agent_id, "Created instance");
        Ok(instance)
    }

    /// Handle for `instance_id`. Existence is not checked.
    pub fn find(&self, instance_id: &str) -> Instance {
        Instance::new(
            instance_id,
            self.compute.clone(),
            self.load_balancers.clone(),
            self.waiter.clone(),
        )
    }

    /// The co-located instance's zone is reported as the subnet hint.
    async fn resolve_zone(&self, spec: &InstanceSpec) -> ProvisionerResult<Option<String>> {
        let existing_zone = match spec
            .disk_locality
            .instance_id
            .as_deref()
            .filter(|id| !id.is_empty())
        {
            Some(instance_id) => Some(
                self.zone_selector
                    .select_availability_zone(Some(instance_id))
                    .await?,
            ),
            None => None,
        };

        self.zone_selector.common_availability_zone(
            &spec.disk_locality.volume_zones(),
            spec.vm_type.requested_zone(),
            existing_zone.as_deref(),
        )
    }

    /// Spot bids only take security group ids. Names are swapped for ids when
    /// every one of them resolves; otherwise the params are left as they are.
    async fn with_security_group_ids(
        &self,
        params: &ProviderInstanceParams,
    ) -> ProviderInstanceParams {
        let names = params.security_group_names();
        if names.is_empty() {
            return params.clone();
        }

        let groups = match self.compute.describe_security_groups().await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(error = %err, "Failed to look up security groups");
                return params.clone();
            }
        };

        let group_ids: Option<Vec<String>> = names
            .iter()
            .map(|name| {
                groups
                    .iter()
                    .find(|group| &group.group_name == name)
                    .map(|group| group.group_id.clone())
            })
            .collect();

        let mut resolved = params.clone();
        match group_ids {
            Some(group_ids) => {
                debug!(security_groups = ?names, security_group_ids = ?group_ids, "Resolved security group names");
                resolved.set_security_group_ids(group_ids);
            }
            None => debug!(security_groups = ?names, "Security group names could not be resolved"),
        }
        resolved
    }

    /// Launches exactly one instance, retrying while its private IP is still
    /// held by a previous instance.
    async fn create_on_demand(&self, params: &ProviderInstanceParams) -> ProvisionerResult<String> {
        let mut params = params.clone();
        params.set_instance_count(1);

        loop {
            match self.compute.create_instances(&params).await {
                Ok(instance_id) => {
                    info!(instance_id = %instance_id, "Launched on-demand instance");
                    return Ok(instance_id);
                }
                Err(err) if err.is_address_in_use() => {
                    warn!(
                        error = %err,
                        retry_in = ?self.config.instance_create_wait,
                        "IP address was in use, retrying instance creation"
                    );
                    self.sleeper.sleep(self.config.instance_create_wait).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn configure(
        &self,
        instance: &Instance,
        vm_type: &VmTypeProperties,
    ) -> ProvisionerResult<()> {
        if vm_type.disables_source_dest_check() {
            instance.disable_source_dest_check().await?;
        }
        instance.wait_for_running(&self.config.running_wait).await?;
        instance.attach_to_load_balancers(&vm_type.elbs).await?;
        Ok(())
    }
}
