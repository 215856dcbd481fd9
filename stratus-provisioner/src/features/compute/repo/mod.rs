use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stratus_core::{
    InstanceDescription, InstanceState, ProviderError, ProviderInstanceParams, ProviderResult,
    SecurityGroup, SpotInstanceRequest, SpotRequestDescription, SpotRequestState,
};
use uuid::Uuid;

/// Compute API of a single provider region
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Launch on-demand instances, returning the id of the created instance
    async fn create_instances(&self, params: &ProviderInstanceParams) -> ProviderResult<String>;

    /// Submit a spot bid, returning the provider-assigned request id
    async fn request_spot_instances(&self, request: &SpotInstanceRequest)
        -> ProviderResult<String>;

    async fn describe_spot_requests(
        &self,
        request_ids: &[String],
    ) -> ProviderResult<Vec<SpotRequestDescription>>;

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> ProviderResult<()>;

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()>;

    /// Zones currently available in `region`
    async fn list_zones(&self, region: &str) -> ProviderResult<Vec<String>>;

    async fn get_instance(&self, instance_id: &str) -> ProviderResult<InstanceDescription>;

    async fn set_source_dest_check(&self, instance_id: &str, enabled: bool)
        -> ProviderResult<()>;

    /// Security groups visible to the account in this region
    async fn describe_security_groups(&self) -> ProviderResult<Vec<SecurityGroup>>;
}

/// Load balancer API used to register freshly booted instances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    async fn register_instance(&self, load_balancer: &str, instance_id: &str)
        -> ProviderResult<()>;
}

#[derive(Debug, Clone)]
struct SimulatedSpotRequest {
    description: SpotRequestDescription,
    launch_specification: ProviderInstanceParams,
}

#[derive(Debug, Default)]
struct RegionState {
    instances: HashMap<String, InstanceDescription>,
    spot_requests: HashMap<String, SimulatedSpotRequest>,
    security_groups: Vec<SecurityGroup>,
}

/// In-memory region. Instances boot on their first lookup and spot bids are
/// satisfied on their first describe.
#[derive(Clone)]
pub struct InMemoryComputeClient {
    region: String,
    zones: Vec<String>,
    state: Arc<RwLock<RegionState>>,
}

impl InMemoryComputeClient {
    pub fn new(region: impl Into<String>, zones: Vec<String>) -> Self {
        Self {
            region: region.into(),
            zones,
            state: Arc::new(RwLock::new(RegionState::default())),
        }
    }

    /// Seeds an instance that already exists in the region.
    pub fn with_instance(self, description: InstanceDescription) -> ProviderResult<Self> {
        self.write()?
            .instances
            .insert(description.instance_id.clone(), description);
        Ok(self)
    }

    pub fn with_security_group(self, group: SecurityGroup) -> ProviderResult<Self> {
        self.write()?.security_groups.push(group);
        Ok(self)
    }

    pub fn instances(&self) -> ProviderResult<Vec<InstanceDescription>> {
        Ok(self.read()?.instances.values().cloned().collect())
    }

    pub fn spot_request_state(&self, request_id: &str) -> ProviderResult<Option<SpotRequestState>> {
        Ok(self
            .read()?
            .spot_requests
            .get(request_id)
            .map(|request| request.description.state))
    }

    fn read(&self) -> ProviderResult<RwLockReadGuard<'_, RegionState>> {
        self.state
            .read()
            .map_err(|_| ProviderError::Unavailable("region state lock poisoned".to_string()))
    }

    fn write(&self) -> ProviderResult<RwLockWriteGuard<'_, RegionState>> {
        self.state
            .write()
            .map_err(|_| ProviderError::Unavailable("region state lock poisoned".to_string()))
    }

    fn launch_zone(&self, params: &ProviderInstanceParams) -> ProviderResult<String> {
        match params.availability_zone() {
            Some(zone) if self.zones.iter().any(|known| known == zone) => Ok(zone.to_string()),
            Some(zone) => Err(ProviderError::InvalidParameter(format!(
                "availability zone {zone} does not exist in {}",
                self.region
            ))),
            None => self.zones.first().cloned().ok_or_else(|| {
                ProviderError::Unavailable(format!("no availability zones in {}", self.region))
            }),
        }
    }

    fn launch(state: &mut RegionState, zone: String) -> String {
        let instance_id = format!("i-{}", &Uuid::new_v4().simple().to_string()[..17]);
        state
            .instances
            .insert(instance_id.clone(), InstanceDescription::new(&instance_id, zone));
        instance_id
    }
}

#[async_trait]
impl ComputeClient for InMemoryComputeClient {
    async fn create_instances(&self, params: &ProviderInstanceParams) -> ProviderResult<String> {
        let zone = self.launch_zone(params)?;
        let mut state = self.write()?;
        Ok(Self::launch(&mut state, zone))
    }

    async fn request_spot_instances(
        &self,
        request: &SpotInstanceRequest,
    ) -> ProviderResult<String> {
        if request.spot_price.parse::<f64>().map_or(true, |price| price <= 0.0) {
            return Err(ProviderError::InvalidParameter(format!(
                "invalid spot price \"{}\"",
                request.spot_price
            )));
        }
        self.launch_zone(&request.launch_specification)?;

        let request_id = format!("sir-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let mut state = self.write()?;
        state.spot_requests.insert(
            request_id.clone(),
            SimulatedSpotRequest {
                description: SpotRequestDescription::new(&request_id, SpotRequestState::Open)
                    .with_status_code("pending-evaluation"),
                launch_specification: request.launch_specification.clone(),
            },
        );
        Ok(request_id)
    }

    async fn describe_spot_requests(
        &self,
        request_ids: &[String],
    ) -> ProviderResult<Vec<SpotRequestDescription>> {
        let zones: Vec<Option<String>> = {
            let state = self.read()?;
            request_ids
                .iter()
                .map(|id| {
                    state
                        .spot_requests
                        .get(id)
                        .map(|request| request.launch_specification.clone())
                        .ok_or_else(|| ProviderError::SpotRequestNotFound(id.clone()))
                        .map(|spec| self.launch_zone(&spec).ok())
                })
                .collect::<ProviderResult<_>>()?
        };

        let mut state = self.write()?;
        let mut descriptions = Vec::with_capacity(request_ids.len());
        for (id, zone) in request_ids.iter().zip(zones) {
            let needs_instance = state
                .spot_requests
                .get(id)
                .map(|request| request.description.state == SpotRequestState::Open)
                .unwrap_or(false);

            if needs_instance {
                if let Some(zone) = zone {
                    let instance_id = Self::launch(&mut state, zone);
                    if let Some(request) = state.spot_requests.get_mut(id) {
                        request.description = SpotRequestDescription::new(
                            id.clone(),
                            SpotRequestState::Active,
                        )
                        .with_instance(instance_id)
                        .with_status_code("fulfilled");
                    }
                }
            }

            if let Some(request) = state.spot_requests.get(id) {
                descriptions.push(request.description.clone());
            }
        }
        Ok(descriptions)
    }

    async fn cancel_spot_requests(&self, request_ids: &[String]) -> ProviderResult<()> {
        let mut state = self.write()?;
        for id in request_ids {
            let request = state
                .spot_requests
                .get_mut(id)
                .ok_or_else(|| ProviderError::SpotRequestNotFound(id.clone()))?;
            request.description.state = SpotRequestState::Cancelled;
        }
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.write()?;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::InstanceNotFound(instance_id.to_string()))?;
        instance.state = InstanceState::Terminated;
        Ok(())
    }

    async fn list_zones(&self, region: &str) -> ProviderResult<Vec<String>> {
        if region != self.region {
            return Err(ProviderError::InvalidParameter(format!(
                "unknown region {region}"
            )));
        }
        Ok(self.zones.clone())
    }

    async fn get_instance(&self, instance_id: &str) -> ProviderResult<InstanceDescription> {
        let mut state = self.write()?;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::InstanceNotFound(instance_id.to_string()))?;
        let current = instance.clone();
        if instance.state == InstanceState::Pending {
            instance.state = InstanceState::Running;
        }
        Ok(current)
    }

    async fn set_source_dest_check(
        &self,
        instance_id: &str,
        enabled: bool,
    ) -> ProviderResult<()> {
        let mut state = self.write()?;
        let instance = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| ProviderError::InstanceNotFound(instance_id.to_string()))?;
        instance.source_dest_check = enabled;
        Ok(())
    }

    async fn describe_security_groups(&self) -> ProviderResult<Vec<SecurityGroup>> {
        Ok(self.read()?.security_groups.clone())
    }
}

/// In-memory load balancer registrations, keyed by load balancer name
#[derive(Clone, Default)]
pub struct InMemoryLoadBalancerClient {
    registrations: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl InMemoryLoadBalancerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self, load_balancer: &str) -> Vec<String> {
        self.registrations
            .read()
            .ok()
            .and_then(|registrations| registrations.get(load_balancer).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LoadBalancerClient for InMemoryLoadBalancerClient {
    async fn register_instance(
        &self,
        load_balancer: &str,
        instance_id: &str,
    ) -> ProviderResult<()> {
        let mut registrations = self.registrations.write().map_err(|_| {
            ProviderError::Unavailable("load balancer state lock poisoned".to_string())
        })?;
        let members = registrations.entry(load_balancer.to_string()).or_default();
        if !members.iter().any(|member| member == instance_id) {
            members.push(instance_id.to_string());
        }
        Ok(())
    }
}
