use crate::shared::error::{ProvisionerError, ProvisionerResult};
use crate::shared::types::{GlobalConfig, InstanceSpec, Network, NetworkType};
use serde_json::{json, Map, Value};
use stratus_core::params::{PLACEMENT_KEY, SECURITY_GROUPS_KEY, SECURITY_GROUP_IDS_KEY};
use stratus_core::ProviderInstanceParams;

/// Translates an instance spec into provider launch parameters
pub trait ParameterBuilder: Send + Sync {
    /// Rejects structurally invalid specs before anything is created.
    fn validate(&self, spec: &InstanceSpec, global: &GlobalConfig) -> ProvisionerResult<()>;

    fn build_instance_params(
        &self,
        spec: &InstanceSpec,
        global: &GlobalConfig,
        availability_zone: Option<&str>,
    ) -> ProvisionerResult<ProviderInstanceParams>;
}

/// Default mapping onto the compute provider's launch request
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceParamMapper;

impl InstanceParamMapper {
    pub fn new() -> Self {
        Self
    }

    fn key_name<'a>(spec: &'a InstanceSpec, global: &'a GlobalConfig) -> Option<&'a str> {
        spec.vm_type
            .key_name
            .as_deref()
            .or(global.default_key_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Groups from the VM type win over network groups, which win over the
    /// global defaults.
    fn security_groups<'a>(spec: &'a InstanceSpec, global: &'a GlobalConfig) -> Vec<&'a str> {
        if !spec.vm_type.security_groups.is_empty() {
            return spec.vm_type.security_groups.iter().map(String::as_str).collect();
        }

        let mut from_networks: Vec<&str> = Vec::new();
        for network in spec.networks.values() {
            for group in &network.cloud_properties.security_groups {
                if !from_networks.contains(&group.as_str()) {
                    from_networks.push(group);
                }
            }
        }
        if !from_networks.is_empty() {
            return from_networks;
        }

        global
            .default_security_groups
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// The manual network carries the private IP; otherwise the first
    /// network with a subnet decides where the VM is attached.
    fn primary_network(spec: &InstanceSpec) -> Option<&Network> {
        spec.networks
            .values()
            .find(|network| network.network_type == NetworkType::Manual)
            .or_else(|| {
                spec.networks.values().find(|network| {
                    network.network_type != NetworkType::Vip
                        && network.cloud_properties.subnet.is_some()
                })
            })
    }

    fn user_data(spec: &InstanceSpec) -> ProvisionerResult<String> {
        let user_data = json!({
            "agent_id": spec.agent_id,
            "env": Value::Object(spec.environment.clone()),
        });
        serde_json::to_string(&user_data).map_err(|error| {
            ProvisionerError::ValidationError(format!("cannot encode user data: {error}"))
        })
    }
}

fn is_group_id(group: &str) -> bool {
    group.starts_with("sg-")
}

impl ParameterBuilder for InstanceParamMapper {
    fn validate(&self, spec: &InstanceSpec, global: &GlobalConfig) -> ProvisionerResult<()> {
        if spec.stemcell_id.is_empty() {
            return Err(ProvisionerError::ValidationError(
                "stemcell_id cannot be empty".to_string(),
            ));
        }

        if spec
            .vm_type
            .instance_type
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(ProvisionerError::ValidationError(
                "missing vm_type property: instance_type".to_string(),
            ));
        }

        if let Some(bid_price) = spec.vm_type.spot_bid_price {
            if !bid_price.is_finite() || bid_price <= 0.0 {
                return Err(ProvisionerError::ValidationError(format!(
                    "spot_bid_price must be a positive number, got: {bid_price}"
                )));
            }
        }

        if Self::key_name(spec, global).is_none() {
            return Err(ProvisionerError::ValidationError(
                "missing key_name: set it on the vm_type or as default_key_name".to_string(),
            ));
        }

        if spec.networks.is_empty() {
            return Err(ProvisionerError::ValidationError(
                "at least one network is required".to_string(),
            ));
        }

        let manual_networks = spec
            .networks
            .values()
            .filter(|network| network.network_type == NetworkType::Manual)
            .count();
        if manual_networks > 1 {
            return Err(ProvisionerError::ValidationError(
                "only one manual network is supported".to_string(),
            ));
        }

        let groups = Self::security_groups(spec, global);
        let ids = groups.iter().filter(|group| is_group_id(group)).count();
        if ids != 0 && ids != groups.len() {
            return Err(ProvisionerError::ValidationError(format!(
                "security groups must be all ids or all names, got: {}",
                groups.join(", ")
            )));
        }

        Ok(())
    }

    fn build_instance_params(
        &self,
        spec: &InstanceSpec,
        global: &GlobalConfig,
        availability_zone: Option<&str>,
    ) -> ProvisionerResult<ProviderInstanceParams> {
        let vm_type = &spec.vm_type;
        let mut params = ProviderInstanceParams::new()
            .with("image_id", spec.stemcell_id.as_str())
            .with("user_data", Self::user_data(spec)?);

        if let Some(instance_type) = vm_type.instance_type.as_deref() {
            params.insert("instance_type", instance_type);
        }
        if let Some(key_name) = Self::key_name(spec, global) {
            params.insert("key_name", key_name);
        }

        if let Some(network) = Self::primary_network(spec) {
            if let Some(subnet) = network.cloud_properties.subnet.as_deref() {
                params.insert("subnet_id", subnet);
            }
            if network.network_type == NetworkType::Manual {
                if let Some(ip) = network.ip.as_deref() {
                    params.insert("private_ip_address", ip);
                }
            }
        }

        let groups = Self::security_groups(spec, global);
        if !groups.is_empty() {
            let key = if groups.iter().all(|group| is_group_id(group)) {
                SECURITY_GROUP_IDS_KEY
            } else {
                SECURITY_GROUPS_KEY
            };
            params.insert(key, json!(groups));
        }

        if let Some(profile) = vm_type.iam_instance_profile.as_deref() {
            params.insert("iam_instance_profile", json!({ "name": profile }));
        }

        let mut placement = Map::new();
        if let Some(group) = vm_type.placement_group.as_deref() {
            placement.insert("group_name".to_string(), json!(group));
        }
        if let Some(tenancy) = vm_type.tenancy.as_deref() {
            placement.insert("tenancy".to_string(), json!(tenancy));
        }
        if !placement.is_empty() {
            params.insert(PLACEMENT_KEY, Value::Object(placement));
        }

        if let Some(zone) = availability_zone {
            params.set_availability_zone(zone);
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::VmTypeProperties;

    fn spec() -> InstanceSpec {
        let mut vm_type = VmTypeProperties::new("m1.small");
        vm_type.key_name = Some("bosh".to_string());
        InstanceSpec::new("agent-id", "ami-1234", vm_type)
            .with_network("default", Network::dynamic("subnet-default"))
    }

    fn global() -> GlobalConfig {
        GlobalConfig::new("us-east-1")
    }

    #[test]
    fn test_valid_spec() {
        assert!(InstanceParamMapper::new().validate(&spec(), &global()).is_ok());
    }

    #[test]
    fn test_requires_instance_type() {
        let mut spec = spec();
        spec.vm_type.instance_type = None;

        let result = InstanceParamMapper::new().validate(&spec, &global());
        assert!(matches!(
            result,
            Err(ProvisionerError::ValidationError(msg)) if msg.contains("instance_type")
        ));
    }

    #[test]
    fn test_rejects_unusable_spot_bid_price() {
        for bid_price in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let mut spec = spec();
            spec.vm_type.spot_bid_price = Some(bid_price);

            let result = InstanceParamMapper::new().validate(&spec, &global());
            assert!(
                matches!(
                    &result,
                    Err(ProvisionerError::ValidationError(msg)) if msg.contains("spot_bid_price")
                ),
                "bid price {bid_price} was accepted"
            );
        }

        let mut spec = spec();
        spec.vm_type.spot_bid_price = Some(0.15);
        assert!(InstanceParamMapper::new().validate(&spec, &global()).is_ok());
    }

    #[test]
    fn test_key_name_falls_back_to_default() {
        let mut spec = spec();
        spec.vm_type.key_name = None;
        assert!(InstanceParamMapper::new().validate(&spec, &global()).is_err());

        let mut global = global();
        global.default_key_name = Some("default-key".to_string());
        assert!(InstanceParamMapper::new().validate(&spec, &global).is_ok());

        let params = InstanceParamMapper::new()
            .build_instance_params(&spec, &global, None)
            .unwrap();
        assert_eq!(params.get("key_name"), Some(&json!("default-key")));
    }

    #[test]
    fn test_requires_a_network() {
        let mut spec = spec();
        spec.networks.clear();
        assert!(InstanceParamMapper::new().validate(&spec, &global()).is_err());
    }

    #[test]
    fn test_rejects_multiple_manual_networks() {
        let spec = spec()
            .with_network("a", Network::manual("subnet-a", "10.0.0.5"))
            .with_network("b", Network::manual("subnet-b", "10.0.1.5"));
        assert!(InstanceParamMapper::new().validate(&spec, &global()).is_err());
    }

    #[test]
    fn test_rejects_mixed_security_group_kinds() {
        let mut spec = spec();
        spec.vm_type.security_groups = vec!["sg-1234abcd".to_string(), "web".to_string()];

        let result = InstanceParamMapper::new().validate(&spec, &global());
        assert!(matches!(
            result,
            Err(ProvisionerError::ValidationError(msg)) if msg.contains("all ids or all names")
        ));
    }

    #[test]
    fn test_builds_launch_params() {
        let mut spec = spec();
        spec.vm_type.iam_instance_profile = Some("director".to_string());
        spec.vm_type.placement_group = Some("pg-1".to_string());
        spec.environment
            .insert("bosh".to_string(), json!({"password": "secret"}));

        let params = InstanceParamMapper::new()
            .build_instance_params(&spec, &global(), Some("us-east-1a"))
            .unwrap();

        assert_eq!(params.get("image_id"), Some(&json!("ami-1234")));
        assert_eq!(params.get("instance_type"), Some(&json!("m1.small")));
        assert_eq!(params.get("key_name"), Some(&json!("bosh")));
        assert_eq!(params.get("subnet_id"), Some(&json!("subnet-default")));
        assert_eq!(
            params.get("iam_instance_profile"),
            Some(&json!({"name": "director"}))
        );
        assert_eq!(
            params.get(PLACEMENT_KEY),
            Some(&json!({"group_name": "pg-1", "availability_zone": "us-east-1a"}))
        );
        assert!(!params.contains_key("private_ip_address"));

        let user_data: Value =
            serde_json::from_str(params.get("user_data").and_then(Value::as_str).unwrap())
                .unwrap();
        assert_eq!(user_data["agent_id"], json!("agent-id"));
        assert_eq!(user_data["env"]["bosh"]["password"], json!("secret"));
    }

    #[test]
    fn test_manual_network_sets_private_ip() {
        let spec = spec().with_network("private", Network::manual("subnet-123456", "1.2.3.4"));

        let params = InstanceParamMapper::new()
            .build_instance_params(&spec, &global(), None)
            .unwrap();
        assert_eq!(params.get("subnet_id"), Some(&json!("subnet-123456")));
        assert_eq!(params.get("private_ip_address"), Some(&json!("1.2.3.4")));
    }

    #[test]
    fn test_no_zone_means_no_placement() {
        let params = InstanceParamMapper::new()
            .build_instance_params(&spec(), &global(), None)
            .unwrap();
        assert!(!params.contains_key(PLACEMENT_KEY));

        let params = InstanceParamMapper::new()
            .build_instance_params(&spec(), &global(), Some(""))
            .unwrap();
        assert!(!params.contains_key(PLACEMENT_KEY));
    }

    #[test]
    fn test_security_group_precedence() {
        let mut global = global();
        global.default_security_groups = vec!["default".to_string()];

        let params = InstanceParamMapper::new()
            .build_instance_params(&spec(), &global, None)
            .unwrap();
        assert_eq!(params.security_group_names(), vec!["default".to_string()]);

        let mut network = Network::dynamic("subnet-default");
        network.cloud_properties.security_groups = vec!["sg-0001".to_string()];
        let spec = spec().with_network("default", network);
        let params = InstanceParamMapper::new()
            .build_instance_params(&spec, &global, None)
            .unwrap();
        assert!(params.security_group_names().is_empty());
        assert_eq!(params.get(SECURITY_GROUP_IDS_KEY), Some(&json!(["sg-0001"])));

        let mut spec = spec;
        spec.vm_type.security_groups = vec!["web".to_string()];
        let params = InstanceParamMapper::new()
            .build_instance_params(&spec, &global, None)
            .unwrap();
        assert_eq!(params.security_group_names(), vec!["web".to_string()]);
    }
}
