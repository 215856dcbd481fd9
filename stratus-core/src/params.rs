//! Provider request parameters for launching an instance.
//!
//! The mapping is produced by a parameter builder and handed to the compute
//! provider as-is. Callers only touch the zone and instance count keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PLACEMENT_KEY: &str = "placement";
pub const AVAILABILITY_ZONE_KEY: &str = "availability_zone";
pub const MIN_COUNT_KEY: &str = "min_count";
pub const MAX_COUNT_KEY: &str = "max_count";
pub const SECURITY_GROUPS_KEY: &str = "security_groups";
pub const SECURITY_GROUP_IDS_KEY: &str = "security_group_ids";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderInstanceParams(Map<String, Value>);

impl ProviderInstanceParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Pins the launch to `zone`. An empty zone leaves placement to the provider.
    pub fn set_availability_zone(&mut self, zone: &str) {
        if zone.is_empty() {
            return;
        }
        let placement = self
            .0
            .entry(PLACEMENT_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(placement) = placement {
            placement.insert(
                AVAILABILITY_ZONE_KEY.to_string(),
                Value::String(zone.to_string()),
            );
        }
    }

    pub fn availability_zone(&self) -> Option<&str> {
        self.0
            .get(PLACEMENT_KEY)
            .and_then(|placement| placement.get(AVAILABILITY_ZONE_KEY))
            .and_then(Value::as_str)
    }

    pub fn set_instance_count(&mut self, count: u32) {
        self.insert(MIN_COUNT_KEY, count);
        self.insert(MAX_COUNT_KEY, count);
    }

    pub fn instance_count(&self) -> Option<u64> {
        self.0.get(MAX_COUNT_KEY).and_then(Value::as_u64)
    }

    /// Security groups referenced by name rather than by id.
    pub fn security_group_names(&self) -> Vec<String> {
        self.0
            .get(SECURITY_GROUPS_KEY)
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces groups referenced by name with the given ids.
    pub fn set_security_group_ids(&mut self, group_ids: Vec<String>) {
        self.0.remove(SECURITY_GROUPS_KEY);
        self.insert(SECURITY_GROUP_IDS_KEY, group_ids);
    }
}

impl From<Map<String, Value>> for ProviderInstanceParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
