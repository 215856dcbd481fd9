//! Availability zone reconciliation.
//!
//! A VM can be pinned to a zone by three independent hints: the zone of the
//! instance or subnet it has to sit next to, the zone requested by its VM
//! type, and the zones of the volumes that will be attached to it. All
//! present hints must name the same zone. Disagreement is never resolved by
//! preference or majority.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("can't use multiple availability zones: {sources}")]
pub struct PlacementError {
    pub subnet_zone: Option<String>,
    pub vm_zone: Option<String>,
    pub volume_zones: Vec<String>,
    sources: String,
}

impl PlacementError {
    fn new(subnet_zone: Option<&str>, vm_zone: Option<&str>, volume_zones: &[String]) -> Self {
        let mut described = Vec::new();
        if let Some(zone) = subnet_zone {
            described.push(format!("subnet in {zone}"));
        }
        if let Some(zone) = vm_zone {
            described.push(format!("VM in {zone}"));
        }

        let mut sources = described.join(", ");
        if !volume_zones.is_empty() {
            let volumes = format!("volume in {}", volume_zones.join(", "));
            if sources.is_empty() {
                sources = volumes;
            } else {
                sources = format!("{sources}, and {volumes}");
            }
        }

        Self {
            subnet_zone: subnet_zone.map(ToString::to_string),
            vm_zone: vm_zone.map(ToString::to_string),
            volume_zones: volume_zones.to_vec(),
            sources,
        }
    }

    /// The conflicting sources, in subnet, VM, volume order.
    pub fn sources(&self) -> &str {
        &self.sources
    }
}

/// Returns the single zone implied by all present hints, or `None` when no
/// hint constrains placement. Blank strings count as absent and repeated
/// volume zones count once.
pub fn common_availability_zone(
    volume_zones: &[String],
    vm_zone: Option<&str>,
    subnet_zone: Option<&str>,
) -> Result<Option<String>, PlacementError> {
    let vm_zone = vm_zone.filter(|zone| !zone.is_empty());
    let subnet_zone = subnet_zone.filter(|zone| !zone.is_empty());

    let mut unique_volume_zones: Vec<String> = Vec::new();
    for zone in volume_zones.iter().filter(|zone| !zone.is_empty()) {
        if !unique_volume_zones.contains(zone) {
            unique_volume_zones.push(zone.clone());
        }
    }

    let distinct: BTreeSet<String> = subnet_zone
        .into_iter()
        .chain(vm_zone)
        .map(ToString::to_string)
        .chain(unique_volume_zones.iter().cloned())
        .collect();

    if distinct.len() > 1 {
        return Err(PlacementError::new(
            subnet_zone,
            vm_zone,
            &unique_volume_zones,
        ));
    }

    let zone = distinct.into_iter().next();
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_conflict_with_volume_information() {
        let err = common_availability_zone(
            &zones(&["this_zone", "that_zone"]),
            Some("other_zone"),
            Some("another_zone"),
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "can't use multiple availability zones: subnet in another_zone, VM in other_zone, and volume in this_zone, that_zone"
        );
    }

    #[test]
    fn test_conflict_without_volume_information() {
        let err = common_availability_zone(&[], Some("other_zone"), Some("another_zone"))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "can't use multiple availability zones: subnet in another_zone, VM in other_zone"
        );
    }

    #[test]
    fn test_conflict_between_volumes_only() {
        let err = common_availability_zone(&zones(&["us-east-1a", "us-east-1b"]), None, None)
            .unwrap_err();

        assert_eq!(err.sources(), "volume in us-east-1a, us-east-1b");
        assert_eq!(err.vm_zone, None);
    }

    #[test]
    fn test_selects_common_zone() {
        let zone =
            common_availability_zone(&zones(&["this_zone"]), Some("this_zone"), None).unwrap();
        assert_eq!(zone.as_deref(), Some("this_zone"));
    }

    #[test]
    fn test_no_hints_means_no_constraint() {
        assert_eq!(common_availability_zone(&[], None, None).unwrap(), None);
        assert_eq!(
            common_availability_zone(&zones(&[""]), Some(""), Some("")).unwrap(),
            None
        );
    }

    #[test]
    fn test_duplicate_volume_zones_agree() {
        let zone = common_availability_zone(
            &zones(&["us-east-1c", "us-east-1c"]),
            None,
            Some("us-east-1c"),
        )
        .unwrap();
        assert_eq!(zone.as_deref(), Some("us-east-1c"));
    }

    #[test]
    fn test_conflict_lists_each_volume_zone_once() {
        let err = common_availability_zone(
            &zones(&["us-east-1a", "us-east-1c", "us-east-1a"]),
            Some("us-east-1b"),
            None,
        )
        .unwrap_err();

        assert_eq!(
            err.sources(),
            "VM in us-east-1b, and volume in us-east-1a, us-east-1c"
        );
        assert_eq!(err.volume_zones, zones(&["us-east-1a", "us-east-1c"]));
    }

    #[test]
    fn test_owned_result_outlives_inputs() {
        let zone = {
            let volumes = zones(&["us-west-2b"]);
            common_availability_zone(&volumes, None, None).unwrap()
        };
        assert_eq!(zone, Some("us-west-2b".to_string()));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn zone_strategy() -> impl Strategy<Value = String> {
            "[a-z]{2}-[a-z]{4}-[1-3][a-f]"
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn property_agreeing_hints_resolve_to_their_zone(
                zone in zone_strategy(),
                volume_count in 0usize..4,
                with_vm in any::<bool>(),
                with_subnet in any::<bool>(),
            ) {
                let volumes = vec![zone.clone(); volume_count];
                let vm = with_vm.then_some(zone.as_str());
                let subnet = with_subnet.then_some(zone.as_str());

                let resolved = common_availability_zone(&volumes, vm, subnet).unwrap();
                if volume_count == 0 && !with_vm && !with_subnet {
                    prop_assert_eq!(resolved, None);
                } else {
                    prop_assert_eq!(resolved, Some(zone));
                }
            }

            #[test]
            fn property_disagreeing_hints_always_fail(
                first in zone_strategy(),
                second in zone_strategy(),
                volumes in prop::collection::vec(zone_strategy(), 0..3),
            ) {
                prop_assume!(first != second);

                let err = common_availability_zone(&volumes, Some(&first), Some(&second))
                    .unwrap_err();
                let message = err.to_string();

                let subnet_part = format!("subnet in {second}");
                let vm_part = format!("VM in {first}");
                let subnet_at = message.find(&subnet_part).unwrap();
                let vm_at = message.find(&vm_part).unwrap();
                prop_assert!(subnet_at < vm_at);

                if !volumes.is_empty() {
                    let mut unique: Vec<String> = Vec::new();
                    for zone in &volumes {
                        if !unique.contains(zone) {
                            unique.push(zone.clone());
                        }
                    }
                    let volume_part = format!("volume in {}", unique.join(", "));
                    let volume_at = message.find(&volume_part).unwrap();
                    prop_assert!(vm_at < volume_at);
                } else {
                    prop_assert!(!message.contains("volume in"));
                }
            }
        }
    }
}
