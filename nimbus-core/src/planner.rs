//! Topology planning.
//!
//! The topology is a pure function of (catalog, config): include every
//! non-optional service plus every optional service whose enable flag reads
//! exactly "yes", ordered by ascending tier. Shutdown is the same list
//! reversed, so no dependency stops before its dependents.

use crate::catalog;
use crate::config::ConfigMap;
use crate::types::service::{MountSource, ServiceSpec};
use std::collections::BTreeSet;
use tracing::debug;

/// The ordered, enablement-filtered list of services to act upon.
#[derive(Debug, Clone)]
pub struct Topology {
    services: Vec<&'static ServiceSpec>,
}

impl Topology {
    /// Services in start order.
    pub fn start_order(&self) -> &[&'static ServiceSpec] {
        &self.services
    }

    /// Services in shutdown order (exact reverse of start order).
    pub fn shutdown_order(&self) -> Vec<&'static ServiceSpec> {
        self.services.iter().rev().copied().collect()
    }

    /// Named volumes referenced by the in-scope services.
    pub fn volumes(&self) -> BTreeSet<&'static str> {
        self.services
            .iter()
            .flat_map(|s| s.launch.mounts.iter())
            .filter_map(|m| match m.source {
                MountSource::Volume(name) => Some(name),
                MountSource::HostPath(_) => None,
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Compute the topology for a configuration.
///
/// Unknown, absent, or misspelled enable flags read as disabled.
pub fn plan(config: &ConfigMap) -> Topology {
    let mut services: Vec<&'static ServiceSpec> = catalog::catalog()
        .iter()
        .filter(|spec| match spec.enable_flag {
            None => true,
            Some(flag) => config.enabled(flag),
        })
        .collect();

    // Stable sort: catalog order breaks ties within a tier.
    services.sort_by_key(|spec| spec.tier);

    debug!(
        services = %services.iter().map(|s| s.name).collect::<Vec<_>>().join(","),
        "planned topology"
    );
    Topology { services }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ConfigMap {
        ConfigMap::from_pairs([
            ("CLOUD_DOMAIN", "cloud.example.com"),
            ("ADMIN_PASSWORD", "admin"),
            ("DATABASE_PASSWORD", "db"),
            ("CACHE_PASSWORD", "cache"),
        ])
    }

    fn names(topology: &Topology) -> Vec<&str> {
        topology.start_order().iter().map(|s| s.name).collect()
    }

    #[test]
    fn core_only_when_all_flags_are_off() {
        let topology = plan(&base_config());
        assert_eq!(names(&topology), ["db", "cache", "server", "push", "proxy"]);
    }

    #[test]
    fn enabling_a_flag_inserts_the_service_at_its_tier() {
        let mut pairs: Vec<(&str, &str)> = vec![("CLAMAV_ENABLED", "yes")];
        pairs.extend([
            ("CLOUD_DOMAIN", "cloud.example.com"),
            ("ADMIN_PASSWORD", "admin"),
            ("DATABASE_PASSWORD", "db"),
            ("CACHE_PASSWORD", "cache"),
        ]);
        let topology = plan(&ConfigMap::from_pairs(pairs));
        assert_eq!(names(&topology), ["db", "cache", "clamav", "server", "push", "proxy"]);
    }

    #[test]
    fn misspelled_flag_values_fail_closed() {
        for value in ["Yes", "YES", "true", "1", "on", " yes"] {
            let config = ConfigMap::from_pairs([("CLAMAV_ENABLED", value)]);
            let topology = plan(&config);
            assert!(!topology.contains("clamav"), "value `{}` should not enable", value);
        }
    }

    #[test]
    fn shutdown_is_the_exact_reverse_of_startup() {
        let all_on = ConfigMap::from_pairs([
            ("CLAMAV_ENABLED", "yes"),
            ("COLLABORA_ENABLED", "yes"),
            ("ONLYOFFICE_ENABLED", "yes"),
            ("TALK_ENABLED", "yes"),
            ("TALK_RECORDING_ENABLED", "yes"),
            ("IMAGINARY_ENABLED", "yes"),
            ("FULLTEXTSEARCH_ENABLED", "yes"),
            ("WHITEBOARD_ENABLED", "yes"),
        ]);
        let topology = plan(&all_on);
        assert_eq!(topology.len(), 13);

        let mut reversed: Vec<&str> =
            topology.shutdown_order().iter().map(|s| s.name).collect();
        reversed.reverse();
        assert_eq!(reversed, names(&topology));

        // Tiers are non-decreasing along the start order.
        let tiers: Vec<u32> = topology.start_order().iter().map(|s| s.tier).collect();
        assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn identical_config_yields_identical_topology() {
        let a = plan(&base_config());
        let b = plan(&base_config());
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn volumes_follow_enablement() {
        let core = plan(&base_config());
        assert_eq!(
            core.volumes().into_iter().collect::<Vec<_>>(),
            ["nimbus_cache", "nimbus_db", "nimbus_proxy", "nimbus_server"]
        );

        let with_clamav = plan(&ConfigMap::from_pairs([("CLAMAV_ENABLED", "yes")]));
        let extra: Vec<_> =
            with_clamav.volumes().difference(&core.volumes()).copied().collect();
        assert_eq!(extra, ["nimbus_clamav"]);
    }
}
