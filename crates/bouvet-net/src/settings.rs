//! Network settings handed to the manager by the agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role tag: the network supplies DNS servers.
pub const ROLE_DNS: &str = "dns";

/// Role tag: the network supplies the default gateway.
pub const ROLE_GATEWAY: &str = "gateway";

/// One named network definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    /// Roles this network is the default for (`"dns"`, `"gateway"`).
    pub default: Vec<String>,
    /// Static IPv4 address. Empty for DHCP networks.
    pub ip: String,
    /// Dotted-quad netmask.
    pub netmask: String,
    /// Gateway address.
    pub gateway: String,
    /// Hardware address of the interface this network is attached to.
    pub mac: String,
    /// DNS servers, in priority order.
    pub dns: Vec<String>,
}

impl Network {
    /// Returns true if this network lists `role` in its defaults.
    pub fn is_default_for(&self, role: &str) -> bool {
        self.default.iter().any(|r| r == role)
    }

    /// Returns true if the network carries a static address.
    pub fn is_static(&self) -> bool {
        !self.ip.is_empty()
    }
}

/// Named networks, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Networks(BTreeMap<String, Network>);

impl Networks {
    /// Create an empty set of networks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a network.
    pub fn insert(&mut self, name: impl Into<String>, network: Network) -> Option<Network> {
        self.0.insert(name.into(), network)
    }

    /// Look up a network by name.
    pub fn get(&self, name: &str) -> Option<&Network> {
        self.0.get(name)
    }

    /// Mutable lookup by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Network> {
        self.0.get_mut(name)
    }

    /// Number of networks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no networks.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(name, network)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Network)> {
        self.0.iter().map(|(name, net)| (name.as_str(), net))
    }

    /// Returns the network supplying `role`.
    ///
    /// A lone network supplies every role. Otherwise the first network, in
    /// name order, that lists `role` in its defaults wins.
    pub fn default_network_for(&self, role: &str) -> Option<(&str, &Network)> {
        if self.0.len() == 1 {
            return self.iter().next();
        }
        self.iter().find(|(_, net)| net.is_default_for(role))
    }

    /// DNS servers of every DNS-providing network, concatenated in name order.
    pub fn dns_servers(&self) -> Vec<String> {
        if self.0.len() == 1 {
            return self.iter().flat_map(|(_, net)| net.dns.clone()).collect();
        }
        self.iter()
            .filter(|(_, net)| net.is_default_for(ROLE_DNS))
            .flat_map(|(_, net)| net.dns.iter().cloned())
            .collect()
    }
}

impl FromIterator<(String, Network)> for Networks {
    fn from_iter<I: IntoIterator<Item = (String, Network)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(default: &[&str], dns: &[&str]) -> Network {
        Network {
            default: default.iter().map(|s| s.to_string()).collect(),
            dns: dns.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_network_is_default_for_everything() {
        let networks: Networks = [("bosh".to_string(), network(&[], &["1.1.1.1"]))]
            .into_iter()
            .collect();

        let (name, _) = networks.default_network_for(ROLE_GATEWAY).unwrap();
        assert_eq!(name, "bosh");
        assert_eq!(networks.dns_servers(), vec!["1.1.1.1"]);
    }

    #[test]
    fn test_default_network_for_picks_role_holder() {
        let networks: Networks = [
            ("bosh".to_string(), network(&["dns"], &["10.0.0.2"])),
            ("vip".to_string(), network(&["gateway"], &[])),
        ]
        .into_iter()
        .collect();

        assert_eq!(networks.default_network_for(ROLE_DNS).unwrap().0, "bosh");
        assert_eq!(networks.default_network_for(ROLE_GATEWAY).unwrap().0, "vip");
        assert!(networks.default_network_for("ntp").is_none());
    }

    #[test]
    fn test_dns_servers_skip_networks_without_dns_role() {
        let networks: Networks = [
            (
                "bosh".to_string(),
                network(&["dns"], &["xx.xx.xx.xx", "yy.yy.yy.yy"]),
            ),
            ("vip".to_string(), network(&[], &["aa.aa.aa.aa"])),
        ]
        .into_iter()
        .collect();

        assert_eq!(networks.dns_servers(), vec!["xx.xx.xx.xx", "yy.yy.yy.yy"]);
    }

    #[test]
    fn test_dns_servers_concatenate_in_name_order() {
        let networks: Networks = [
            ("b".to_string(), network(&["dns"], &["2.2.2.2"])),
            ("a".to_string(), network(&["dns"], &["1.1.1.1", "1.0.0.1"])),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            networks.dns_servers(),
            vec!["1.1.1.1", "1.0.0.1", "2.2.2.2"]
        );
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let networks: Networks = serde_json::from_str(
            r#"{"bosh": {"default": ["dns"], "dns": ["8.8.8.8"]}, "vip": {}}"#,
        )
        .unwrap();

        assert_eq!(networks.len(), 2);
        assert_eq!(networks.get("bosh").unwrap().dns, vec!["8.8.8.8"]);
        assert!(!networks.get("vip").unwrap().is_static());
    }
}
