//! Applies network settings on Ubuntu guests.
//!
//! A setup call renders configuration, writes only what changed, restarts
//! networking only if something was written and finally hands the configured
//! addresses to an [`AddressBroadcaster`] on a background task. The call
//! returns once the configuration is in place; the broadcast outcome is
//! delivered on the optional [`BroadcastCompletion`] channel.

use crate::arp::AddressBroadcaster;
use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::interfaces::{interface_for_mac, MacAddressDetector};
use crate::ip::{InterfaceAddress, IpResolver};
use crate::render::{render_dhclient_conf, render_interfaces, render_resolv_conf, StaticInterface};
use crate::restart::NetworkRestarter;
use crate::settings::{Networks, ROLE_DNS, ROLE_GATEWAY};
use crate::system::{CmdRunner, FileSystem};
use crate::writer::write_if_changed;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Receives the outcome of the address broadcast started by a setup call.
pub type BroadcastCompletion = oneshot::Sender<Result<()>>;

/// Configures guest networking from agent settings.
#[async_trait]
pub trait NetManager: Send + Sync {
    /// Configure every interface for DHCP.
    async fn setup_dhcp(
        &self,
        networks: &Networks,
        completion: Option<BroadcastCompletion>,
    ) -> Result<()>;

    /// Configure static addresses for every network carrying an IP.
    async fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<BroadcastCompletion>,
    ) -> Result<()>;
}

/// [`NetManager`] for ifupdown based distributions.
#[derive(Clone)]
pub struct UbuntuNetManager {
    fs: Arc<dyn FileSystem>,
    cmd_runner: Arc<dyn CmdRunner>,
    ip_resolver: Arc<dyn IpResolver>,
    broadcaster: Arc<dyn AddressBroadcaster>,
    restarter: NetworkRestarter,
    detector: MacAddressDetector,
    config: NetConfig,
}

impl UbuntuNetManager {
    /// Create a manager over the given collaborators.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd_runner: Arc<dyn CmdRunner>,
        ip_resolver: Arc<dyn IpResolver>,
        broadcaster: Arc<dyn AddressBroadcaster>,
        config: NetConfig,
    ) -> Self {
        Self {
            detector: MacAddressDetector::new(fs.clone(), &config),
            restarter: NetworkRestarter::new(cmd_runner.clone()),
            fs,
            cmd_runner,
            ip_resolver,
            broadcaster,
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Distinct interfaces the DHCP networks are attached to.
    async fn dhcp_interfaces(&self, networks: &Networks) -> Result<Vec<String>> {
        let macs: Vec<&str> = networks
            .iter()
            .map(|(_, net)| net.mac.as_str())
            .filter(|mac| !mac.is_empty())
            .collect();

        if macs.is_empty() {
            debug!(
                interface = %self.config.default_interface,
                "no network names a MAC address, using default interface"
            );
            return Ok(vec![self.config.default_interface.clone()]);
        }

        let by_mac = self.detector.detect().await?;
        let mut interfaces = BTreeSet::new();
        for mac in macs {
            interfaces.insert(interface_for_mac(&by_mac, mac)?);
        }
        Ok(interfaces.into_iter().collect())
    }

    /// One stanza per static network, sorted by interface name.
    async fn static_interfaces(&self, networks: &Networks) -> Result<Vec<(StaticInterface, String)>> {
        let gateway_network = networks
            .default_network_for(ROLE_GATEWAY)
            .map(|(name, _)| name);

        let needs_detection = networks
            .iter()
            .any(|(_, net)| net.is_static() && !net.mac.is_empty());
        let by_mac = if needs_detection {
            self.detector.detect().await?
        } else {
            HashMap::new()
        };

        let mut stanzas: Vec<(StaticInterface, String)> = Vec::new();
        for (name, network) in networks.iter().filter(|(_, net)| net.is_static()) {
            let interface = if network.mac.is_empty() {
                self.config.default_interface.clone()
            } else {
                interface_for_mac(&by_mac, &network.mac)?
            };

            if stanzas.iter().any(|(s, _)| s.name == interface) {
                return Err(NetError::invalid_network(
                    name,
                    format!("interface '{}' is already configured by another network", interface),
                ));
            }

            let with_gateway = gateway_network == Some(name);
            let stanza = StaticInterface::from_network(name, &interface, network, with_gateway)?;
            stanzas.push((stanza, network.ip.clone()));
        }

        stanzas.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
        Ok(stanzas)
    }

    /// Run the broadcast in the background and report its outcome on `completion`.
    fn spawn_broadcast(
        &self,
        addresses: Vec<InterfaceAddress>,
        completion: Option<BroadcastCompletion>,
    ) {
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move {
            let count = addresses.len();
            let result = broadcaster.broadcast_mac_addresses(addresses).await;
            match &result {
                Ok(()) => info!(addresses = count, "address broadcast finished"),
                Err(e) => warn!(error = %e, "address broadcast failed"),
            }

            if let Some(completion) = completion {
                if completion.send(result).is_err() {
                    debug!("broadcast completion receiver dropped");
                }
            }
        });
    }
}

#[async_trait]
impl NetManager for UbuntuNetManager {
    async fn setup_dhcp(
        &self,
        networks: &Networks,
        completion: Option<BroadcastCompletion>,
    ) -> Result<()> {
        let dhclient3 = self.cmd_runner.command_exists("dhclient3");
        let conf_path = self.config.dhclient_conf_path(dhclient3);
        info!(
            networks = networks.len(),
            path = %conf_path.display(),
            "configuring DHCP networking"
        );

        let interfaces = self.dhcp_interfaces(networks).await?;
        let conf = render_dhclient_conf(networks);

        if write_if_changed(self.fs.as_ref(), &conf_path, &conf).await? {
            self.restarter.restart_dhcp().await?;
        }

        let addresses = interfaces
            .into_iter()
            .map(|iface| InterfaceAddress::resolving(iface, self.ip_resolver.clone()))
            .collect();
        self.spawn_broadcast(addresses, completion);
        Ok(())
    }

    async fn setup_manual_networking(
        &self,
        networks: &Networks,
        completion: Option<BroadcastCompletion>,
    ) -> Result<()> {
        info!(networks = networks.len(), "configuring static networking");

        let stanzas = self.static_interfaces(networks).await?;
        let dns = networks
            .default_network_for(ROLE_DNS)
            .map(|(_, net)| net.dns.clone())
            .unwrap_or_default();

        let interfaces_conf =
            render_interfaces(&stanzas.iter().map(|(s, _)| s.clone()).collect::<Vec<_>>());
        let resolv_conf = render_resolv_conf(&dns);

        let interfaces_changed =
            write_if_changed(self.fs.as_ref(), &self.config.interfaces_path(), &interfaces_conf)
                .await?;
        write_if_changed(self.fs.as_ref(), &self.config.resolv_conf_path(), &resolv_conf).await?;

        if interfaces_changed {
            let names: Vec<String> = stanzas.iter().map(|(s, _)| s.name.clone()).collect();
            self.restarter.restart_interfaces(&names).await?;
        }

        let addresses = stanzas
            .into_iter()
            .map(|(stanza, ip)| InterfaceAddress::simple(stanza.name, ip))
            .collect();
        self.spawn_broadcast(addresses, completion);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeAddressBroadcaster, FakeCmdRunner, FakeFileSystem, FakeIpResolver};
    use crate::settings::Network;

    struct Fixture {
        fs: Arc<FakeFileSystem>,
        runner: Arc<FakeCmdRunner>,
        broadcaster: Arc<FakeAddressBroadcaster>,
        manager: UbuntuNetManager,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(FakeFileSystem::new());
        let runner = Arc::new(FakeCmdRunner::new());
        let broadcaster = Arc::new(FakeAddressBroadcaster::new());
        let manager = UbuntuNetManager::new(
            fs.clone(),
            runner.clone(),
            Arc::new(FakeIpResolver::new()),
            broadcaster.clone(),
            NetConfig::default(),
        );
        Fixture {
            fs,
            runner,
            broadcaster,
            manager,
        }
    }

    fn static_network(ip: &str, mac: &str) -> Network {
        Network {
            ip: ip.to_string(),
            netmask: "255.255.255.0".to_string(),
            mac: mac.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dhcp_interfaces_deduplicated() {
        let f = fixture();
        let sys = f.manager.config().sys_class_net();
        f.fs.add_interface(&sys, "eth0", "22:00:0a:1f:ac:2a");
        f.fs.add_interface(&sys, "eth1", "22:00:0a:1f:ac:2b");

        let networks: Networks = [
            ("a".to_string(), static_network("", "22:00:0a:1f:ac:2b")),
            ("b".to_string(), static_network("", "22:00:0A:1F:AC:2B")),
            ("c".to_string(), static_network("", "")),
        ]
        .into_iter()
        .collect();

        let interfaces = f.manager.dhcp_interfaces(&networks).await.unwrap();
        assert_eq!(interfaces, vec!["eth1"]);
    }

    #[tokio::test]
    async fn test_dhcp_interfaces_default_without_macs() {
        let f = fixture();
        let networks: Networks = [("bosh".to_string(), Network::default())]
            .into_iter()
            .collect();

        let interfaces = f.manager.dhcp_interfaces(&networks).await.unwrap();
        assert_eq!(interfaces, vec!["eth0"]);
    }

    #[tokio::test]
    async fn test_static_interfaces_reject_shared_interface() {
        let f = fixture();
        let sys = f.manager.config().sys_class_net();
        f.fs.add_interface(&sys, "eth0", "22:00:0a:1f:ac:2a");

        let networks: Networks = [
            ("a".to_string(), static_network("10.0.0.5", "22:00:0a:1f:ac:2a")),
            ("b".to_string(), static_network("10.0.1.5", "22:00:0a:1f:ac:2a")),
        ]
        .into_iter()
        .collect();

        let err = f.manager.static_interfaces(&networks).await.unwrap_err();
        assert!(matches!(err, NetError::InvalidNetwork { ref network, .. } if network == "b"));
    }

    #[tokio::test]
    async fn test_static_interfaces_gateway_only_on_gateway_network() {
        let f = fixture();
        let sys = f.manager.config().sys_class_net();
        f.fs.add_interface(&sys, "eth0", "22:00:0a:1f:ac:2a");
        f.fs.add_interface(&sys, "eth1", "22:00:0a:1f:ac:2b");

        let mut bosh = static_network("10.0.0.5", "22:00:0a:1f:ac:2b");
        bosh.gateway = "10.0.0.1".to_string();
        let mut vip = static_network("10.0.1.5", "22:00:0a:1f:ac:2a");
        vip.gateway = "10.0.1.1".to_string();
        vip.default = vec!["gateway".to_string()];
        let networks: Networks = [("bosh".to_string(), bosh), ("vip".to_string(), vip)]
            .into_iter()
            .collect();

        let stanzas = f.manager.static_interfaces(&networks).await.unwrap();
        let names: Vec<&str> = stanzas.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["eth0", "eth1"]);
        assert!(stanzas[0].0.gateway.is_some());
        assert!(stanzas[1].0.gateway.is_none());
    }

    #[tokio::test]
    async fn test_completion_dropped_receiver_is_ignored() {
        let f = fixture();
        let (tx, rx) = oneshot::channel();
        drop(rx);

        let networks: Networks = [("bosh".to_string(), Network::default())]
            .into_iter()
            .collect();
        f.manager.setup_dhcp(&networks, Some(tx)).await.unwrap();

        for _ in 0..100 {
            if f.broadcaster.finished() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.broadcaster.calls(), 1);
        assert_eq!(f.runner.exists_checks(), vec!["dhclient3"]);
    }
}
