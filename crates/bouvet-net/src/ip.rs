//! Interface addresses and IP resolution.

use crate::error::{NetError, Result};
use async_trait::async_trait;
use pnet::datalink;
use pnet::ipnetwork::IpNetwork;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Resolves the current IPv4 address of an interface.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Returns the primary IPv4 address of `interface`. May block until one
    /// is assigned.
    async fn get_primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr>;
}

/// An IP bound to an interface, either known up front or looked up lazily.
#[derive(Clone)]
pub enum InterfaceAddress {
    /// Address taken verbatim from static settings.
    Simple {
        /// Interface name, e.g. `eth0`.
        interface: String,
        /// Literal IP address.
        ip: String,
    },
    /// Address only known once DHCP has handed out a lease.
    Resolving {
        /// Interface name, e.g. `eth0`.
        interface: String,
        /// Resolver consulted at announcement time.
        resolver: Arc<dyn IpResolver>,
    },
}

impl InterfaceAddress {
    /// Address with a literal IP.
    pub fn simple(interface: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::Simple {
            interface: interface.into(),
            ip: ip.into(),
        }
    }

    /// Address resolved through `resolver` when first needed.
    pub fn resolving(interface: impl Into<String>, resolver: Arc<dyn IpResolver>) -> Self {
        Self::Resolving {
            interface: interface.into(),
            resolver,
        }
    }

    /// Name of the interface the address is bound to.
    pub fn interface_name(&self) -> &str {
        match self {
            Self::Simple { interface, .. } | Self::Resolving { interface, .. } => interface,
        }
    }

    /// The IP address, resolving it if necessary.
    pub async fn ip(&self) -> Result<String> {
        match self {
            Self::Simple { ip, .. } => Ok(ip.clone()),
            Self::Resolving {
                interface,
                resolver,
            } => {
                let ip = resolver.get_primary_ipv4(interface).await?;
                Ok(ip.to_string())
            }
        }
    }
}

impl PartialEq for InterfaceAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Simple { interface, ip },
                Self::Simple {
                    interface: other_interface,
                    ip: other_ip,
                },
            ) => interface == other_interface && ip == other_ip,
            (
                Self::Resolving {
                    interface,
                    resolver,
                },
                Self::Resolving {
                    interface: other_interface,
                    resolver: other_resolver,
                },
            ) => {
                interface == other_interface
                    && std::ptr::addr_eq(Arc::as_ptr(resolver), Arc::as_ptr(other_resolver))
            }
            _ => false,
        }
    }
}

impl Eq for InterfaceAddress {}

impl fmt::Debug for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { interface, ip } => f
                .debug_struct("Simple")
                .field("interface", interface)
                .field("ip", ip)
                .finish(),
            Self::Resolving {
                interface,
                resolver,
            } => f
                .debug_struct("Resolving")
                .field("interface", interface)
                .field("resolver", &Arc::as_ptr(resolver))
                .finish(),
        }
    }
}

/// [`IpResolver`] reading addresses from the host's interfaces.
///
/// Polls until the interface carries an IPv4 address, which covers the window
/// between `ifup` returning and dhclient writing its lease.
#[derive(Debug, Clone)]
pub struct InterfaceIpResolver {
    attempts: u32,
    interval: Duration,
}

impl InterfaceIpResolver {
    /// Create a resolver polling `attempts` times, `interval` apart.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    fn lookup(interface: &str) -> Option<Ipv4Addr> {
        datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface)?
            .ips
            .iter()
            .find_map(|net| match net {
                IpNetwork::V4(v4) => Some(v4.ip()),
                IpNetwork::V6(_) => None,
            })
    }
}

#[async_trait]
impl IpResolver for InterfaceIpResolver {
    async fn get_primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        for attempt in 1..=self.attempts {
            if let Some(ip) = Self::lookup(interface) {
                debug!(interface = %interface, ip = %ip, "resolved interface address");
                return Ok(ip);
            }
            trace!(interface = %interface, attempt = attempt, "no IPv4 address yet");
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(NetError::ip_resolution(
            interface,
            format!("no IPv4 address after {} attempts", self.attempts),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeIpResolver;

    #[test]
    fn test_simple_equality() {
        assert_eq!(
            InterfaceAddress::simple("eth0", "10.0.0.5"),
            InterfaceAddress::simple("eth0", "10.0.0.5")
        );
        assert_ne!(
            InterfaceAddress::simple("eth0", "10.0.0.5"),
            InterfaceAddress::simple("eth1", "10.0.0.5")
        );
    }

    #[test]
    fn test_resolving_equality_uses_resolver_identity() {
        let resolver: Arc<dyn IpResolver> = Arc::new(FakeIpResolver::new());
        let other: Arc<dyn IpResolver> = Arc::new(FakeIpResolver::new());

        assert_eq!(
            InterfaceAddress::resolving("eth0", resolver.clone()),
            InterfaceAddress::resolving("eth0", resolver.clone())
        );
        assert_ne!(
            InterfaceAddress::resolving("eth0", resolver.clone()),
            InterfaceAddress::resolving("eth0", other)
        );
        assert_ne!(
            InterfaceAddress::resolving("eth0", resolver),
            InterfaceAddress::simple("eth0", "10.0.0.5")
        );
    }

    #[tokio::test]
    async fn test_ip_of_each_variant() {
        let fake = Arc::new(FakeIpResolver::new());
        fake.set_ip("eth0", Ipv4Addr::new(10, 0, 0, 9));

        let simple = InterfaceAddress::simple("eth1", "192.168.1.4");
        let resolving = InterfaceAddress::resolving("eth0", fake.clone());

        assert_eq!(simple.ip().await.unwrap(), "192.168.1.4");
        assert_eq!(resolving.ip().await.unwrap(), "10.0.0.9");
        assert_eq!(resolving.interface_name(), "eth0");
        assert_eq!(fake.resolved_interfaces(), vec!["eth0"]);
    }

    #[tokio::test]
    async fn test_resolving_propagates_errors() {
        let fake = Arc::new(FakeIpResolver::new());
        let address = InterfaceAddress::resolving("eth3", fake);

        let result = address.ip().await;
        assert!(matches!(result, Err(NetError::IpResolution { .. })));
    }

    #[tokio::test]
    async fn test_interface_resolver_loopback() {
        let resolver = InterfaceIpResolver::new(1, Duration::from_millis(1));
        let ip = resolver.get_primary_ipv4("lo").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn test_interface_resolver_gives_up() {
        let resolver = InterfaceIpResolver::new(2, Duration::from_millis(1));
        let result = resolver.get_primary_ipv4("bouvet-missing0").await;
        match result {
            Err(NetError::IpResolution { interface, message }) => {
                assert_eq!(interface, "bouvet-missing0");
                assert!(message.contains("2 attempts"));
            }
            other => panic!("expected IpResolution, got {:?}", other),
        }
    }
}
