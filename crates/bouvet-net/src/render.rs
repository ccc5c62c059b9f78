//! Renders dhclient, ifupdown and resolver configuration.
//!
//! Everything here is pure: no filesystem access, no interface lookup. The
//! output for a given input is byte-for-byte stable so the writer can compare
//! it against what is already on disk.

use crate::error::{NetError, Result};
use crate::settings::{Network, Networks};
use pnet::ipnetwork::{ipv4_mask_to_prefix, Ipv4Network};
use std::net::Ipv4Addr;

/// First line of every generated file.
pub const GENERATED_HEADER: &str = "# Generated by bouvet-net";

const DHCLIENT_PREAMBLE: &str = r#"
option rfc3442-classless-static-routes code 121 = array of unsigned integer 8;

send host-name "<hostname>";

request subnet-mask, broadcast-address, time-offset, routers,
	domain-name, domain-name-servers, domain-search, host-name,
	netbios-name-servers, netbios-scope, interface-mtu,
	rfc3442-classless-static-routes, ntp-servers;
"#;

/// Render `dhclient.conf`.
///
/// DNS servers of the DNS-providing networks are prepended to whatever the
/// DHCP server offers, in a single `prepend` statement so their order holds.
pub fn render_dhclient_conf(networks: &Networks) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push('\n');
    out.push_str(DHCLIENT_PREAMBLE);

    let dns = networks.dns_servers();
    if !dns.is_empty() {
        out.push_str(&format!("\nprepend domain-name-servers {};\n", dns.join(", ")));
    }
    out
}

/// One `iface <name> inet static` stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticInterface {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// Configured address.
    pub address: Ipv4Addr,
    /// Network address (`address & netmask`).
    pub network: Ipv4Addr,
    /// Netmask.
    pub netmask: Ipv4Addr,
    /// Broadcast address (`network | !netmask`).
    pub broadcast: Ipv4Addr,
    /// Default gateway, only on the gateway-providing network.
    pub gateway: Option<Ipv4Addr>,
}

impl StaticInterface {
    /// Build a stanza for `network` bound to `interface`.
    pub fn from_network(
        network_name: &str,
        interface: &str,
        network: &Network,
        with_gateway: bool,
    ) -> Result<Self> {
        let address = parse_ipv4(network_name, "ip", &network.ip)?;
        let netmask = parse_ipv4(network_name, "netmask", &network.netmask)?;
        let prefix = ipv4_mask_to_prefix(netmask).map_err(|_| {
            NetError::invalid_network(
                network_name,
                format!("netmask '{}' is not contiguous", network.netmask),
            )
        })?;
        let subnet = Ipv4Network::new(address, prefix)
            .map_err(|e| NetError::invalid_network(network_name, e.to_string()))?;

        let gateway = if with_gateway && !network.gateway.is_empty() {
            Some(parse_ipv4(network_name, "gateway", &network.gateway)?)
        } else {
            None
        };

        Ok(Self {
            name: interface.to_string(),
            address,
            network: subnet.network(),
            netmask,
            broadcast: subnet.broadcast(),
            gateway,
        })
    }
}

fn parse_ipv4(network_name: &str, field: &str, value: &str) -> Result<Ipv4Addr> {
    value.trim().parse().map_err(|_| {
        NetError::invalid_network(network_name, format!("invalid {} '{}'", field, value))
    })
}

/// Render `/etc/network/interfaces`, stanzas in the order given.
///
/// The file carries no trailing newline.
pub fn render_interfaces(interfaces: &[StaticInterface]) -> String {
    let mut lines = vec![
        GENERATED_HEADER.to_string(),
        "auto lo".to_string(),
        "iface lo inet loopback".to_string(),
    ];
    for iface in interfaces {
        lines.push(String::new());
        lines.push(format!("auto {}", iface.name));
        lines.push(format!("iface {} inet static", iface.name));
        lines.push(format!("    address {}", iface.address));
        lines.push(format!("    network {}", iface.network));
        lines.push(format!("    netmask {}", iface.netmask));
        lines.push(format!("    broadcast {}", iface.broadcast));
        if let Some(gateway) = iface.gateway {
            lines.push(format!("    gateway {}", gateway));
        }
    }
    lines.join("\n")
}

/// Render `/etc/resolv.conf`, one `nameserver` line per server in order.
pub fn render_resolv_conf(dns_servers: &[String]) -> String {
    let mut out = String::from(GENERATED_HEADER);
    out.push('\n');
    for server in dns_servers {
        out.push_str("nameserver ");
        out.push_str(server);
        out.push('\n');
    }
    out
}
