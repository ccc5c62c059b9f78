//! Configuration for the network manager.
//!
//! Paths default to the locations ifupdown and dhclient read on Debian and
//! Ubuntu guests. Every path is joined onto `root`, so the whole tree can be
//! redirected into a chroot or a test directory.

use std::path::PathBuf;
use std::time::Duration;

/// Interface used for DHCP announcements when no network names a MAC address.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Configuration for [`UbuntuNetManager`](crate::UbuntuNetManager) and its collaborators.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Filesystem root all paths are resolved against.
    pub root: PathBuf,
    /// Interface used for DHCP announcements when no MAC is configured.
    pub default_interface: String,
    /// Number of gratuitous ARP packets sent per address (default: 6).
    pub arping_iterations: u32,
    /// Delay between two gratuitous ARP packets (default: 500ms).
    pub arping_delay: Duration,
    /// How many times the IP resolver polls an interface (default: 30).
    pub resolve_attempts: u32,
    /// Delay between two resolver polls (default: 1s).
    pub resolve_interval: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            default_interface: DEFAULT_INTERFACE.to_string(),
            arping_iterations: 6,
            arping_delay: Duration::from_millis(500),
            resolve_attempts: 30,
            resolve_interval: Duration::from_secs(1),
        }
    }
}

impl NetConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `BOUVET_NET_ROOT` | `/` |
    /// | `BOUVET_NET_DEFAULT_INTERFACE` | `eth0` |
    /// | `BOUVET_NET_ARPING_ITERATIONS` | `6` |
    /// | `BOUVET_NET_ARPING_DELAY_MS` | `500` |
    /// | `BOUVET_NET_RESOLVE_ATTEMPTS` | `30` |
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            root: std::env::var("BOUVET_NET_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.root),
            default_interface: std::env::var("BOUVET_NET_DEFAULT_INTERFACE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.default_interface),
            arping_iterations: std::env::var("BOUVET_NET_ARPING_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.arping_iterations),
            arping_delay: std::env::var("BOUVET_NET_ARPING_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.arping_delay),
            resolve_attempts: std::env::var("BOUVET_NET_RESOLVE_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.resolve_attempts),
            resolve_interval: default.resolve_interval,
        }
    }

    /// Set the filesystem root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the fallback DHCP interface.
    pub fn with_default_interface(mut self, interface: impl Into<String>) -> Self {
        self.default_interface = interface.into();
        self
    }

    /// Set gratuitous ARP iterations and the delay between them.
    pub fn with_arping(mut self, iterations: u32, delay: Duration) -> Self {
        self.arping_iterations = iterations;
        self.arping_delay = delay;
        self
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// dhclient configuration path, `/etc/dhcp3/` when dhclient3 is installed.
    pub fn dhclient_conf_path(&self, dhclient3: bool) -> PathBuf {
        if dhclient3 {
            self.path("etc/dhcp3/dhclient.conf")
        } else {
            self.path("etc/dhcp/dhclient.conf")
        }
    }

    /// ifupdown interfaces file.
    pub fn interfaces_path(&self) -> PathBuf {
        self.path("etc/network/interfaces")
    }

    /// Resolver configuration.
    pub fn resolv_conf_path(&self) -> PathBuf {
        self.path("etc/resolv.conf")
    }

    /// sysfs directory listing network devices.
    pub fn sys_class_net(&self) -> PathBuf {
        self.path("sys/class/net")
    }
}
