//! Maps hardware addresses to interface names using sysfs.

use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::system::FileSystem;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};

/// Reads `/sys/class/net/<iface>/address` for every device.
#[derive(Clone)]
pub struct MacAddressDetector {
    fs: Arc<dyn FileSystem>,
    sys_class_net: PathBuf,
}

impl MacAddressDetector {
    /// Create a detector over the sysfs tree of `config`.
    pub fn new(fs: Arc<dyn FileSystem>, config: &NetConfig) -> Self {
        Self {
            fs,
            sys_class_net: config.sys_class_net(),
        }
    }

    /// Returns a map of lower-cased MAC address to interface name.
    pub async fn detect(&self) -> Result<HashMap<String, String>> {
        let pattern = format!("{}/*", self.sys_class_net.display());
        let mut by_mac = HashMap::new();

        for device in self.fs.glob(&pattern).await? {
            let Some(name) = device.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let address = device.join("address");
            if !self.fs.file_exists(&address).await {
                trace!(interface = %name, "not a network device, skipping");
                continue;
            }
            let mac = self.fs.read_file_string(&address).await?.trim().to_lowercase();
            if mac.is_empty() {
                trace!(interface = %name, "device has no hardware address");
                continue;
            }
            // VLAN and bond children share the parent's MAC and sort after it.
            by_mac.entry(mac).or_insert_with(|| name.to_string());
        }

        debug!(count = by_mac.len(), "detected network interfaces");
        Ok(by_mac)
    }
}

/// Look up the interface carrying `mac` in a map built by [`MacAddressDetector::detect`].
pub fn interface_for_mac(by_mac: &HashMap<String, String>, mac: &str) -> Result<String> {
    by_mac
        .get(&mac.trim().to_lowercase())
        .cloned()
        .ok_or_else(|| NetError::InterfaceNotFound {
            mac: mac.to_string(),
        })
}
