//! Gratuitous ARP announcements of configured addresses.
//!
//! Once interfaces are up, peers on the segment may still hold stale ARP
//! entries for the guest's IPs (the previous VM on the same address, for
//! instance). Each address is announced from its own task so a slow DHCP
//! lease on one interface does not delay the others.

use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::ip::InterfaceAddress;
use crate::system::{command_line, CmdRunner, FileSystem};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Announces interface addresses on their network segment.
#[async_trait]
pub trait AddressBroadcaster: Send + Sync {
    /// Announce every address and return once all announcements finished.
    ///
    /// Returns [`NetError::Broadcast`] listing every address that failed.
    async fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()>;
}

/// [`AddressBroadcaster`] shelling out to `arping -U`.
#[derive(Clone)]
pub struct ArpingBroadcaster {
    fs: Arc<dyn FileSystem>,
    cmd_runner: Arc<dyn CmdRunner>,
    sys_class_net: PathBuf,
    iterations: u32,
    delay: Duration,
}

impl ArpingBroadcaster {
    /// Create a broadcaster using the arping settings of `config`.
    pub fn new(fs: Arc<dyn FileSystem>, cmd_runner: Arc<dyn CmdRunner>, config: &NetConfig) -> Self {
        Self {
            fs,
            cmd_runner,
            sys_class_net: config.sys_class_net(),
            iterations: config.arping_iterations.max(1),
            delay: config.arping_delay,
        }
    }

    async fn announce(&self, address: &InterfaceAddress) -> Result<()> {
        let interface = address.interface_name();
        if !self.fs.file_exists(&self.sys_class_net.join(interface)).await {
            warn!(interface = %interface, "interface does not exist, skipping announcement");
            return Ok(());
        }

        let ip = address.ip().await?;
        let args = ["-c", "1", "-U", "-I", interface, ip.as_str()];

        let mut sent = 0;
        let mut last_failure = None;
        for iteration in 0..self.iterations {
            let result = self.cmd_runner.run_command("arping", &args).await?;
            if result.success() {
                sent += 1;
            } else {
                debug!(
                    interface = %interface,
                    ip = %ip,
                    exit_code = result.exit_code,
                    "arping attempt failed"
                );
                last_failure = Some(result);
            }

            if iteration + 1 < self.iterations {
                tokio::time::sleep(self.delay).await;
            }
        }

        match last_failure {
            Some(result) if sent == 0 => Err(NetError::CommandFailed {
                command: command_line("arping", &args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            }),
            _ => {
                info!(interface = %interface, ip = %ip, sent = sent, "announced address");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AddressBroadcaster for ArpingBroadcaster {
    async fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()> {
        let mut tasks = JoinSet::new();
        for address in addresses {
            let this = self.clone();
            tasks.spawn(async move {
                this.announce(&address)
                    .await
                    .map_err(|e| format!("{}: {}", address.interface_name(), e))
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    warn!(error = %message, "address announcement failed");
                    failures.push(message);
                }
                Err(e) => failures.push(format!("announcement task failed: {}", e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort();
            Err(NetError::Broadcast { failures })
        }
    }
}
