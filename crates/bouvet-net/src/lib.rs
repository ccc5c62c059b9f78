//! # bouvet-net
//!
//! Guest network configuration for bouvet microVMs.
//!
//! Given the agent's network settings, the manager renders dhclient or
//! ifupdown configuration, writes it only when it changed, bounces networking
//! when needed and announces the resulting addresses with gratuitous ARP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  UbuntuNetManager                        │
//! │  - setup_dhcp()                                          │
//! │  - setup_manual_networking()                             │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  MacAddressDetector ──▶ render ──▶ write_if_changed      │
//! │   (/sys/class/net)      (pure)          │                │
//! │                                         ▼ changed?       │
//! │                                  NetworkRestarter        │
//! │                                  (ifup/ifdown/service)   │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │ tokio::spawn
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  AddressBroadcaster (one task per InterfaceAddress)      │
//! │  arping -c 1 -U -I <iface> <ip>                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!              Option<BroadcastCompletion>
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use bouvet_net::{ArpingBroadcaster, InterfaceIpResolver, NetConfig, NetManager,
//!     OsCmdRunner, OsFileSystem, UbuntuNetManager};
//! use std::sync::Arc;
//!
//! # async fn example(networks: bouvet_net::Networks) -> bouvet_net::Result<()> {
//! let config = NetConfig::from_env();
//! let fs = Arc::new(OsFileSystem::new());
//! let runner = Arc::new(OsCmdRunner::new());
//! let resolver = Arc::new(InterfaceIpResolver::new(
//!     config.resolve_attempts,
//!     config.resolve_interval,
//! ));
//! let broadcaster = Arc::new(ArpingBroadcaster::new(fs.clone(), runner.clone(), &config));
//! let manager = UbuntuNetManager::new(fs, runner, resolver, broadcaster, config);
//!
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! manager.setup_dhcp(&networks, Some(tx)).await?;
//! let broadcast = rx.await;
//! # Ok(())
//! # }
//! ```

pub mod arp;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod interfaces;
pub mod ip;
pub mod manager;
pub mod render;
pub mod restart;
pub mod settings;
pub mod system;
pub mod writer;

pub use arp::{AddressBroadcaster, ArpingBroadcaster};
pub use config::NetConfig;
pub use error::{NetError, Result};
pub use interfaces::MacAddressDetector;
pub use ip::{InterfaceAddress, InterfaceIpResolver, IpResolver};
pub use manager::{BroadcastCompletion, NetManager, UbuntuNetManager};
pub use restart::NetworkRestarter;
pub use settings::{Network, Networks};
pub use system::{CmdRunner, ExecResult, FileSystem, OsCmdRunner, OsFileSystem};
