//! Error types for bouvet-net.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bouvet-net operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors that can occur while configuring guest networking.
#[derive(Debug, Error)]
pub enum NetError {
    /// Network settings could not be rendered (bad address, netmask, ...).
    #[error("invalid network '{network}': {message}")]
    InvalidNetwork {
        /// Name of the offending network.
        network: String,
        /// What is wrong with it.
        message: String,
    },

    /// No local interface carries the requested hardware address.
    #[error("no network interface found for MAC address {mac}")]
    InterfaceNotFound {
        /// The MAC address from the settings.
        mac: String,
    },

    /// File read, write or glob failure.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A command could not be started at all.
    #[error("failed to execute '{command}': {source}")]
    CommandSpawn {
        /// The command line.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A command ran but exited non-zero.
    #[error("command failed: '{command}' (exit code {exit_code}): {output}")]
    CommandFailed {
        /// The command line.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The IP address of an interface could not be determined.
    #[error("failed to resolve IP of interface '{interface}': {message}")]
    IpResolution {
        /// Interface name.
        interface: String,
        /// Error message.
        message: String,
    },

    /// One or more address announcements failed.
    #[error("address broadcast failed: {}", failures.join("; "))]
    Broadcast {
        /// One message per failed address.
        failures: Vec<String>,
    },
}

impl NetError {
    /// Creates an invalid network error.
    pub fn invalid_network(network: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidNetwork {
            network: network.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an IP resolution error.
    pub fn ip_resolution(interface: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IpResolution {
            interface: interface.into(),
            message: message.into(),
        }
    }

    /// Returns true if the next setup cycle may succeed without a settings change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetError::Io { .. }
                | NetError::CommandFailed { .. }
                | NetError::IpResolution { .. }
                | NetError::Broadcast { .. }
        )
    }
}
