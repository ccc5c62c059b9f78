//! Settings file and setup mode for the netsetup binary.

use anyhow::Context;
use bouvet_net::Networks;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the agent settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "/var/lib/bouvet/settings.json";

/// Which setup to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupMode {
    /// Manual when any network carries a static IP, DHCP otherwise.
    #[default]
    Auto,
    /// Always configure DHCP.
    Dhcp,
    /// Always configure static addresses.
    Manual,
}

impl SetupMode {
    /// Parse from string (case-insensitive). Unknown values fall back to `Auto`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dhcp" => Self::Dhcp,
            "manual" | "static" => Self::Manual,
            _ => Self::Auto,
        }
    }

    /// Resolve `Auto` against the networks at hand.
    pub fn resolve(self, networks: &Networks) -> Self {
        match self {
            Self::Auto if networks.iter().any(|(_, net)| net.is_static()) => Self::Manual,
            Self::Auto => Self::Dhcp,
            other => other,
        }
    }
}

/// Options of the binary, read from the environment.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Path of the settings JSON file.
    pub settings_path: PathBuf,
    /// Requested mode.
    pub mode: SetupMode,
}

impl SetupOptions {
    /// Load options from environment variables.
    ///
    /// - `BOUVET_NET_SETTINGS`: settings file (default: `/var/lib/bouvet/settings.json`)
    /// - `BOUVET_NET_MODE`: `auto`, `dhcp` or `manual` (default: `auto`)
    pub fn from_env() -> Self {
        Self {
            settings_path: std::env::var("BOUVET_NET_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH)),
            mode: std::env::var("BOUVET_NET_MODE")
                .map(|v| SetupMode::parse(&v))
                .unwrap_or_default(),
        }
    }
}

/// Subset of the agent settings the network setup needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentSettings {
    /// Networks keyed by name.
    #[serde(default)]
    pub networks: Networks,
}

impl AgentSettings {
    /// Parse settings JSON.
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid settings JSON")
    }

    /// Read and parse a settings file.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("failed to load {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "agent_id": "ignored",
        "networks": {
            "bosh": {
                "default": ["dns", "gateway"],
                "ip": "192.168.195.6",
                "netmask": "255.255.255.0",
                "gateway": "192.168.195.1",
                "mac": "22:00:0a:1f:ac:2a",
                "dns": ["10.80.130.2"]
            },
            "vip": {"ip": ""}
        }
    }"#;

    #[test]
    fn test_mode_parse() {
        assert_eq!(SetupMode::parse("DHCP"), SetupMode::Dhcp);
        assert_eq!(SetupMode::parse("manual"), SetupMode::Manual);
        assert_eq!(SetupMode::parse("static"), SetupMode::Manual);
        assert_eq!(SetupMode::parse("whatever"), SetupMode::Auto);
    }

    #[test]
    fn test_auto_mode_resolution() {
        let settings = AgentSettings::parse(SETTINGS).unwrap();
        assert_eq!(SetupMode::Auto.resolve(&settings.networks), SetupMode::Manual);
        assert_eq!(SetupMode::Dhcp.resolve(&settings.networks), SetupMode::Dhcp);

        let empty = AgentSettings::parse("{}").unwrap();
        assert!(empty.networks.is_empty());
        assert_eq!(SetupMode::Auto.resolve(&empty.networks), SetupMode::Dhcp);
    }

    #[test]
    fn test_parse_settings() {
        let settings = AgentSettings::parse(SETTINGS).unwrap();
        assert_eq!(settings.networks.len(), 2);
        let bosh = settings.networks.get("bosh").unwrap();
        assert_eq!(bosh.mac, "22:00:0a:1f:ac:2a");
        assert!(bosh.is_default_for("gateway"));
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = AgentSettings::parse("{not json").unwrap_err();
        assert!(err.to_string().contains("invalid settings JSON"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, SETTINGS).unwrap();

        let settings = AgentSettings::load(&path).await.unwrap();
        assert_eq!(settings.networks.len(), 2);

        let missing = AgentSettings::load(&dir.path().join("missing.json")).await;
        assert!(missing.is_err());
    }
}
