//! Restarting networking after configuration changes.
//!
//! ifupdown changed how the loopback interface is excluded from `-a` in 0.7:
//! older releases only understand `--exclude=lo`, newer ones prefer
//! `--no-loopback`. The flag is picked from [`LOOPBACK_FLAG_POLICY`], the
//! first matching rule wins. Output that carries no version gets
//! [`FALLBACK_LOOPBACK_FLAG`].

use crate::error::Result;
use crate::system::CmdRunner;
use std::sync::Arc;
use tracing::info;

/// Version reported by `ifup --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IfupdownVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component (0 when absent).
    pub patch: u32,
}

impl IfupdownVersion {
    /// Parse the first line of `ifup --version`, e.g. `ifup version 0.7.47.2`.
    pub fn parse(output: &str) -> Option<Self> {
        let first_line = output.lines().next()?;
        let token = first_line.split_whitespace().find(|t| {
            t.contains('.') && t.chars().next().is_some_and(|c| c.is_ascii_digit())
        })?;

        let mut parts = token.split('.').map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });

        Some(Self {
            major: parts.next()??,
            minor: parts.next()??,
            patch: parts.next().flatten().unwrap_or(0),
        })
    }
}

/// One row of the loopback flag policy.
#[derive(Debug, Clone, Copy)]
pub struct FlagRule {
    /// Returns true if the rule applies to the probed version.
    pub applies: fn(IfupdownVersion) -> bool,
    /// Flag passed to `ifdown -a` / `ifup -a`.
    pub flag: &'static str,
}

fn at_least_0_7(version: IfupdownVersion) -> bool {
    (version.major, version.minor) >= (0, 7)
}

fn before_0_7(version: IfupdownVersion) -> bool {
    !at_least_0_7(version)
}

/// Flag used when `ifup --version` printed nothing parseable.
pub const FALLBACK_LOOPBACK_FLAG: &str = "--exclude=lo";

/// Ordered decision table from ifupdown version to loopback flag.
pub const LOOPBACK_FLAG_POLICY: &[FlagRule] = &[
    FlagRule {
        applies: at_least_0_7,
        flag: "--no-loopback",
    },
    FlagRule {
        applies: before_0_7,
        flag: "--exclude=lo",
    },
];

/// Flag excluding loopback for the ifupdown that printed `version_output`.
pub fn loopback_flag(version_output: &str) -> &'static str {
    IfupdownVersion::parse(version_output)
        .and_then(|version| {
            LOOPBACK_FLAG_POLICY
                .iter()
                .find(|rule| (rule.applies)(version))
        })
        .map(|rule| rule.flag)
        .unwrap_or(FALLBACK_LOOPBACK_FLAG)
}

/// Issues the commands that make new configuration take effect.
#[derive(Clone)]
pub struct NetworkRestarter {
    cmd_runner: Arc<dyn CmdRunner>,
}

impl NetworkRestarter {
    /// Create a restarter issuing commands through `cmd_runner`.
    pub fn new(cmd_runner: Arc<dyn CmdRunner>) -> Self {
        Self { cmd_runner }
    }

    /// Bounce every ifupdown interface except loopback so dhclient rereads its config.
    pub async fn restart_dhcp(&self) -> Result<()> {
        let version_output = self.cmd_runner.run_checked("ifup", &["--version"]).await?;
        let flag = loopback_flag(&version_output);
        info!(
            version = %version_output.lines().next().unwrap_or_default(),
            flag = flag,
            "restarting networking for DHCP"
        );

        self.cmd_runner.run_checked("ifdown", &["-a", flag]).await?;
        self.cmd_runner.run_checked("ifup", &["-a", flag]).await?;
        Ok(())
    }

    /// Stop then start each interface through upstart's network-interface job.
    pub async fn restart_interfaces(&self, interfaces: &[String]) -> Result<()> {
        for interface in interfaces {
            let selector = format!("INTERFACE={}", interface);
            info!(interface = %interface, "restarting network interface");
            self.cmd_runner
                .run_checked("service", &["network-interface", "stop", &selector])
                .await?;
            self.cmd_runner
                .run_checked("service", &["network-interface", "start", &selector])
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetError;
    use crate::fakes::FakeCmdRunner;
    use crate::system::ExecResult;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            IfupdownVersion::parse("ifup version 0.7.47"),
            Some(IfupdownVersion {
                major: 0,
                minor: 7,
                patch: 47
            })
        );
        assert_eq!(
            IfupdownVersion::parse("ifup version 0.8.35ubuntu1\nCopyright (c) 1999-2009"),
            Some(IfupdownVersion {
                major: 0,
                minor: 8,
                patch: 35
            })
        );
        assert_eq!(
            IfupdownVersion::parse("ifup version 0.6"),
            Some(IfupdownVersion {
                major: 0,
                minor: 6,
                patch: 0
            })
        );
        assert_eq!(IfupdownVersion::parse("ifup: unknown option"), None);
        assert_eq!(IfupdownVersion::parse(""), None);
    }

    #[test]
    fn test_loopback_flag_policy() {
        assert_eq!(loopback_flag("ifup version 0.7.47"), "--no-loopback");
        assert_eq!(loopback_flag("ifup version 0.7.0"), "--no-loopback");
        assert_eq!(loopback_flag("ifup version 1.0.0"), "--no-loopback");
        assert_eq!(loopback_flag("ifup version 0.6.0"), "--exclude=lo");
        assert_eq!(loopback_flag("garbage"), FALLBACK_LOOPBACK_FLAG);
        assert_eq!(loopback_flag(""), FALLBACK_LOOPBACK_FLAG);
    }

    #[test]
    fn test_policy_rows_are_disjoint() {
        let versions = ["ifup version 0.6.9", "ifup version 0.7.0", "ifup version 0.8.35"];
        for output in versions {
            let version = IfupdownVersion::parse(output).unwrap();
            let matching = LOOPBACK_FLAG_POLICY
                .iter()
                .filter(|rule| (rule.applies)(version))
                .count();
            assert_eq!(matching, 1, "{}", output);
        }
    }

    #[tokio::test]
    async fn test_restart_dhcp_new_ifupdown() {
        let runner = Arc::new(FakeCmdRunner::new());
        runner.add_cmd_result("ifup --version", ExecResult::ok("ifup version 0.7.47"));

        NetworkRestarter::new(runner.clone())
            .restart_dhcp()
            .await
            .unwrap();

        assert_eq!(
            runner.run_commands(),
            vec![
                argv(&["ifup", "--version"]),
                argv(&["ifdown", "-a", "--no-loopback"]),
                argv(&["ifup", "-a", "--no-loopback"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_restart_dhcp_old_ifupdown() {
        let runner = Arc::new(FakeCmdRunner::new());
        runner.add_cmd_result("ifup --version", ExecResult::ok("ifup version 0.6.0"));

        NetworkRestarter::new(runner.clone())
            .restart_dhcp()
            .await
            .unwrap();

        let commands = runner.run_commands();
        assert_eq!(commands[1], argv(&["ifdown", "-a", "--exclude=lo"]));
        assert_eq!(commands[2], argv(&["ifup", "-a", "--exclude=lo"]));
    }

    #[tokio::test]
    async fn test_restart_dhcp_stops_after_failed_ifdown() {
        let runner = Arc::new(FakeCmdRunner::new());
        runner.add_cmd_result("ifup --version", ExecResult::ok("ifup version 0.7.47"));
        runner.add_cmd_result(
            "ifdown -a --no-loopback",
            ExecResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: "ifdown: failed to bring down eth0".to_string(),
            },
        );

        let result = NetworkRestarter::new(runner.clone()).restart_dhcp().await;

        assert!(matches!(result, Err(NetError::CommandFailed { .. })));
        assert_eq!(runner.run_commands().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_interfaces_stop_before_start() {
        let runner = Arc::new(FakeCmdRunner::new());

        NetworkRestarter::new(runner.clone())
            .restart_interfaces(&["eth0".to_string(), "eth1".to_string()])
            .await
            .unwrap();

        assert_eq!(
            runner.run_commands(),
            vec![
                argv(&["service", "network-interface", "stop", "INTERFACE=eth0"]),
                argv(&["service", "network-interface", "start", "INTERFACE=eth0"]),
                argv(&["service", "network-interface", "stop", "INTERFACE=eth1"]),
                argv(&["service", "network-interface", "start", "INTERFACE=eth1"]),
            ]
        );
    }
}
