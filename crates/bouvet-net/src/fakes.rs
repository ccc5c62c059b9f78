//! In-memory collaborators for tests.
//!
//! Every fake records what it was asked to do so tests can assert on written
//! files, issued commands and announced addresses without touching the host.

use crate::arp::AddressBroadcaster;
use crate::error::{NetError, Result};
use crate::ip::{InterfaceAddress, IpResolver};
use crate::system::{command_line, CmdRunner, ExecResult, FileSystem};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Filesystem
// ============================================================================

#[derive(Debug, Default)]
struct FsState {
    files: HashMap<PathBuf, String>,
    globs: HashMap<String, Vec<PathBuf>>,
    writes: Vec<PathBuf>,
    failing_writes: HashSet<PathBuf>,
    failing_reads: HashSet<PathBuf>,
}

/// [`FileSystem`] keeping files in memory.
#[derive(Debug, Default)]
pub struct FakeFileSystem {
    state: Mutex<FsState>,
}

impl FakeFileSystem {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without recording a write.
    pub fn set_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        lock(&self.state).files.insert(path.into(), content.into());
    }

    /// Current content of a file.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        lock(&self.state).files.get(path.as_ref()).cloned()
    }

    /// Paths written through [`FileSystem::write_file_string`], in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        lock(&self.state).writes.clone()
    }

    /// Make [`FileSystem::glob`] return `paths` for `pattern`.
    pub fn set_glob(&self, pattern: impl Into<String>, paths: Vec<PathBuf>) {
        lock(&self.state).globs.insert(pattern.into(), paths);
    }

    /// Make writes to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        lock(&self.state).failing_writes.insert(path.into());
    }

    /// Make reads of `path` fail.
    pub fn fail_reads_of(&self, path: impl Into<PathBuf>) {
        lock(&self.state).failing_reads.insert(path.into());
    }

    /// Register a network device the way sysfs exposes it.
    pub fn add_interface(&self, sys_class_net: &Path, name: &str, mac: &str) {
        let dir = sys_class_net.join(name);
        let pattern = format!("{}/*", sys_class_net.display());
        let mut state = lock(&self.state);
        state.files.insert(dir.clone(), String::new());
        state
            .files
            .insert(dir.join("address"), format!("{}\n", mac));
        let devices = state.globs.entry(pattern).or_default();
        devices.push(dir);
        devices.sort();
    }
}

#[async_trait]
impl FileSystem for FakeFileSystem {
    async fn read_file_string(&self, path: &Path) -> Result<String> {
        let state = lock(&self.state);
        if state.failing_reads.contains(path) {
            return Err(NetError::io(path, io::Error::other("fake read failure")));
        }
        Ok(state.files.get(path).cloned().unwrap_or_default())
    }

    async fn write_file_string(&self, path: &Path, content: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing_writes.contains(path) {
            return Err(NetError::io(path, io::Error::other("fake write failure")));
        }
        state.files.insert(path.to_path_buf(), content.to_string());
        state.writes.push(path.to_path_buf());
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        lock(&self.state).files.contains_key(path)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        Ok(lock(&self.state)
            .globs
            .get(pattern)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Default)]
struct CmdState {
    results: HashMap<String, ExecResult>,
    delays: HashMap<String, Duration>,
    run_commands: Vec<Vec<String>>,
    command_exists: bool,
    exists_checks: Vec<String>,
}

/// [`CmdRunner`] returning canned results and recording every invocation.
///
/// Commands without a canned result succeed with empty output.
#[derive(Debug, Default)]
pub struct FakeCmdRunner {
    state: Mutex<CmdState>,
}

impl FakeCmdRunner {
    /// Create a runner where every command succeeds and no command exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned result for a full command line, e.g. `"ifup --version"`.
    pub fn add_cmd_result(&self, command: impl Into<String>, result: ExecResult) {
        lock(&self.state).results.insert(command.into(), result);
    }

    /// Make a command line take `delay` before returning.
    pub fn add_cmd_delay(&self, command: impl Into<String>, delay: Duration) {
        lock(&self.state).delays.insert(command.into(), delay);
    }

    /// Value returned by [`CmdRunner::command_exists`].
    pub fn set_command_exists(&self, exists: bool) {
        lock(&self.state).command_exists = exists;
    }

    /// Every command run so far, as argument vectors.
    pub fn run_commands(&self) -> Vec<Vec<String>> {
        lock(&self.state).run_commands.clone()
    }

    /// Names passed to [`CmdRunner::command_exists`].
    pub fn exists_checks(&self) -> Vec<String> {
        lock(&self.state).exists_checks.clone()
    }
}

#[async_trait]
impl CmdRunner for FakeCmdRunner {
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let line = command_line(program, args);
        let (result, delay) = {
            let mut state = lock(&self.state);
            let mut argv = vec![program.to_string()];
            argv.extend(args.iter().map(|a| a.to_string()));
            state.run_commands.push(argv);
            (
                state.results.get(&line).cloned().unwrap_or_default(),
                state.delays.get(&line).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(result)
    }

    fn command_exists(&self, name: &str) -> bool {
        let mut state = lock(&self.state);
        state.exists_checks.push(name.to_string());
        state.command_exists
    }
}

// ============================================================================
// IP resolution
// ============================================================================

#[derive(Debug, Default)]
struct ResolverState {
    ips: HashMap<String, Ipv4Addr>,
    resolved: Vec<String>,
}

/// [`IpResolver`] answering from a fixed table.
#[derive(Debug, Default)]
pub struct FakeIpResolver {
    state: Mutex<ResolverState>,
}

impl FakeIpResolver {
    /// Create a resolver that knows no interfaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `ip` for `interface`.
    pub fn set_ip(&self, interface: impl Into<String>, ip: Ipv4Addr) {
        lock(&self.state).ips.insert(interface.into(), ip);
    }

    /// Interfaces looked up so far.
    pub fn resolved_interfaces(&self) -> Vec<String> {
        lock(&self.state).resolved.clone()
    }
}

#[async_trait]
impl IpResolver for FakeIpResolver {
    async fn get_primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        let mut state = lock(&self.state);
        state.resolved.push(interface.to_string());
        state
            .ips
            .get(interface)
            .copied()
            .ok_or_else(|| NetError::ip_resolution(interface, "no fake address configured"))
    }
}

// ============================================================================
// Address broadcasting
// ============================================================================

#[derive(Debug, Default)]
struct BroadcasterState {
    addresses: Vec<InterfaceAddress>,
    calls: usize,
    finished: usize,
    failure: Option<String>,
    delay: Option<Duration>,
}

/// [`AddressBroadcaster`] recording the addresses it was handed.
#[derive(Debug, Default)]
pub struct FakeAddressBroadcaster {
    state: Mutex<BroadcasterState>,
}

impl FakeAddressBroadcaster {
    /// Create a broadcaster that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every broadcast fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).failure = Some(message.into());
    }

    /// Make every broadcast take `delay`.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = Some(delay);
    }

    /// Addresses of the most recent broadcast.
    pub fn addresses(&self) -> Vec<InterfaceAddress> {
        lock(&self.state).addresses.clone()
    }

    /// Number of broadcasts started.
    pub fn calls(&self) -> usize {
        lock(&self.state).calls
    }

    /// Number of broadcasts that ran to completion.
    pub fn finished(&self) -> usize {
        lock(&self.state).finished
    }
}

#[async_trait]
impl AddressBroadcaster for FakeAddressBroadcaster {
    async fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()> {
        let delay = {
            let mut state = lock(&self.state);
            state.addresses = addresses;
            state.calls += 1;
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.finished += 1;
        match &state.failure {
            Some(message) => Err(NetError::Broadcast {
                failures: vec![message.clone()],
            }),
            None => Ok(()),
        }
    }
}
