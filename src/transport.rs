use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::TransportError;
use crate::types::DeviceState;

/// A device as reported by one enumeration pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub serial: String,
    pub model: Option<String>,
    pub state: DeviceState,
}

/// The debug-bridge transport: device enumeration, remote shell execution
/// and port-forward registration.
///
/// Everything above this trait treats the bridge as an opaque
/// remote-procedure service; `AdbTransport` is the production
/// implementation, tests substitute an in-memory fake.
#[async_trait]
pub trait DebugBridge: Send + Sync {
    /// Enumerate currently known devices
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Run a shell command on the device and return its stdout
    async fn shell(&self, serial: &str, command: &str) -> Result<String, TransportError>;

    /// Register a forward from a local spec (e.g. `tcp:9222`) to a remote
    /// spec (e.g. `localabstract:chrome_devtools_remote`)
    async fn create_forward(
        &self,
        serial: &str,
        local: &str,
        remote: &str,
    ) -> Result<(), TransportError>;

    /// Remove a previously registered forward
    async fn remove_forward(&self, serial: &str, local_port: u16) -> Result<(), TransportError>;
}

/// Debug bridge backed by the `adb` executable
pub struct AdbTransport {
    adb: PathBuf,
}

impl AdbTransport {
    /// Create a transport using the given adb path, or resolve `adb` from
    /// PATH when none is supplied.
    pub fn new(adb: Option<PathBuf>) -> Result<Self, TransportError> {
        let adb = adb.unwrap_or_else(|| PathBuf::from("adb"));
        if !Self::command_exists(&adb) {
            return Err(TransportError::AdbNotFound(adb.display().to_string()));
        }
        Ok(Self { adb })
    }

    /// Check that a command resolves, either as an explicit path or via PATH
    fn command_exists(command: &PathBuf) -> bool {
        if command.components().count() > 1 {
            return command.exists();
        }

        #[cfg(unix)]
        {
            std::process::Command::new("which")
                .arg(command)
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
        }

        #[cfg(windows)]
        {
            std::process::Command::new("where")
                .arg(command)
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
        }
    }

    /// Startup probe. Failure here is fatal to the process: nothing else
    /// can function without the bridge.
    pub async fn version(&self) -> Result<String, TransportError> {
        let out = self.run(&["version"], "checking adb version").await?;
        let line = out.lines().next().unwrap_or("").to_string();
        info!("Using {}", line);
        Ok(line)
    }

    async fn run(&self, args: &[&str], action: &str) -> Result<String, TransportError> {
        debug!("adb {}", args.join(" "));
        let output = Command::new(&self.adb)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TransportError::Spawn {
                action: action.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TransportError::Command {
                action: action.to_string(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DebugBridge for AdbTransport {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let out = self.run(&["devices", "-l"], "enumerating devices").await?;
        Ok(parse_devices(&out))
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String, TransportError> {
        let action = format!("running shell command '{}'", command);
        self.run(&["-s", serial, "shell", command], &action).await
    }

    async fn create_forward(
        &self,
        serial: &str,
        local: &str,
        remote: &str,
    ) -> Result<(), TransportError> {
        let action = format!("forwarding {} to {}", local, remote);
        self.run(&["-s", serial, "forward", local, remote], &action)
            .await?;
        Ok(())
    }

    async fn remove_forward(&self, serial: &str, local_port: u16) -> Result<(), TransportError> {
        let local = format!("tcp:{}", local_port);
        let action = format!("removing forward {}", local);
        self.run(&["-s", serial, "forward", "--remove", &local], &action)
            .await?;
        Ok(())
    }
}

/// Parse `adb devices -l` output.
///
/// Each device line is `SERIAL STATE key:value ...`; the header line and
/// blanks are skipped.
pub(crate) fn parse_devices(output: &str) -> Vec<DiscoveredDevice> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices") || line.starts_with('*') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(serial), Some(state)) = (fields.next(), fields.next()) else {
            continue;
        };
        let model = fields
            .find_map(|f| f.strip_prefix("model:"))
            .map(|m| m.replace('_', " "));
        devices.push(DiscoveredDevice {
            serial: serial.to_string(),
            model,
            state: DeviceState::parse(state),
        });
    }
    devices
}

/// Parse `ps -A` output into process names.
///
/// The name is the final whitespace-delimited field of each line; the header
/// line yields "NAME", which never collides with a package identifier.
pub(crate) fn parse_process_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next_back())
        .map(|name| name.to_string())
        .collect()
}

/// Extract devtools socket names from `/proc/net/unix` content.
///
/// Keeps lines containing `marker`, takes the final field and strips the
/// leading `@` of abstract-namespace sockets.
pub(crate) fn parse_unix_sockets(output: &str, marker: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(marker))
        .filter_map(|line| line.split_whitespace().next_back())
        .map(|name| name.trim_start_matches('@').to_string())
        .collect()
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
