use serde::{Deserialize, Serialize};

/// Connectivity state a device reports through `adb devices`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Fully usable over the transport
    Online,
    /// Known to adb but not responding
    Offline,
    /// Connected but the host key has not been accepted on-device
    Unauthorized,
    /// In the bootloader/fastboot environment
    Bootloader,
    /// Anything adb reports that we do not model
    Unknown,
}

impl DeviceState {
    /// Map the state column of `adb devices -l` output
    pub fn parse(s: &str) -> Self {
        match s {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            _ => DeviceState::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceState::Online => "online",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Bootloader => "bootloader",
            DeviceState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// One entry from the DevTools discovery endpoint (`/json/list`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    /// Target identifier, stable across polls
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// Target kind; only "page" entries are surfaced
    #[serde(rename = "type")]
    pub target_type: String,
}

/// Point-in-time view of everything the poller knows, published to
/// subscribers after every tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetSnapshot {
    pub devices: Vec<DeviceSnapshot>,
    /// Last tick error, if the tick failed (cleared at the start of each tick)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub serial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub state: DeviceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_level: Option<String>,
    pub browsers: Vec<BrowserSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowserSnapshot {
    pub package: String,
    pub label: String,
    /// Local end of the devtools tunnel, when one is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    pub pages: Vec<PageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
