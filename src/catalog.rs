use crate::errors::TransportError;
use crate::transport::DebugBridge;

/// Immutable catalog entry for a launchable browser variant.
///
/// Shared by reference across all devices; adding a browser means adding an
/// entry to [`descriptors`], not changing any schema.
#[derive(Debug, PartialEq, Eq)]
pub struct BrowserDescriptor {
    /// Android package identifier, as shown by `ps` and `pm list packages`
    pub package: &'static str,
    /// Activity started to launch the browser
    pub activity: &'static str,
    /// Abstract-namespace devtools socket the browser listens on
    pub socket: &'static str,
    /// Command-line flags file the browser reads at startup
    pub flags_file: &'static str,
    /// Human-readable name
    pub label: &'static str,
}

const CHROME_ACTIVITY: &str = "com.google.android.apps.chrome.Main";

/// The ordered catalog of browsers we know how to drive
const DESCRIPTORS: &[BrowserDescriptor] = &[
    BrowserDescriptor {
        package: "com.android.chrome",
        activity: CHROME_ACTIVITY,
        socket: "chrome_devtools_remote",
        flags_file: "/data/local/tmp/chrome-command-line",
        label: "Chrome",
    },
    BrowserDescriptor {
        package: "com.chrome.beta",
        activity: CHROME_ACTIVITY,
        socket: "chrome_devtools_remote_beta",
        flags_file: "/data/local/tmp/chrome-beta-command-line",
        label: "Chrome Beta",
    },
    BrowserDescriptor {
        package: "com.chrome.dev",
        activity: CHROME_ACTIVITY,
        socket: "chrome_devtools_remote_dev",
        flags_file: "/data/local/tmp/chrome-dev-command-line",
        label: "Chrome Dev",
    },
    BrowserDescriptor {
        package: "com.chrome.canary",
        activity: CHROME_ACTIVITY,
        socket: "chrome_devtools_remote_canary",
        flags_file: "/data/local/tmp/chrome-canary-command-line",
        label: "Chrome Canary",
    },
    BrowserDescriptor {
        package: "org.chromium.webview_shell",
        activity: "org.chromium.webview_shell.WebViewBrowserActivity",
        socket: "webview_devtools_remote",
        flags_file: "/data/local/tmp/webview-command-line",
        label: "WebView Shell",
    },
];

/// The full catalog, in display order
pub fn descriptors() -> &'static [BrowserDescriptor] {
    DESCRIPTORS
}

/// Look a descriptor up by package identifier or (case-insensitive) label
pub fn find(name: &str) -> Option<&'static BrowserDescriptor> {
    DESCRIPTORS
        .iter()
        .find(|d| d.package == name || d.label.eq_ignore_ascii_case(name))
}

/// Whether the descriptor's package is installed on the device.
///
/// Transport errors propagate unchanged.
pub async fn is_installed(
    bridge: &dyn DebugBridge,
    serial: &str,
    descriptor: &BrowserDescriptor,
) -> Result<bool, TransportError> {
    let listing = bridge.shell(serial, "pm list packages").await?;
    Ok(listing.contains(descriptor.package))
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;
