//! # droidprobe
#![allow(clippy::uninlined_format_args)]
//!
//! Discovers Android devices over adb, launches Chrome-family browsers on
//! them, tunnels their DevTools sockets to local ports and keeps a live
//! automation connection as devices and browsers come and go.
//!
//! The core is a per-device session lifecycle state machine
//! (Idle -> Launching -> Tunneling -> Connected) plus a generic
//! reconciliation routine that keeps the in-memory device, browser and page
//! sets synchronized with periodically polled ground truth without
//! discarding live state for entries that merely persisted.
//!
//! ## CLI Usage
//!
//! ```bash
//! # List devices once
//! droidprobe devices
//!
//! # Watch devices, running browsers and pages continuously
//! droidprobe watch
//!
//! # Launch Chrome on a device and open a page
//! droidprobe open SERIAL "https://example.com"
//!
//! # List the pages a running browser exposes
//! droidprobe targets SERIAL --browser chrome
//!
//! # Flash a device's screen to find it in a pile
//! droidprobe identify SERIAL
//!
//! # Wake and unlock a device
//! droidprobe wake SERIAL --pin 1234
//!
//! # Give a device a persistent nickname
//! droidprobe nickname SERIAL "desk phone"
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use droidprobe::automation::{CdpConnector, ConnectOptions};
//! use droidprobe::session::SessionRegistry;
//! use droidprobe::transport::AdbTransport;
//! use droidprobe::tunnel::TunnelManager;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let bridge = Arc::new(AdbTransport::new(None)?);
//! bridge.version().await?;
//!
//! let tunnels = Arc::new(TunnelManager::new(bridge.clone()));
//! let sessions = SessionRegistry::new(
//!     bridge,
//!     tunnels,
//!     Arc::new(CdpConnector),
//!     ConnectOptions::default(),
//! );
//!
//! let chrome = droidprobe::catalog::find("chrome").unwrap();
//! let controller = sessions.controller("SERIAL");
//! let page = controller.get_page(chrome, "https://example.com").await?;
//! # Ok(())
//! # }
//! ```

/// Automation-protocol boundary: connector/browser/page traits and the CDP
/// implementation
pub mod automation;

/// Static catalog of launchable browser variants
pub mod catalog;

/// Error taxonomy and the best-effort helper
pub mod errors;

/// Live device/browser/page sets and their reconciliation
pub mod fleet;

/// Polling driver publishing fleet snapshots
pub mod poller;

/// Generic diff-and-merge routine
pub mod reconcile;

/// Persistent device nicknames
pub mod nickname;

/// Screen wake, lock-screen dismissal and identification flash
pub mod screen;

/// Per-device session lifecycle controllers
pub mod session;

/// Debug-bridge transport trait and the adb implementation
pub mod transport;

/// Devtools port tunnels
pub mod tunnel;

/// Plain data types shared across modules
pub mod types;

#[cfg(test)]
mod testutil;

pub use catalog::BrowserDescriptor;
pub use errors::{SessionError, TransportError, TunnelError};
pub use fleet::Fleet;
pub use nickname::NicknameStore;
pub use poller::{Poller, PollerHandle};
pub use session::{SessionController, SessionRegistry};
pub use transport::{AdbTransport, DebugBridge, DiscoveredDevice};
pub use tunnel::{Tunnel, TunnelManager};
pub use types::{DeviceState, FleetSnapshot, OutputFormat, TargetInfo};
