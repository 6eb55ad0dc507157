use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::automation::list_targets;
use crate::catalog::{self, BrowserDescriptor};
use crate::errors::TransportError;
use crate::nickname::NicknameStore;
use crate::reconcile::reconcile;
use crate::session::SessionRegistry;
use crate::transport::{DebugBridge, parse_process_names};
use crate::tunnel::{Tunnel, TunnelManager};
use crate::types::{
    BrowserSnapshot, DeviceSnapshot, DeviceState, FleetSnapshot, PageSnapshot, TargetInfo,
};

/// Enrichment properties fetched once per Offline -> Online transition
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub os_release: String,
    pub sdk_level: String,
}

/// A discovered device and everything we track about it
pub struct Device {
    pub serial: String,
    pub model: Option<String>,
    pub state: DeviceState,
    pub nickname: Option<String>,
    pub info: Option<DeviceInfo>,
    /// Suppresses enrichment re-fetch while the device stays Online
    enriched: bool,
    pub browsers: Vec<RunningBrowser>,
}

/// A catalog browser observed among the device's running processes
pub struct RunningBrowser {
    pub descriptor: &'static BrowserDescriptor,
    /// Open devtools tunnel, when this browser is selected for inspection
    pub tunnel: Option<Tunnel>,
    pub pages: Vec<PageTarget>,
}

impl RunningBrowser {
    /// Reconcile the page list against freshly polled discovery targets.
    ///
    /// Only entries of type "page" are surfaced; surviving pages are updated
    /// in place, keyed by target identifier.
    pub fn apply_targets(&mut self, targets: Vec<TargetInfo>) {
        let fresh: Vec<_> = targets
            .into_iter()
            .filter(|t| t.target_type == "page")
            .collect();
        reconcile(
            &mut self.pages,
            &fresh,
            |p| p.id.clone(),
            |t| t.id.clone(),
            |page, t| {
                page.title = t.title.clone();
                page.url = t.url.clone();
            },
            |t| PageTarget {
                id: t.id.clone(),
                title: t.title.clone(),
                url: t.url.clone(),
            },
        );
    }
}

/// An inspectable page behind a running browser's devtools socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// The device+browser currently selected for detailed (page-level) polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub serial: String,
    pub package: String,
}

/// The live sets: devices, their running browsers and, for the selected
/// browser, its open pages. All mutation happens through the reconciliation
/// routine from a single caller at a time (the poll loop or an explicit
/// refresh), never concurrently.
pub struct Fleet {
    bridge: Arc<dyn DebugBridge>,
    tunnels: Arc<TunnelManager>,
    sessions: Arc<SessionRegistry>,
    nicknames: NicknameStore,
    pub devices: Vec<Device>,
    selection: Option<Selection>,
}

impl Fleet {
    pub fn new(
        bridge: Arc<dyn DebugBridge>,
        tunnels: Arc<TunnelManager>,
        sessions: Arc<SessionRegistry>,
        nicknames: NicknameStore,
    ) -> Self {
        Self {
            bridge,
            tunnels,
            sessions,
            nicknames,
            devices: Vec::new(),
            selection: None,
        }
    }

    /// Reconcile the device set against a fresh enumeration.
    ///
    /// Devices that disappeared are evicted with full teardown (tunnels
    /// closed, session controller disposed); surviving devices are updated
    /// in place so attached browsers, tunnels and selection carry over.
    pub async fn refresh_devices(&mut self) -> Result<(), TransportError> {
        let fresh = self.bridge.list_devices().await?;

        let nicknames = &self.nicknames;
        let evicted = reconcile(
            &mut self.devices,
            &fresh,
            |d| d.serial.clone(),
            |f| f.serial.clone(),
            |device, f| {
                if f.model.is_some() {
                    device.model = f.model.clone();
                }
                // Leaving Online clears the enrichment latch so a
                // reappearing device is re-enriched.
                if device.state == DeviceState::Online && f.state != DeviceState::Online {
                    device.enriched = false;
                }
                device.state = f.state;
            },
            |f| Device {
                serial: f.serial.clone(),
                model: f.model.clone(),
                state: f.state,
                nickname: nicknames.get(&f.serial).map(|n| n.to_string()),
                info: None,
                enriched: false,
                browsers: Vec::new(),
            },
        );

        for device in evicted {
            info!("Device {} disappeared, tearing down", device.serial);
            for browser in &device.browsers {
                if let Some(tunnel) = &browser.tunnel {
                    self.tunnels.close(tunnel).await;
                }
            }
            self.sessions.dispose(&device.serial).await;
            if self
                .selection
                .as_ref()
                .is_some_and(|s| s.serial == device.serial)
            {
                self.selection = None;
            }
        }

        Ok(())
    }

    /// Fetch enrichment properties for the device at `index`, unless it is
    /// not Online or was already enriched during this Online stretch.
    pub async fn enrich_device(&mut self, index: usize) -> Result<(), TransportError> {
        let (serial, wanted) = {
            let device = &self.devices[index];
            (
                device.serial.clone(),
                device.state == DeviceState::Online && !device.enriched,
            )
        };
        if !wanted {
            return Ok(());
        }

        let manufacturer = self
            .bridge
            .shell(&serial, "getprop ro.product.manufacturer")
            .await?;
        let os_release = self
            .bridge
            .shell(&serial, "getprop ro.build.version.release")
            .await?;
        let sdk_level = self
            .bridge
            .shell(&serial, "getprop ro.build.version.sdk")
            .await?;

        let device = &mut self.devices[index];
        device.info = Some(DeviceInfo {
            manufacturer: manufacturer.trim().to_string(),
            os_release: os_release.trim().to_string(),
            sdk_level: sdk_level.trim().to_string(),
        });
        device.enriched = true;
        debug!("Enriched {}", serial);
        Ok(())
    }

    /// Re-scan the running-process list of the device at `index` and
    /// reconcile its running-browser set against the catalog.
    pub async fn scan_browsers(&mut self, index: usize) -> Result<(), TransportError> {
        let serial = self.devices[index].serial.clone();
        let online = self.devices[index].state == DeviceState::Online;

        let fresh: Vec<&'static BrowserDescriptor> = if online {
            let listing = self.bridge.shell(&serial, "ps -A").await?;
            let names = parse_process_names(&listing);
            catalog::descriptors()
                .iter()
                .filter(|d| names.iter().any(|n| n == d.package))
                .collect()
        } else {
            Vec::new()
        };

        let evicted = reconcile(
            &mut self.devices[index].browsers,
            &fresh,
            |b| b.descriptor.package,
            |f| f.package,
            |_, _| {}, // descriptors are immutable, nothing to update
            |f| RunningBrowser {
                descriptor: f,
                tunnel: None,
                pages: Vec::new(),
            },
        );

        for browser in evicted {
            info!(
                "{} no longer running on {}, tearing down",
                browser.descriptor.label, serial
            );
            if let Some(tunnel) = &browser.tunnel {
                self.tunnels.close(tunnel).await;
            }
            if self
                .selection
                .as_ref()
                .is_some_and(|s| s.serial == serial && s.package == browser.descriptor.package)
            {
                self.selection = None;
            }
        }

        Ok(())
    }

    /// Select a device+browser for page-level polling
    pub fn select(&mut self, serial: &str, package: &str) {
        self.selection = Some(Selection {
            serial: serial.to_string(),
            package: package.to_string(),
        });
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Poll the page list of the selected browser, opening its devtools
    /// tunnel lazily.
    ///
    /// A failed target query tears the tunnel down so the next tick retries
    /// with a fresh one instead of surfacing the same error repeatedly.
    pub async fn refresh_selected_pages(&mut self) {
        let Some(selection) = self.selection.clone() else {
            return;
        };
        let tunnels = Arc::clone(&self.tunnels);

        let Some(browser) = self
            .devices
            .iter_mut()
            .find(|d| d.serial == selection.serial)
            .and_then(|d| {
                d.browsers
                    .iter_mut()
                    .find(|b| b.descriptor.package == selection.package)
            })
        else {
            return;
        };

        if browser.tunnel.is_none() {
            match tunnels
                .open(&selection.serial, browser.descriptor.socket, 0)
                .await
            {
                Ok(tunnel) => browser.tunnel = Some(tunnel),
                Err(e) => {
                    warn!(
                        "Could not open inspection tunnel to {} on {}: {}",
                        browser.descriptor.label, selection.serial, e
                    );
                    return;
                }
            }
        }

        let Some(tunnel) = browser.tunnel.clone() else {
            return;
        };
        let targets = match list_targets(&tunnel).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(
                    "Target query on {} failed, dropping tunnel for retry: {}",
                    selection.serial, e
                );
                browser.tunnel = None;
                tunnels.close(&tunnel).await;
                return;
            }
        };

        browser.apply_targets(targets);
    }

    /// Set or clear a device nickname, persisting it (best-effort) and
    /// updating the live entry if the device is currently present
    pub fn set_nickname(&mut self, serial: &str, name: &str) {
        self.nicknames.set(serial, name);
        if let Some(device) = self.devices.iter_mut().find(|d| d.serial == serial) {
            device.nickname = self.nicknames.get(serial).map(|n| n.to_string());
        }
    }

    pub fn nickname(&self, serial: &str) -> Option<&str> {
        self.nicknames.get(serial)
    }

    /// Plain-data view for subscribers
    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            devices: self
                .devices
                .iter()
                .map(|d| DeviceSnapshot {
                    serial: d.serial.clone(),
                    model: d.model.clone(),
                    state: d.state,
                    nickname: d.nickname.clone(),
                    manufacturer: d.info.as_ref().map(|i| i.manufacturer.clone()),
                    os_release: d.info.as_ref().map(|i| i.os_release.clone()),
                    sdk_level: d.info.as_ref().map(|i| i.sdk_level.clone()),
                    browsers: d
                        .browsers
                        .iter()
                        .map(|b| BrowserSnapshot {
                            package: b.descriptor.package.to_string(),
                            label: b.descriptor.label.to_string(),
                            local_port: b.tunnel.as_ref().map(|t| t.local_port),
                            pages: b
                                .pages
                                .iter()
                                .map(|p| PageSnapshot {
                                    id: p.id.clone(),
                                    title: p.title.clone(),
                                    url: p.url.clone(),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
            error: None,
        }
    }
}

#[cfg(test)]
#[path = "fleet_test.rs"]
mod fleet_test;
