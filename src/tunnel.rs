use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{TunnelError, best_effort};
use crate::transport::DebugBridge;

/// A live mapping from an ephemeral local TCP port to a named abstract
/// socket on one device.
///
/// The handle is plain data; closing goes through the [`TunnelManager`] that
/// opened it (and is idempotent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub serial: String,
    pub socket: String,
    pub local_port: u16,
}

impl Tunnel {
    /// Local endpoint as an HTTP base URL
    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.local_port)
    }

    /// DevTools discovery endpoint behind this tunnel
    pub fn targets_url(&self) -> String {
        format!("{}/json/list", self.http_url())
    }

    /// DevTools version endpoint, which carries the browser WebSocket URL
    pub fn version_url(&self) -> String {
        format!("{}/json/version", self.http_url())
    }
}

/// Opens and closes devtools tunnels, tracking every open one so they can
/// be torn down in bulk at shutdown.
pub struct TunnelManager {
    bridge: Arc<dyn DebugBridge>,
    open: Mutex<Vec<Tunnel>>,
}

impl TunnelManager {
    pub fn new(bridge: Arc<dyn DebugBridge>) -> Self {
        Self {
            bridge,
            open: Mutex::new(Vec::new()),
        }
    }

    /// Open a tunnel from a local port to the named socket on the device.
    ///
    /// `local_port` 0 probes for a free ephemeral port. The probe releases
    /// the port before registration, so a concurrent caller can race us to
    /// it; registration failure on a probed port is retried once with a
    /// fresh probe.
    pub async fn open(
        &self,
        serial: &str,
        socket: &str,
        local_port: u16,
    ) -> Result<Tunnel, TunnelError> {
        let probed = local_port == 0;
        let mut port = if probed { free_port()? } else { local_port };

        if let Err(first) = self.register(serial, socket, port).await {
            if !probed {
                return Err(first);
            }
            warn!(
                "forward registration on probed port {} failed, retrying with a fresh port: {}",
                port, first
            );
            port = free_port()?;
            self.register(serial, socket, port).await?;
        }

        let tunnel = Tunnel {
            serial: serial.to_string(),
            socket: socket.to_string(),
            local_port: port,
        };
        info!(
            "Opened tunnel 127.0.0.1:{} -> {}:{}",
            port, serial, socket
        );
        self.open.lock().await.push(tunnel.clone());
        Ok(tunnel)
    }

    async fn register(&self, serial: &str, socket: &str, port: u16) -> Result<(), TunnelError> {
        let local = format!("tcp:{}", port);
        let remote = format!("localabstract:{}", socket);
        self.bridge
            .create_forward(serial, &local, &remote)
            .await
            .map_err(|e| TunnelError::Forward {
                action: format!("opening tunnel to {} on {}", socket, serial),
                source: e,
            })
    }

    /// Close a tunnel. Idempotent; deregistration is best-effort since the
    /// device may already be gone.
    pub async fn close(&self, tunnel: &Tunnel) {
        let tracked = {
            let mut open = self.open.lock().await;
            match open.iter().position(|t| t == tunnel) {
                Some(i) => {
                    open.remove(i);
                    true
                }
                None => false,
            }
        };
        if !tracked {
            debug!(
                "Tunnel on port {} already closed, nothing to do",
                tunnel.local_port
            );
            return;
        }

        best_effort(
            "removing forward",
            self.bridge.remove_forward(&tunnel.serial, tunnel.local_port),
        )
        .await;
        info!("Closed tunnel on port {}", tunnel.local_port);
    }

    /// Close every tunnel this manager is tracking (top-level shutdown)
    pub async fn close_all(&self) {
        let tunnels: Vec<Tunnel> = std::mem::take(&mut *self.open.lock().await);
        for tunnel in tunnels {
            best_effort(
                "removing forward",
                self.bridge.remove_forward(&tunnel.serial, tunnel.local_port),
            )
            .await;
        }
    }

    /// Number of currently tracked tunnels
    pub async fn open_count(&self) -> usize {
        self.open.lock().await.len()
    }
}

/// Probe for a free ephemeral port by binding and immediately releasing a
/// listener. The port can be taken again before we register the forward;
/// [`TunnelManager::open`] handles that race by retrying.
fn free_port() -> Result<u16, TunnelError> {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").map_err(TunnelError::PortProbe)?;
    let port = listener
        .local_addr()
        .map_err(TunnelError::PortProbe)?
        .port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
#[path = "tunnel_test.rs"]
mod tunnel_test;
