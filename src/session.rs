use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::automation::{ConnectOptions, RemoteBrowser, RemoteBrowserConnector, RemotePage};
use crate::catalog::BrowserDescriptor;
use crate::errors::{SessionError, best_effort};
use crate::transport::{DebugBridge, parse_unix_sockets};
use crate::tunnel::{Tunnel, TunnelManager};

/// Fixed delay after the launch intent before we look for the debug socket
const LAUNCH_SETTLE: Duration = Duration::from_millis(2000);
/// Socket readiness polling after the settle delay
const SOCKET_POLL_ATTEMPTS: u32 = 10;
const SOCKET_POLL_DELAY: Duration = Duration::from_millis(200);

/// Observable lifecycle phase of a device's session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No tunnel, no connection
    Idle,
    /// Browser start command issued
    Launching,
    /// Port forward being created
    Tunneling,
    /// Automation handle live
    Connected,
    /// Controller disposed; fails fast from here on
    Closed,
}

struct ActiveSession {
    descriptor: &'static BrowserDescriptor,
    tunnel: Tunnel,
    browser: Box<dyn RemoteBrowser>,
}

enum State {
    Idle,
    Connected(ActiveSession),
    Closed,
}

struct Inner {
    state: State,
}

/// Per-device session state machine: Idle -> Launching -> Tunneling ->
/// Connected, back to Idle on teardown.
///
/// A single tokio mutex serializes every lifecycle-changing request for the
/// device; concurrent `get_page` calls queue behind it while other devices
/// proceed in parallel.
pub struct SessionController {
    serial: String,
    bridge: Arc<dyn DebugBridge>,
    tunnels: Arc<TunnelManager>,
    connector: Arc<dyn RemoteBrowserConnector>,
    options: ConnectOptions,
    phase: StdMutex<SessionPhase>,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(
        serial: String,
        bridge: Arc<dyn DebugBridge>,
        tunnels: Arc<TunnelManager>,
        connector: Arc<dyn RemoteBrowserConnector>,
        options: ConnectOptions,
    ) -> Self {
        Self {
            serial,
            bridge,
            tunnels,
            connector,
            options,
            phase: StdMutex::new(SessionPhase::Idle),
            inner: Mutex::new(Inner { state: State::Idle }),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Current lifecycle phase (may be mid-transition when observed from
    /// another task)
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Get a page showing `url` in the given browser, launching, tunneling
    /// and connecting as needed.
    ///
    /// An existing live session for the same browser is reused (a fresh page
    /// is opened on it, no relaunch). A session whose connection has died,
    /// or that belongs to a different browser, is torn down first. A tunnel
    /// opened by a transition that then fails is closed before the error
    /// propagates.
    pub async fn get_page(
        &self,
        descriptor: &'static BrowserDescriptor,
        url: &str,
    ) -> Result<Box<dyn RemotePage>, SessionError> {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, State::Closed) {
            return Err(SessionError::Closed(self.serial.clone()));
        }

        let stale = match &inner.state {
            State::Connected(active) => {
                if !active.browser.is_connected() {
                    debug!("Session on {} lost its connection", self.serial);
                    true
                } else {
                    active.descriptor.package != descriptor.package
                }
            }
            _ => false,
        };
        if stale {
            self.teardown(&mut inner).await;
        }

        if let State::Connected(active) = &inner.state {
            debug!("Reusing live session on {}", self.serial);
            return active.browser.new_page(url).await;
        }

        // Resets the phase to Idle on any early exit, errors and caller
        // cancellation alike.
        let phase_guard = PhaseGuard::new(&self.phase);

        self.set_phase(SessionPhase::Launching);
        self.launch(descriptor, url).await?;

        self.set_phase(SessionPhase::Tunneling);
        let tunnel = self
            .tunnels
            .open(&self.serial, descriptor.socket, 0)
            .await
            .map_err(|e| SessionError::tunnel(format!("tunneling to {}", descriptor.label), e))?;

        // If the caller is cancelled from here on, the guard closes the
        // tunnel from a spawned task.
        let guard = TunnelGuard::new(Arc::clone(&self.tunnels), tunnel.clone());

        let browser = match self.connector.connect(&tunnel.http_url(), &self.options).await {
            Ok(browser) => browser,
            Err(e) => {
                guard.disarm();
                self.tunnels.close(&tunnel).await;
                return Err(e);
            }
        };

        // The launch intent already carried the URL; prefer the page it
        // opened over creating another one.
        let page = match Self::first_or_new_page(browser.as_ref(), url).await {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                best_effort("closing automation client", browser.close()).await;
                guard.disarm();
                self.tunnels.close(&tunnel).await;
                return Err(e);
            }
        };

        guard.disarm();
        phase_guard.disarm();
        self.set_phase(SessionPhase::Connected);
        inner.state = State::Connected(ActiveSession {
            descriptor,
            tunnel,
            browser,
        });
        info!("Session established with {} on {}", descriptor.label, self.serial);
        Ok(page)
    }

    async fn first_or_new_page(
        browser: &dyn RemoteBrowser,
        url: &str,
    ) -> Result<Box<dyn RemotePage>, SessionError> {
        let pages = browser.pages().await?;
        if let Some(page) = pages.into_iter().next() {
            return Ok(page);
        }
        browser.new_page(url).await
    }

    /// Issue the launch sequence: automation flags, force-stop of any prior
    /// instance, activity start with the target URL, then wait for the
    /// debug socket.
    async fn launch(
        &self,
        descriptor: &'static BrowserDescriptor,
        url: &str,
    ) -> Result<(), SessionError> {
        info!("Launching {} on {}", descriptor.label, self.serial);

        let flags = format!(
            "echo '_ --disable-fre --no-default-browser-check --no-first-run' > {}",
            descriptor.flags_file
        );
        self.bridge.shell(&self.serial, &flags).await.map_err(|e| {
            SessionError::transport(
                format!("writing automation flags for {}", descriptor.label),
                e,
            )
        })?;

        self.bridge
            .shell(&self.serial, &format!("am force-stop {}", descriptor.package))
            .await
            .map_err(|e| {
                SessionError::transport(format!("stopping {}", descriptor.label), e)
            })?;

        let start = format!(
            "am start -a android.intent.action.VIEW -n {}/{} -d '{}'",
            descriptor.package, descriptor.activity, url
        );
        self.bridge
            .shell(&self.serial, &start)
            .await
            .map_err(|e| {
                SessionError::transport(format!("starting {}", descriptor.label), e)
            })?;

        sleep(LAUNCH_SETTLE).await;
        self.wait_for_socket(descriptor.socket).await;
        Ok(())
    }

    /// Poll `/proc/net/unix` until the devtools socket shows up. The check
    /// is advisory; after the attempts run out we proceed and let the
    /// tunnel/connect step produce the real error.
    async fn wait_for_socket(&self, socket: &str) {
        for attempt in 1..=SOCKET_POLL_ATTEMPTS {
            if let Ok(listing) = self.bridge.shell(&self.serial, "cat /proc/net/unix").await {
                if parse_unix_sockets(&listing, "devtools_remote")
                    .iter()
                    .any(|s| s == socket)
                {
                    debug!("Debug socket {} up after {} attempts", socket, attempt);
                    return;
                }
            }
            sleep(SOCKET_POLL_DELAY).await;
        }
        warn!(
            "Debug socket {} not observed on {}, proceeding anyway",
            socket, self.serial
        );
    }

    /// Tear down a connected session: best-effort close of the automation
    /// handle, best-effort close of the tunnel, back to Idle.
    async fn teardown(&self, inner: &mut Inner) {
        if !matches!(inner.state, State::Connected(_)) {
            return;
        }
        if let State::Connected(mut active) = std::mem::replace(&mut inner.state, State::Idle) {
            best_effort("closing automation client", active.browser.close()).await;
            self.tunnels.close(&active.tunnel).await;
        }
        self.set_phase(SessionPhase::Idle);
    }

    /// Tear down any live session and mark the controller terminally
    /// closed. Idempotent; `get_page` fails fast afterwards.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        inner.state = State::Closed;
        self.set_phase(SessionPhase::Closed);
        debug!("Session controller for {} disposed", self.serial);
    }
}

/// Puts the observable phase back to Idle when a lifecycle transition exits
/// before reaching Connected, whether by error or by the caller dropping the
/// future mid-await.
struct PhaseGuard<'a> {
    phase: &'a StdMutex<SessionPhase>,
    armed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(phase: &'a StdMutex<SessionPhase>) -> Self {
        Self { phase, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = SessionPhase::Idle;
        }
    }
}

/// Closes a freshly opened tunnel if the owning operation is dropped before
/// it either stores or explicitly closes it. Drop cannot await, so the
/// close happens on a spawned task.
struct TunnelGuard {
    tunnels: Arc<TunnelManager>,
    tunnel: Option<Tunnel>,
}

impl TunnelGuard {
    fn new(tunnels: Arc<TunnelManager>, tunnel: Tunnel) -> Self {
        Self {
            tunnels,
            tunnel: Some(tunnel),
        }
    }

    fn disarm(mut self) {
        self.tunnel = None;
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        if let Some(tunnel) = self.tunnel.take() {
            let tunnels = Arc::clone(&self.tunnels);
            tokio::spawn(async move {
                tunnels.close(&tunnel).await;
            });
        }
    }
}

/// One [`SessionController`] per device serial, created on first use and
/// disposed when the device leaves the live set.
pub struct SessionRegistry {
    bridge: Arc<dyn DebugBridge>,
    tunnels: Arc<TunnelManager>,
    connector: Arc<dyn RemoteBrowserConnector>,
    options: ConnectOptions,
    controllers: DashMap<String, Arc<SessionController>>,
}

impl SessionRegistry {
    pub fn new(
        bridge: Arc<dyn DebugBridge>,
        tunnels: Arc<TunnelManager>,
        connector: Arc<dyn RemoteBrowserConnector>,
        options: ConnectOptions,
    ) -> Self {
        Self {
            bridge,
            tunnels,
            connector,
            options,
            controllers: DashMap::new(),
        }
    }

    /// Get or create the controller for a serial
    pub fn controller(&self, serial: &str) -> Arc<SessionController> {
        self.controllers
            .entry(serial.to_string())
            .or_insert_with(|| {
                Arc::new(SessionController::new(
                    serial.to_string(),
                    Arc::clone(&self.bridge),
                    Arc::clone(&self.tunnels),
                    Arc::clone(&self.connector),
                    self.options.clone(),
                ))
            })
            .clone()
    }

    /// Dispose and drop the controller for a serial, if one exists
    pub async fn dispose(&self, serial: &str) {
        if let Some((_, controller)) = self.controllers.remove(serial) {
            controller.dispose().await;
        }
    }

    /// Dispose every controller (shutdown path)
    pub async fn dispose_all(&self) {
        let serials: Vec<String> = self.controllers.iter().map(|e| e.key().clone()).collect();
        for serial in serials {
            self.dispose(&serial).await;
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
