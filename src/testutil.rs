//! In-memory fakes for the transport and automation seams, shared by the
//! unit-test modules.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::automation::{ConnectOptions, RemoteBrowser, RemoteBrowserConnector, RemotePage};
use crate::errors::{SessionError, TransportError};
use crate::transport::{DebugBridge, DiscoveredDevice};

/// Scripted in-memory debug bridge
#[derive(Default)]
pub struct FakeBridge {
    pub devices: Mutex<Vec<DiscoveredDevice>>,
    /// Every shell invocation, as (serial, command)
    pub shell_log: Mutex<Vec<(String, String)>>,
    /// Canned stdout keyed by command prefix, first match wins
    pub responses: Mutex<Vec<(String, String)>>,
    /// Registered forwards, as (serial, local port, remote spec)
    pub forwards: Mutex<Vec<(String, u16, String)>>,
    /// Removed forwards, as (serial, local port)
    pub removed: Mutex<Vec<(String, u16)>>,
    /// Number of upcoming create_forward calls to fail
    pub fail_forwards: AtomicUsize,
    /// When set, remove_forward fails (closers must swallow this)
    pub fail_removals: AtomicBool,
    /// When set, list_devices fails
    pub fail_list: AtomicBool,
    /// Command prefixes whose shell invocations fail (still logged)
    pub fail_shell_prefixes: Mutex<Vec<String>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_devices(&self, devices: Vec<DiscoveredDevice>) {
        *self.devices.lock().unwrap() = devices;
    }

    /// Script the stdout of shell commands starting with `prefix`,
    /// replacing any earlier script for the same prefix
    pub fn respond(&self, prefix: &str, stdout: &str) {
        let mut responses = self.responses.lock().unwrap();
        if let Some(entry) = responses.iter_mut().find(|(p, _)| p == prefix) {
            entry.1 = stdout.to_string();
        } else {
            responses.push((prefix.to_string(), stdout.to_string()));
        }
    }

    /// Make shell commands starting with `prefix` fail
    pub fn fail_shell(&self, prefix: &str) {
        self.fail_shell_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// How many logged shell commands contain `needle`
    pub fn shell_count(&self, needle: &str) -> usize {
        self.shell_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cmd)| cmd.contains(needle))
            .count()
    }
}

#[async_trait]
impl DebugBridge for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TransportError::Command {
                action: "enumerating devices".to_string(),
                stderr: "adb server not running".to_string(),
            });
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String, TransportError> {
        self.shell_log
            .lock()
            .unwrap()
            .push((serial.to_string(), command.to_string()));
        if self
            .fail_shell_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| command.starts_with(p.as_str()))
        {
            return Err(TransportError::Command {
                action: format!("running '{}'", command),
                stderr: "closed".to_string(),
            });
        }
        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }

    async fn create_forward(
        &self,
        serial: &str,
        local: &str,
        remote: &str,
    ) -> Result<(), TransportError> {
        if self
            .fail_forwards
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransportError::Command {
                action: format!("forwarding {} to {}", local, remote),
                stderr: "cannot bind listener".to_string(),
            });
        }
        let port = local
            .strip_prefix("tcp:")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(0);
        self.forwards
            .lock()
            .unwrap()
            .push((serial.to_string(), port, remote.to_string()));
        Ok(())
    }

    async fn remove_forward(&self, serial: &str, local_port: u16) -> Result<(), TransportError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(TransportError::Command {
                action: format!("removing forward tcp:{}", local_port),
                stderr: "device offline".to_string(),
            });
        }
        self.removed
            .lock()
            .unwrap()
            .push((serial.to_string(), local_port));
        Ok(())
    }
}

/// Connector handing out [`FakeBrowser`]s, optionally failing first
pub struct FakeConnector {
    pub connects: AtomicUsize,
    /// Number of upcoming connects to fail
    pub fail_connects: AtomicUsize,
    /// Liveness flag of the most recently created browser
    pub last_connected: Mutex<Option<Arc<AtomicBool>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            last_connected: Mutex::new(None),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Flip the most recent browser's liveness flag off
    pub fn kill_last(&self) {
        if let Some(flag) = self.last_connected.lock().unwrap().as_ref() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RemoteBrowserConnector for FakeConnector {
    async fn connect(
        &self,
        _http_url: &str,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn RemoteBrowser>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SessionError::automation(
                "connecting automation client",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ));
        }
        let connected = Arc::new(AtomicBool::new(true));
        *self.last_connected.lock().unwrap() = Some(Arc::clone(&connected));
        Ok(Box::new(FakeBrowser {
            connected,
            pages: Mutex::new(vec!["launch-page".to_string()]),
        }))
    }
}

pub struct FakeBrowser {
    pub connected: Arc<AtomicBool>,
    pub pages: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteBrowser for FakeBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn pages(&self) -> Result<Vec<Box<dyn RemotePage>>, SessionError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|url| Box::new(FakePage { url: url.clone() }) as Box<dyn RemotePage>)
            .collect())
    }

    async fn new_page(&self, url: &str) -> Result<Box<dyn RemotePage>, SessionError> {
        self.pages.lock().unwrap().push(url.to_string());
        Ok(Box::new(FakePage {
            url: url.to_string(),
        }))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePage {
    pub url: String,
}

#[async_trait]
impl RemotePage for FakePage {
    async fn url(&self) -> Option<String> {
        Some(self.url.clone())
    }

    async fn goto(&self, _url: &str) -> Result<(), SessionError> {
        Ok(())
    }
}
