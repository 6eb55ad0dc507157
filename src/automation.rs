use async_trait::async_trait;
use chromiumoxide::browser::Browser as CdpBrowserInner;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::errors::SessionError;
use crate::tunnel::Tunnel;
use crate::types::TargetInfo;

/// Options for establishing the automation connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How long to wait for the WebSocket connection to come up
    pub connect_timeout: Duration,
    /// Optional delay inserted before every page operation
    pub slow_mo: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            slow_mo: None,
        }
    }
}

/// A single page (tab) behind a connected automation handle
#[async_trait]
pub trait RemotePage: Send + Sync {
    /// Current URL, when the page reports one
    async fn url(&self) -> Option<String>;

    /// Navigate this page
    async fn goto(&self, url: &str) -> Result<(), SessionError>;
}

/// A connected remote-debugging client session.
///
/// The actual protocol (navigation, DOM access) is out of scope here; the
/// session lifecycle only needs liveness, page listing and page creation.
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    /// Whether the underlying connection is still alive
    fn is_connected(&self) -> bool;

    /// Pages currently open in the browser
    async fn pages(&self) -> Result<Vec<Box<dyn RemotePage>>, SessionError>;

    /// Open a new page and navigate it to `url`
    async fn new_page(&self, url: &str) -> Result<Box<dyn RemotePage>, SessionError>;

    /// Drop the connection. Best-effort; callers swallow the result.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Factory seam for connecting an automation handle over a tunnel
#[async_trait]
pub trait RemoteBrowserConnector: Send + Sync {
    async fn connect(
        &self,
        http_url: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn RemoteBrowser>, SessionError>;
}

lazy_static::lazy_static! {
    static ref HTTP: reqwest::Client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    websocket_debugger_url: String,
}

/// Query the DevTools discovery endpoint behind a tunnel.
///
/// Returns every advertised target; callers filter for `type == "page"`.
pub async fn list_targets(tunnel: &Tunnel) -> Result<Vec<TargetInfo>, SessionError> {
    let url = tunnel.targets_url();
    debug!("Listing targets via {}", url);
    let response = HTTP
        .get(&url)
        .send()
        .await
        .map_err(|e| SessionError::automation("querying target list", e))?;
    response
        .json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| SessionError::automation("parsing target list", e))
}

/// Production connector speaking the Chrome DevTools Protocol
pub struct CdpConnector;

#[async_trait]
impl RemoteBrowserConnector for CdpConnector {
    async fn connect(
        &self,
        http_url: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn RemoteBrowser>, SessionError> {
        // The browser-level WebSocket URL is advertised on /json/version
        let version_url = format!("{}/json/version", http_url);
        let version = HTTP
            .get(&version_url)
            .send()
            .await
            .map_err(|e| SessionError::automation("querying devtools version", e))?
            .json::<VersionInfo>()
            .await
            .map_err(|e| SessionError::automation("parsing devtools version", e))?;

        let ws_url = url::Url::parse(&version.websocket_debugger_url)
            .map_err(|e| SessionError::automation("parsing websocket url", e))?;
        debug!("Connecting CDP client to {}", ws_url);

        let (browser, mut handler) =
            timeout(options.connect_timeout, CdpBrowserInner::connect(ws_url.as_str()))
                .await
                .map_err(|e| SessionError::automation("connecting automation client", e))?
                .map_err(|e| SessionError::automation("connecting automation client", e))?;

        // The handler stream drives the WebSocket; it ends when the
        // connection drops, which is our liveness signal.
        let driver: JoinHandle<()> = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("CDP event loop ended");
        });

        info!("Automation client connected via {}", http_url);
        Ok(Box::new(CdpSession {
            browser,
            driver,
            slow_mo: options.slow_mo,
        }))
    }
}

struct CdpSession {
    browser: CdpBrowserInner,
    driver: JoinHandle<()>,
    slow_mo: Option<Duration>,
}

#[async_trait]
impl RemoteBrowser for CdpSession {
    fn is_connected(&self) -> bool {
        !self.driver.is_finished()
    }

    async fn pages(&self) -> Result<Vec<Box<dyn RemotePage>>, SessionError> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| SessionError::automation("listing pages", e))?;
        Ok(pages
            .into_iter()
            .map(|page| {
                Box::new(CdpPage {
                    page,
                    slow_mo: self.slow_mo,
                }) as Box<dyn RemotePage>
            })
            .collect())
    }

    async fn new_page(&self, url: &str) -> Result<Box<dyn RemotePage>, SessionError> {
        if let Some(delay) = self.slow_mo {
            tokio::time::sleep(delay).await;
        }
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| SessionError::automation("opening a new page", e))?;
        Ok(Box::new(CdpPage {
            page,
            slow_mo: self.slow_mo,
        }))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::automation("closing automation client", e));
        self.driver.abort();
        result
    }
}

struct CdpPage {
    page: chromiumoxide::Page,
    slow_mo: Option<Duration>,
}

#[async_trait]
impl RemotePage for CdpPage {
    async fn url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn goto(&self, url: &str) -> Result<(), SessionError> {
        if let Some(delay) = self.slow_mo {
            tokio::time::sleep(delay).await;
        }
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::automation("navigating page", e))
    }
}
