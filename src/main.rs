#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droidprobe::automation::{CdpConnector, ConnectOptions, list_targets};
use droidprobe::errors::exit_code_for;
use droidprobe::fleet::Fleet;
use droidprobe::poller::{self, Poller};
use droidprobe::session::SessionRegistry;
use droidprobe::transport::{AdbTransport, DebugBridge};
use droidprobe::tunnel::TunnelManager;
use droidprobe::types::OutputFormat;
use droidprobe::{NicknameStore, catalog, screen};

const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "droidprobe")]
#[command(about = "Drive Android browsers over adb and DevTools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the adb executable (resolved from PATH by default)
    #[arg(long, global = true)]
    adb: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices known to adb
    Devices {
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Continuously poll devices, running browsers and pages
    Watch {
        /// Polling interval in seconds
        #[arg(long, default_value_t = poller::DEFAULT_INTERVAL.as_secs())]
        interval: u64,

        /// Also poll the page list of SERIAL:BROWSER (e.g. SERIALX:chrome)
        #[arg(long)]
        inspect: Option<String>,
    },

    /// Launch a browser on a device and open a URL
    Open {
        /// Device serial
        serial: String,

        /// URL to open
        url: String,

        /// Browser to launch (label or package)
        #[arg(short, long, default_value = "chrome")]
        browser: String,

        /// Wake and unlock the device first
        #[arg(long)]
        wake: bool,

        /// PIN to enter when dismissing the lock screen
        #[arg(long)]
        pin: Option<String>,

        /// Automation connect timeout in seconds
        #[arg(long, default_value_t = 20)]
        connect_timeout: u64,
    },

    /// List the pages a running browser exposes
    Targets {
        /// Device serial
        serial: String,

        /// Browser to query (label or package)
        #[arg(short, long, default_value = "chrome")]
        browser: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Flash the device screen so it can be identified
    Identify {
        /// Device serial
        serial: String,

        /// Flash duration in milliseconds
        #[arg(long, default_value_t = 1000)]
        duration: u64,
    },

    /// Wake the device and dismiss its lock screen
    Wake {
        /// Device serial
        serial: String,

        /// PIN to enter after the swipe
        #[arg(long)]
        pin: Option<String>,
    },

    /// Show or set a device nickname (an empty name clears it)
    Nickname {
        /// Device serial
        serial: String,

        /// New nickname; omit to show the current one
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let code = exit_code_for(&err);
            let error_json = json!({
                "error": true,
                "message": format!("{:#}", err),
                "exit_code": code
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );
            eprintln!("Error: {:#}", err);
            std::process::exit(code);
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "droidprobe=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    // Startup failure of the transport is fatal; nothing below works
    // without it.
    let bridge = Arc::new(AdbTransport::new(cli.adb)?);
    bridge.version().await?;

    match cli.command {
        Commands::Devices { format } => handle_devices(bridge, format).await,
        Commands::Watch { interval, inspect } => {
            handle_watch(bridge, Duration::from_secs(interval), inspect).await
        }
        Commands::Open {
            serial,
            url,
            browser,
            wake,
            pin,
            connect_timeout,
        } => {
            handle_open(
                bridge,
                serial,
                url,
                browser,
                wake,
                pin,
                Duration::from_secs(connect_timeout),
            )
            .await
        }
        Commands::Targets {
            serial,
            browser,
            format,
        } => handle_targets(bridge, serial, browser, format).await,
        Commands::Identify { serial, duration } => {
            screen::identify(bridge, &serial, Duration::from_millis(duration)).await;
            println!("{}", json!({ "identified": serial }));
            Ok(())
        }
        Commands::Wake { serial, pin } => {
            screen::ensure_awake(bridge.as_ref(), &serial, pin.as_deref()).await?;
            println!("{}", json!({ "awake": serial }));
            Ok(())
        }
        Commands::Nickname { serial, name } => handle_nickname(serial, name),
    }
}

async fn handle_devices(bridge: Arc<AdbTransport>, format: OutputFormat) -> Result<()> {
    let devices = bridge.list_devices().await?;
    let nicknames = NicknameStore::new()?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = devices
                .iter()
                .map(|d| {
                    json!({
                        "serial": d.serial,
                        "model": d.model,
                        "state": d.state,
                        "nickname": nicknames.get(&d.serial),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Simple => {
            for d in &devices {
                let name = nicknames
                    .get(&d.serial)
                    .or(d.model.as_deref())
                    .unwrap_or("-");
                println!("{}\t{}\t{}", d.serial, d.state, name);
            }
        }
    }
    Ok(())
}

async fn handle_watch(
    bridge: Arc<AdbTransport>,
    interval: Duration,
    inspect: Option<String>,
) -> Result<()> {
    let bridge: Arc<dyn DebugBridge> = bridge;
    let tunnels = Arc::new(TunnelManager::new(Arc::clone(&bridge)));
    let sessions = Arc::new(SessionRegistry::new(
        Arc::clone(&bridge),
        Arc::clone(&tunnels),
        Arc::new(CdpConnector),
        ConnectOptions::default(),
    ));
    let mut fleet = Fleet::new(
        Arc::clone(&bridge),
        Arc::clone(&tunnels),
        Arc::clone(&sessions),
        NicknameStore::new()?,
    );

    if let Some(spec) = inspect {
        let (serial, browser) = spec
            .split_once(':')
            .context("--inspect takes SERIAL:BROWSER")?;
        let descriptor = catalog::find(browser)
            .with_context(|| format!("unknown browser '{}'", browser))?;
        fleet.select(serial, descriptor.package);
    }

    let poller = Poller::new(Arc::new(tokio::sync::Mutex::new(fleet)), interval);
    let handle = poller.handle();
    let mut snapshots = handle.snapshots();
    let loop_task = tokio::spawn(poller.run());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&snapshot)?);
            }
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown();
                break;
            }
        }
    }

    let _ = loop_task.await;
    sessions.dispose_all().await;
    tunnels.close_all().await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_open(
    bridge: Arc<AdbTransport>,
    serial: String,
    url: String,
    browser: String,
    wake: bool,
    pin: Option<String>,
    connect_timeout: Duration,
) -> Result<()> {
    let descriptor =
        catalog::find(&browser).with_context(|| format!("unknown browser '{}'", browser))?;

    let bridge: Arc<dyn DebugBridge> = bridge;
    if !catalog::is_installed(bridge.as_ref(), &serial, descriptor).await? {
        bail!("{} is not installed on {}", descriptor.label, serial);
    }

    if wake {
        screen::ensure_awake(bridge.as_ref(), &serial, pin.as_deref()).await?;
    }

    let tunnels = Arc::new(TunnelManager::new(Arc::clone(&bridge)));
    let sessions = SessionRegistry::new(
        Arc::clone(&bridge),
        Arc::clone(&tunnels),
        Arc::new(CdpConnector),
        ConnectOptions {
            connect_timeout,
            ..ConnectOptions::default()
        },
    );

    let controller = sessions.controller(&serial);
    let page = controller.get_page(descriptor, &url).await?;
    let page_url = page.url().await;
    println!(
        "{}",
        json!({
            "opened": true,
            "browser": descriptor.label,
            "requested_url": url,
            "page_url": page_url,
        })
    );

    sessions.dispose_all().await;
    tunnels.close_all().await;
    Ok(())
}

async fn handle_targets(
    bridge: Arc<AdbTransport>,
    serial: String,
    browser: String,
    format: OutputFormat,
) -> Result<()> {
    let descriptor =
        catalog::find(&browser).with_context(|| format!("unknown browser '{}'", browser))?;

    let bridge: Arc<dyn DebugBridge> = bridge;
    let tunnels = TunnelManager::new(Arc::clone(&bridge));
    let tunnel = tunnels.open(&serial, descriptor.socket, 0).await?;

    let result = list_targets(&tunnel).await;
    tunnels.close(&tunnel).await;

    let pages: Vec<_> = result?
        .into_iter()
        .filter(|t| t.target_type == "page")
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pages)?),
        OutputFormat::Simple => {
            for page in &pages {
                println!("{}\t{}\t{}", page.id, page.title, page.url);
            }
        }
    }
    Ok(())
}

fn handle_nickname(serial: String, name: Option<String>) -> Result<()> {
    let mut nicknames = NicknameStore::new()?;
    if let Some(name) = name {
        nicknames.set(&serial, &name);
    }
    println!(
        "{}",
        json!({ "serial": serial, "nickname": nicknames.get(&serial) })
    );
    Ok(())
}
