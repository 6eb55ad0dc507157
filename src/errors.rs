use std::future::Future;
use thiserror::Error;
use tracing::warn;

/// Failures from the adb transport (device enumeration, shell execution,
/// forward registration).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The adb executable could not be located
    #[error("adb executable '{0}' not found in PATH")]
    AdbNotFound(String),
    /// Spawning the adb process failed
    #[error("failed to run adb while {action}")]
    Spawn {
        action: String,
        #[source]
        source: std::io::Error,
    },
    /// adb ran but reported a failure
    #[error("adb failed while {action}: {stderr}")]
    Command { action: String, stderr: String },
}

/// Failures while opening a local-port-to-device-socket tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Probing for a free ephemeral port failed
    #[error("could not allocate a free local port")]
    PortProbe(#[source] std::io::Error),
    /// Registering the forward with the transport failed
    #[error("failed to register forward while {action}")]
    Forward {
        action: String,
        #[source]
        source: TransportError,
    },
}

/// Failures during session lifecycle transitions (launch, tunnel, connect)
#[derive(Debug, Error)]
pub enum SessionError {
    /// The controller was disposed; no further sessions can be opened
    #[error("session controller for device {0} is closed")]
    Closed(String),
    #[error("transport failure while {action}")]
    Transport {
        action: String,
        #[source]
        source: TransportError,
    },
    #[error("tunnel failure while {action}")]
    Tunnel {
        action: String,
        #[source]
        source: TunnelError,
    },
    /// A failure from the DevTools automation client
    #[error("automation failure while {action}")]
    Automation {
        action: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SessionError {
    pub fn transport(action: impl Into<String>, source: TransportError) -> Self {
        SessionError::Transport {
            action: action.into(),
            source,
        }
    }

    pub fn tunnel(action: impl Into<String>, source: TunnelError) -> Self {
        SessionError::Tunnel {
            action: action.into(),
            source,
        }
    }

    pub fn automation(
        action: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SessionError::Automation {
            action: action.into(),
            source: Box::new(source),
        }
    }
}

// Exit codes for the CLI, one per error class
impl TransportError {
    pub fn exit_code(&self) -> i32 {
        4
    }
}

impl TunnelError {
    pub fn exit_code(&self) -> i32 {
        5
    }
}

impl SessionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Transport { source, .. } => source.exit_code(),
            SessionError::Tunnel { source, .. } => source.exit_code(),
            _ => 6,
        }
    }
}

/// Map any error chain to a CLI exit code (generic failures exit 1)
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<SessionError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TunnelError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<TransportError>() {
        e.exit_code()
    } else {
        1
    }
}

/// Run a fallible future whose failure must not unwind the caller.
///
/// Used on cleanup paths, enrichment fetches, page-list refreshes and other
/// places where a dead device is an expected condition. The failure is logged
/// and converted to `None`.
pub async fn best_effort<T, E>(action: &str, fut: impl Future<Output = Result<T, E>>) -> Option<T>
where
    E: std::fmt::Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed (ignored): {}", action, e);
            None
        }
    }
}
