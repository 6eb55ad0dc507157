//! Screen and power helpers: waking a device and flashing it for
//! identification.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::{SessionError, best_effort};
use crate::transport::DebugBridge;

/// How long to let the display settle after a wake keyevent
const WAKE_SETTLE: Duration = Duration::from_millis(1000);
/// Pause between lock-screen gestures
const GESTURE_SETTLE: Duration = Duration::from_millis(500);

/// Default identification flash duration
pub const DEFAULT_FLASH: Duration = Duration::from_millis(1000);

/// Make sure the device screen is awake and unlocked.
///
/// Wakes the display if asleep, swipes away a detected lock screen, and
/// optionally types a PIN. Detection relies on substring heuristics over
/// `dumpsys` output, which vary across OS versions; treat the result as a
/// best-effort signal. Failures propagate, since a session started against a
/// sleeping device is pointless.
pub async fn ensure_awake(
    bridge: &dyn DebugBridge,
    serial: &str,
    pin: Option<&str>,
) -> Result<(), SessionError> {
    let power = bridge
        .shell(serial, "dumpsys power")
        .await
        .map_err(|e| SessionError::transport("reading power state", e))?;

    if !power.contains("mWakefulness=Awake") {
        info!("Waking {}", serial);
        bridge
            .shell(serial, "input keyevent 224")
            .await
            .map_err(|e| SessionError::transport("waking the screen", e))?;
        sleep(WAKE_SETTLE).await;
    }

    let window = bridge
        .shell(serial, "dumpsys window")
        .await
        .map_err(|e| SessionError::transport("reading window state", e))?;

    if is_locked(&window) {
        debug!("Lock screen detected on {}, dismissing", serial);
        bridge
            .shell(serial, "input swipe 540 1500 540 300")
            .await
            .map_err(|e| SessionError::transport("dismissing the lock screen", e))?;
        sleep(GESTURE_SETTLE).await;

        if let Some(pin) = pin {
            bridge
                .shell(serial, &format!("input text {}", pin))
                .await
                .map_err(|e| SessionError::transport("entering the PIN", e))?;
            bridge
                .shell(serial, "input keyevent 66")
                .await
                .map_err(|e| SessionError::transport("confirming the PIN", e))?;
            sleep(GESTURE_SETTLE).await;
        }
    }

    Ok(())
}

/// Lock-screen heuristics over `dumpsys window` output
pub(crate) fn is_locked(window_dump: &str) -> bool {
    window_dump.contains("mDreamingLockscreen=true")
        || window_dump.contains("isStatusBarKeyguard=true")
        || window_dump.contains("mShowingLockscreen=true")
}

/// Flash the device screen at maximum brightness so a user can pick it out
/// of a pile, then restore the previous brightness settings.
///
/// The whole flash is best-effort: a device that rejects a settings write
/// gets a warning, not an error. The restore runs on a spawned task,
/// cancelling the caller mid-flash must not leave the screen permanently
/// brightened.
pub async fn identify(bridge: Arc<dyn DebugBridge>, serial: &str, duration: Duration) {
    let saved_mode = best_effort(
        "reading brightness mode",
        bridge.shell(serial, "settings get system screen_brightness_mode"),
    )
    .await
    .map(|s| s.trim().to_string());
    let saved_level = best_effort(
        "reading brightness level",
        bridge.shell(serial, "settings get system screen_brightness"),
    )
    .await
    .map(|s| s.trim().to_string());

    info!("Flashing {} for {:?}", serial, duration);
    // The flash and its restore run on a spawned task so that dropping the
    // caller mid-flash still restores the saved settings.
    let task_bridge = Arc::clone(&bridge);
    let task_serial = serial.to_string();
    let flash = tokio::spawn(async move {
        best_effort(
            "forcing manual brightness",
            task_bridge.shell(&task_serial, "settings put system screen_brightness_mode 0"),
        )
        .await;
        best_effort(
            "raising brightness",
            task_bridge.shell(&task_serial, "settings put system screen_brightness 255"),
        )
        .await;
        sleep(duration).await;
        restore_brightness(task_bridge, &task_serial, saved_mode, saved_level).await;
    });

    if flash.await.is_err() {
        warn!("Flash task failed");
    }
}

/// Puts back only the settings that were successfully read before the flash
async fn restore_brightness(
    bridge: Arc<dyn DebugBridge>,
    serial: &str,
    mode: Option<String>,
    level: Option<String>,
) {
    if let Some(level) = level {
        best_effort(
            "restoring brightness level",
            bridge.shell(
                serial,
                &format!("settings put system screen_brightness {}", level),
            ),
        )
        .await;
    }
    if let Some(mode) = mode {
        best_effort(
            "restoring brightness mode",
            bridge.shell(
                serial,
                &format!("settings put system screen_brightness_mode {}", mode),
            ),
        )
        .await;
    }
}

#[cfg(test)]
#[path = "screen_test.rs"]
mod screen_test;
