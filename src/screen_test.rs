#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::testutil::FakeBridge;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_lock_screen_heuristics() {
        assert!(is_locked("... mDreamingLockscreen=true ..."));
        assert!(is_locked("... isStatusBarKeyguard=true ..."));
        assert!(!is_locked("mDreamingLockscreen=false isStatusBarKeyguard=false"));
        assert!(!is_locked(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_awake_skips_wake_when_already_awake() {
        let bridge = FakeBridge::new();
        bridge.respond("dumpsys power", "mWakefulness=Awake\n");
        bridge.respond("dumpsys window", "mDreamingLockscreen=false\n");

        ensure_awake(&bridge, "SERIALX", None).await.unwrap();

        assert_eq!(bridge.shell_count("input keyevent 224"), 0);
        assert_eq!(bridge.shell_count("input swipe"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_awake_wakes_and_dismisses_lock_screen() {
        let bridge = FakeBridge::new();
        bridge.respond("dumpsys power", "mWakefulness=Asleep\n");
        bridge.respond("dumpsys window", "mDreamingLockscreen=true\n");

        ensure_awake(&bridge, "SERIALX", None).await.unwrap();

        assert_eq!(bridge.shell_count("input keyevent 224"), 1);
        assert_eq!(bridge.shell_count("input swipe"), 1);
        assert_eq!(bridge.shell_count("input text"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_awake_enters_pin_when_given() {
        let bridge = FakeBridge::new();
        bridge.respond("dumpsys power", "mWakefulness=Asleep\n");
        bridge.respond("dumpsys window", "isStatusBarKeyguard=true\n");

        ensure_awake(&bridge, "SERIALX", Some("1234")).await.unwrap();

        assert_eq!(bridge.shell_count("input text 1234"), 1);
        assert_eq!(bridge.shell_count("input keyevent 66"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_restores_saved_brightness() {
        let bridge = std::sync::Arc::new(FakeBridge::new());
        bridge.respond("settings get system screen_brightness_mode", "1\n");
        bridge.respond("settings get system screen_brightness", "96\n");

        identify(bridge.clone(), "SERIALX", Duration::from_millis(50)).await;

        assert_eq!(
            bridge.shell_count("settings put system screen_brightness_mode 0"),
            1
        );
        assert_eq!(bridge.shell_count("settings put system screen_brightness 255"), 1);
        // Restore puts the saved values back, level first then mode
        assert_eq!(bridge.shell_count("settings put system screen_brightness 96"), 1);
        assert_eq!(
            bridge.shell_count("settings put system screen_brightness_mode 1"),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_swallows_brightness_command_failures() {
        let bridge = std::sync::Arc::new(FakeBridge::new());
        bridge.respond("settings get system screen_brightness_mode", "1\n");
        bridge.respond("settings get system screen_brightness", "96\n");
        bridge.fail_shell("settings put");

        // Every put fails, yet the flash runs to completion and still
        // attempts the restore.
        identify(bridge.clone(), "SERIALX", Duration::from_millis(50)).await;

        assert_eq!(bridge.shell_count("settings put system screen_brightness 255"), 1);
        assert_eq!(bridge.shell_count("settings put system screen_brightness 96"), 1);
        assert_eq!(
            bridge.shell_count("settings put system screen_brightness_mode 1"),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_skips_restore_when_reads_fail() {
        let bridge = std::sync::Arc::new(FakeBridge::new());
        bridge.fail_shell("settings get");

        identify(bridge.clone(), "SERIALX", Duration::from_millis(50)).await;

        // No saved values, so the flash still runs but nothing is restored
        assert_eq!(
            bridge.shell_count("settings put system screen_brightness_mode 0"),
            1
        );
        assert_eq!(bridge.shell_count("settings put system screen_brightness 255"), 1);
        assert_eq!(bridge.shell_count("settings put system screen_brightness_mode 1"), 0);
        assert_eq!(bridge.shell_count("settings put system screen_brightness 96"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_restore_survives_caller_cancellation() {
        let bridge = std::sync::Arc::new(FakeBridge::new());
        bridge.respond("settings get system screen_brightness_mode", "1\n");
        bridge.respond("settings get system screen_brightness", "96\n");

        let task = tokio::spawn(identify(
            bridge.clone(),
            "SERIALX",
            Duration::from_secs(60),
        ));
        // Let the flash start, then cancel the caller mid-sleep
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.abort();
        let _ = task.await;

        assert_eq!(bridge.shell_count("settings put system screen_brightness 255"), 1);

        // The detached task finishes the flash and restores regardless
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(bridge.shell_count("settings put system screen_brightness 96"), 1);
    }
}
