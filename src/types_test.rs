#[cfg(test)]
mod tests {
    use super::super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_state_parse() {
        assert_eq!(DeviceState::parse("device"), DeviceState::Online);
        assert_eq!(DeviceState::parse("offline"), DeviceState::Offline);
        assert_eq!(DeviceState::parse("unauthorized"), DeviceState::Unauthorized);
        assert_eq!(DeviceState::parse("bootloader"), DeviceState::Bootloader);
        assert_eq!(DeviceState::parse("recovery"), DeviceState::Unknown);
        assert_eq!(DeviceState::parse(""), DeviceState::Unknown);
    }

    #[test]
    fn test_device_state_display() {
        assert_eq!(DeviceState::Online.to_string(), "online");
        assert_eq!(DeviceState::Unauthorized.to_string(), "unauthorized");
    }

    #[test]
    fn test_target_info_deserializes_devtools_payload() {
        let payload = r#"[
            {
                "id": "T1",
                "title": "Example",
                "url": "https://example.com/",
                "type": "page",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/T1"
            },
            {
                "id": "SW1",
                "type": "service_worker"
            }
        ]"#;

        let targets: Vec<TargetInfo> = serde_json::from_str(payload).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "T1");
        assert_eq!(targets[0].target_type, "page");
        assert_eq!(targets[0].title, "Example");
        assert_eq!(targets[1].target_type, "service_worker");
        assert_eq!(targets[1].title, "");
    }

    #[test]
    fn test_snapshot_serializes_without_empty_options() {
        let snapshot = FleetSnapshot {
            devices: vec![DeviceSnapshot {
                serial: "SERIALX".to_string(),
                model: None,
                state: DeviceState::Online,
                nickname: None,
                manufacturer: None,
                os_release: None,
                sdk_level: None,
                browsers: vec![],
            }],
            error: None,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"serial\":\"SERIALX\""));
        assert!(!json.contains("model"));
        assert!(!json.contains("error"));
    }
}
