use crate::{CoreEvent, CoreMode, RoutingMode};

use serde_json::json;

/// **VALUE**: Every event maps to the exact name the UI subscribes to.
///
/// **BUG THIS CATCHES**: A renamed event that the frontend silently stops receiving.
#[test]
fn given_each_event_when_named_then_matches_wire_name() {
    // GIVEN
    let cases = [
        (
            CoreEvent::CoreStarted {
                pid: Some(1),
                mode: CoreMode::User,
            },
            "core-started",
        ),
        (CoreEvent::CoreStopped { crashed: false }, "core-stopped"),
        (CoreEvent::TunModeChanged { enabled: true }, "tun-mode-changed"),
        (
            CoreEvent::SystemProxyChanged {
                enabled: true,
                port: 7890,
            },
            "system-proxy-changed",
        ),
        (
            CoreEvent::ProxyModeChanged {
                mode: RoutingMode::Global,
            },
            "proxy-mode-changed",
        ),
        (
            CoreEvent::CoreModeChanged {
                mode: CoreMode::Service,
            },
            "core-mode-changed",
        ),
    ];

    // WHEN / THEN
    for (event, name) in cases {
        assert_eq!(event.name(), name);
    }
}

/// **VALUE**: Payloads serialize as flat objects without an enum tag.
///
/// **WHY THIS MATTERS**: The event name already identifies the variant; listeners read fields
/// directly off the payload.
#[test]
fn given_event_when_serialized_then_payload_is_flat() {
    // GIVEN
    let event = CoreEvent::SystemProxyChanged {
        enabled: false,
        port: 7890,
    };

    // WHEN
    let value = serde_json::to_value(&event).unwrap();

    // THEN
    assert_eq!(value, json!({"enabled": false, "port": 7890}));
}
