use crate::{CoreMode, CoreState, CoreStatusBuilder, ModelError};

use std::time::Duration;

fn base() -> CoreStatusBuilder {
    CoreStatusBuilder::default()
        .with_api_host("127.0.0.1")
        .with_api_port(29090)
}

/// **VALUE**: `running` is derived from the state, never set independently.
///
/// **WHY THIS MATTERS**: The UI keys its toggle off `running`; disagreeing with `state` shows a
/// running core as stopped.
///
/// **BUG THIS CATCHES**: A builder that forgets to recompute `running`.
#[test]
fn given_running_state_when_built_then_running_flag_true() {
    // GIVEN
    let builder = base()
        .with_state(CoreState::Running)
        .with_pid(4242)
        .with_mode(CoreMode::Service);

    // WHEN
    let status = builder.build().unwrap();

    // THEN
    assert!(status.running);
    assert_eq!(status.pid, Some(4242));
    assert_eq!(status.mode, CoreMode::Service);
    assert_eq!(status.controller_address(), "127.0.0.1:29090");
}

/// **VALUE**: Uptime is dropped for any state other than Running.
///
/// **BUG THIS CATCHES**: A stopped core still reporting the uptime of its last run.
#[test]
fn given_stopped_state_with_uptime_when_built_then_uptime_cleared() {
    // GIVEN
    let builder = base()
        .with_state(CoreState::Stopped)
        .with_uptime(Some(Duration::from_secs(90)));

    // WHEN
    let status = builder.build().unwrap();

    // THEN
    assert!(!status.running);
    assert_eq!(status.uptime_seconds, None);
}

#[test]
fn given_running_state_with_uptime_when_built_then_uptime_in_seconds() {
    let status = base()
        .with_state(CoreState::Running)
        .with_pid(1000)
        .with_uptime(Some(Duration::from_millis(61_900)))
        .build()
        .unwrap();

    assert_eq!(status.uptime_seconds, Some(61));
}

/// **VALUE**: Invalid endpoints are caught at construction.
///
/// **BUG THIS CATCHES**: A status pointing the UI at port 0 or an empty host.
#[test]
fn given_missing_or_invalid_endpoint_when_built_then_validation_error() {
    // GIVEN / WHEN
    let empty_host = CoreStatusBuilder::default()
        .with_api_host("  ")
        .with_api_port(29090)
        .build();
    let zero_port = CoreStatusBuilder::default()
        .with_api_host("127.0.0.1")
        .with_api_port(0)
        .build();
    let zero_pid = base().with_pid(0).build();

    // THEN
    assert!(matches!(empty_host, Err(ModelError::Validation { .. })));
    assert!(matches!(zero_port, Err(ModelError::Validation { .. })));
    assert!(matches!(zero_pid, Err(ModelError::Validation { .. })));
}

/// **VALUE**: The API secret never appears in debug output.
///
/// **WHY THIS MATTERS**: Status snapshots are logged with `{:?}` in several places.
///
/// **BUG THIS CATCHES**: Leaking the controller secret into log files.
#[test]
fn given_status_with_secret_when_debug_formatted_then_secret_redacted() {
    // GIVEN
    let status = base()
        .with_api_secret(Some("hunter2".to_string()))
        .build()
        .unwrap();

    // WHEN
    let debug = format!("{status:?}");

    // THEN
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("[REDACTED]"));
    assert_eq!(status.api_secret.as_deref(), Some("hunter2"));
}

#[test]
fn given_blank_secret_when_built_then_secret_is_none() {
    let status = base()
        .with_api_secret(Some("   ".to_string()))
        .build()
        .unwrap();

    assert_eq!(status.api_secret, None);
}
