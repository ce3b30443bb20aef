use crate::{CoreMode, ModelError, RoutingMode};

use std::str::FromStr;

/// **VALUE**: Core mode strings coming from the UI or the persisted preference parse leniently.
///
/// **WHY THIS MATTERS**: The preference file is hand-editable; "Service" or " user " must not
/// reset the user's choice to a default.
///
/// **BUG THIS CATCHES**: A case-sensitive match that silently drops a stored preference.
#[test]
fn given_mixed_case_mode_when_parsed_then_maps_to_variant() {
    // GIVEN / WHEN
    let service = CoreMode::from_str("Service").unwrap();
    let user = CoreMode::from_str(" user ").unwrap();

    // THEN
    assert_eq!(service, CoreMode::Service);
    assert_eq!(user, CoreMode::User);
}

/// **VALUE**: Unknown modes are rejected with a parse error instead of defaulting.
///
/// **BUG THIS CATCHES**: A typo in the preference file switching the app into service mode.
#[test]
fn given_unknown_mode_when_parsed_then_returns_parse_error() {
    // GIVEN / WHEN
    let result = CoreMode::from_str("root");

    // THEN
    assert!(matches!(result, Err(ModelError::Parse { .. })));
}

/// **VALUE**: Only service mode requires the privileged helper.
#[test]
fn given_modes_when_requires_helper_checked_then_only_service_requires_it() {
    assert!(CoreMode::Service.requires_helper());
    assert!(!CoreMode::User.requires_helper());
}

/// **VALUE**: Routing modes serialize to the exact strings the core controller expects.
///
/// **WHY THIS MATTERS**: The value goes straight into `PATCH /configs {"mode": ...}`.
///
/// **BUG THIS CATCHES**: A serde rename regression sending "Rule" which the core rejects.
#[test]
fn given_routing_modes_when_serialized_then_lowercase() {
    // GIVEN
    let modes = [RoutingMode::Rule, RoutingMode::Global, RoutingMode::Direct];

    // WHEN
    let json: Vec<String> = modes
        .iter()
        .map(|m| serde_json::to_string(m).unwrap())
        .collect();

    // THEN
    assert_eq!(json, vec!["\"rule\"", "\"global\"", "\"direct\""]);
    assert_eq!(RoutingMode::default(), RoutingMode::Rule);
}

#[test]
fn given_invalid_routing_mode_when_parsed_then_returns_parse_error() {
    let result = RoutingMode::from_str("script");
    assert!(matches!(result, Err(ModelError::Parse { .. })));
}
