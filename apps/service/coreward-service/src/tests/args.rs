// Argument parsing for the daemon

use crate::args::ServiceArgs;

use supervisor_core::DEFAULT_IPC_ENDPOINT;

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;

fn parse(values: &[&str]) -> Result<ServiceArgs, clap::Error> {
    ServiceArgs::try_parse_from(std::iter::once("coreward-service").chain(values.iter().copied()))
}

#[test]
fn given_no_arguments_when_parsed_then_defaults_used() {
    let parsed = parse(&[]).unwrap();

    assert_eq!(parsed.endpoint, DEFAULT_IPC_ENDPOINT);
    assert_eq!(parsed.socket_group, None);
    assert!(!parsed.state_dir.as_os_str().is_empty());
}

/// **VALUE**: The group id the installer passes reaches the socket setup.
///
/// **WHY THIS MATTERS**: Without it the socket is root-only and the app falls
/// back to "daemon unreachable" right after a successful install.
///
/// **BUG THIS CATCHES**: The flag being ignored or parsed as the wrong field.
#[test]
fn given_socket_group_when_parsed_then_group_set() {
    let parsed = parse(&["--socket-group", "20"]).unwrap();

    assert_eq!(parsed.socket_group, Some(20));
}

#[test]
fn given_socket_group_without_value_when_parsed_then_rejected() {
    let err = parse(&["--socket-group"]).unwrap_err();

    assert_eq!(err.kind(), ClapErrorKind::InvalidValue);
}

#[test]
fn given_non_numeric_group_when_parsed_then_value_validation_error() {
    let err = parse(&["--socket-group", "staff"]).unwrap_err();

    assert_eq!(err.kind(), ClapErrorKind::ValueValidation);
    assert!(err.to_string().contains("staff"));
}

#[test]
fn given_unknown_flag_when_parsed_then_unknown_argument() {
    let err = parse(&["--verbose"]).unwrap_err();

    assert_eq!(err.kind(), ClapErrorKind::UnknownArgument);
}

/// **VALUE**: Development builds can relocate the socket and state directory
/// from the command line as well as from the environment.
///
/// **BUG THIS CATCHES**: A flag parsed into the wrong field, which would point
/// the daemon at the production socket during tests.
#[test]
fn given_endpoint_and_state_dir_flags_when_parsed_then_applied() {
    // GIVEN
    let flags = [
        "--endpoint",
        "/tmp/coreward-dev.sock",
        "--state-dir",
        "/tmp/coreward-state",
    ];

    // WHEN
    let parsed = parse(&flags).unwrap();

    // THEN
    assert_eq!(parsed.endpoint, "/tmp/coreward-dev.sock");
    assert_eq!(parsed.state_dir, PathBuf::from("/tmp/coreward-state"));
}

#[cfg(unix)]
#[test]
fn given_unix_when_log_dir_then_var_log() {
    let parsed = parse(&[]).unwrap();

    assert_eq!(parsed.log_dir(), PathBuf::from("/var/log"));
}
