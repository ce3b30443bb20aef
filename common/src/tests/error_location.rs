use crate::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies that `Display` renders the bracketed `[file:line:column]` form.
///
/// **WHY THIS MATTERS**: Every error in the workspace appends its location through this
/// `Display` impl. Log scrapers and the UI notification text both rely on the bracketed form.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The brackets or separators change
/// - Line or column are dropped from the output
#[test]
#[track_caller]
fn given_error_location_when_formatted_then_produces_bracketed_triple() {
    // GIVEN: A location captured here
    let location = ErrorLocation::from(Location::caller());

    // WHEN: Formatting it
    let formatted = location.to_string();

    // THEN: It is "[file:line:column]"
    assert!(formatted.starts_with('[') && formatted.ends_with(']'));
    assert!(formatted.contains("error_location.rs"));
    assert!(formatted.contains(&format!(":{}:{}]", location.line, location.column)));
}

/// **VALUE**: Verifies that `file_name()` strips directories on both separator styles.
///
/// **WHY THIS MATTERS**: The daemon and the desktop app are built on Windows too, where
/// `file!()` paths use backslashes. Compact log lines should read the same everywhere.
///
/// **BUG THIS CATCHES**: Would catch a split on '/' only, which leaves full Windows paths.
#[test]
fn given_nested_paths_when_file_name_called_then_returns_last_component() {
    // GIVEN: Locations with POSIX and Windows style paths
    let posix = ErrorLocation {
        file: "backend/supervisor-core/src/ipc/frame.rs",
        line: 1,
        column: 1,
    };
    let windows = ErrorLocation {
        file: r"backend\supervisor-core\src\ipc\client.rs",
        line: 1,
        column: 1,
    };

    // WHEN / THEN: Only the file name remains
    assert_eq!(posix.file_name(), "frame.rs");
    assert_eq!(windows.file_name(), "client.rs");
}

/// **VALUE**: Verifies that `#[track_caller]` helpers report their caller's line.
///
/// **WHY THIS MATTERS**: Error constructors in every crate are `#[track_caller]` helpers.
/// If propagation broke, all errors would point at the helper instead of the failing call.
///
/// **BUG THIS CATCHES**: Would catch removal of `#[track_caller]` from a capture helper.
#[test]
fn given_two_call_sites_when_capturing_through_helper_then_lines_differ() {
    // GIVEN: A tracked helper
    #[track_caller]
    fn capture() -> ErrorLocation {
        ErrorLocation::from(Location::caller())
    }

    // WHEN: Calling it from two consecutive lines
    let first = capture();
    let second = capture();

    // THEN: Same file, consecutive lines
    assert_eq!(first.file, second.file);
    assert_eq!(first.line + 1, second.line);
}
