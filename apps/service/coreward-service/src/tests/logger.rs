use crate::logger::{LOG_FILE_NAME, initialize};

use log::info;

/// **VALUE**: The daemon log file is created, including missing parents.
///
/// **BUG THIS CATCHES**: A fresh install where the log directory does not yet
/// exist failing to start the daemon at all.
#[test]
fn given_missing_log_dir_when_initialize_then_file_created() {
    // GIVEN
    let temp_dir = tempfile::tempdir().unwrap();
    let log_dir = temp_dir.path().join("logs");

    // WHEN
    let result = initialize(&log_dir);
    info!("daemon logger test line");

    // THEN
    assert!(result.is_ok());
    assert!(log_dir.join(LOG_FILE_NAME).exists());
}
