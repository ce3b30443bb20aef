//! Core process discovery and spawning.
//!
//! This module provides functionality for:
//! - Finding whatever process is bound to the core's control port
//! - Stopping a process by PID with graceful-then-forced termination
//! - Spawning the core binary and waiting for its controller to answer

pub mod process;
pub mod spawn;

pub use process::{
    ensure_port_available, find_listener, is_core_process, is_port_in_use, is_process_alive,
    stop_pid,
};
pub use spawn::{
    CoreLogFile, OutputStream, SpawnOptions, forward_output, spawn_core, terminate_child,
    wait_for_api,
};
