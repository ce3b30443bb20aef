//! Daemon side of service mode.
//!
//! The privileged service binary wires these together: [`CoreManager`] owns
//! the single core subprocess, [`LogCollector`] keeps its recent output, and
//! [`ServiceHandler`] maps IPC requests onto both.

pub mod core_manager;
pub mod handler;
pub mod log_collector;

pub use core_manager::{CoreManager, DaemonSettings};
pub use handler::ServiceHandler;
pub use log_collector::LogCollector;
