//! Domain models for Coreward.
//!
//! Pure data passed between the supervisor, the privileged daemon and the UI
//! layer. Nothing in here performs I/O.
//!
//! ## Architecture
//!
//! - **models** (this crate): data structures and the IPC wire messages
//! - **supervisor-core**: behaviour operating on these models
//! - **coreward** / **coreward-service**: application wiring

pub mod core_mode;
pub mod core_state;
pub mod core_status;
pub mod error;
pub mod event;
pub mod ipc;
pub mod orphan;
pub mod privilege;

#[cfg(test)]
mod tests;

pub use core_mode::{CoreMode, RoutingMode};
pub use core_state::CoreState;
pub use core_status::CoreStatus;
pub use core_status::builder::CoreStatusBuilder;
pub use error::model_error::ModelError;
pub use event::CoreEvent;
pub use orphan::OrphanCandidate;
pub use privilege::PrivilegeState;
