//! Tauri commands: the control surface the UI invokes.

pub mod core;
pub mod mode;
pub mod network;
