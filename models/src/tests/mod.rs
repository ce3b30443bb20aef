mod core_mode;
mod core_state;
mod core_status;
mod event;
mod ipc;
