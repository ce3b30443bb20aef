mod config;
mod daemon;
mod mode_manager;
mod privilege;
mod retry;
mod support;
