mod controller;
mod daemon;
mod discovery;
mod ipc;
mod service_backend;
