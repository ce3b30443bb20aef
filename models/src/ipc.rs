//! Messages exchanged with the privileged daemon.
//!
//! Each frame on the wire is a 4-byte little-endian length followed by one
//! protobuf-encoded [`IpcRequest`] or [`IpcResponse`].

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct IpcEmpty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcStartCore {
    #[prost(string, tag = "1")]
    pub core_path: String,
    #[prost(string, tag = "2")]
    pub config_path: String,
    #[prost(string, tag = "3")]
    pub work_dir: String,
    /// `host:port` the core's controller should bind.
    #[prost(string, tag = "4")]
    pub external_controller: String,
    #[prost(string, optional, tag = "5")]
    pub secret: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcReloadConfig {
    #[prost(string, tag = "1")]
    pub config_path: String,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct IpcGetLogs {
    #[prost(uint32, optional, tag = "1")]
    pub limit: Option<u32>,
}

/// `dns_servers` are the resolvers installed while TUN is on. Empty means the
/// daemon's own default.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct IpcSetTunMode {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, repeated, tag = "2")]
    pub dns_servers: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcRequest {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(
        oneof = "ipc_request::Method",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13"
    )]
    pub method: Option<ipc_request::Method>,
}

pub mod ipc_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Method {
        #[prost(message, tag = "2")]
        Ping(super::IpcEmpty),
        #[prost(message, tag = "3")]
        GetVersion(super::IpcEmpty),
        #[prost(message, tag = "4")]
        StartCore(super::IpcStartCore),
        #[prost(message, tag = "5")]
        StopCore(super::IpcEmpty),
        #[prost(message, tag = "6")]
        RestartCore(super::IpcEmpty),
        #[prost(message, tag = "7")]
        ReloadConfig(super::IpcReloadConfig),
        #[prost(message, tag = "8")]
        GetStatus(super::IpcEmpty),
        #[prost(message, tag = "9")]
        GetLogs(super::IpcGetLogs),
        #[prost(message, tag = "10")]
        ClearLogs(super::IpcEmpty),
        #[prost(message, tag = "11")]
        IsRunning(super::IpcEmpty),
        #[prost(message, tag = "12")]
        SetTunMode(super::IpcSetTunMode),
        #[prost(message, tag = "13")]
        Shutdown(super::IpcEmpty),
    }

    impl Method {
        pub fn name(&self) -> &'static str {
            match self {
                Method::Ping(_) => "ping",
                Method::GetVersion(_) => "get_version",
                Method::StartCore(_) => "start_core",
                Method::StopCore(_) => "stop_core",
                Method::RestartCore(_) => "restart_core",
                Method::ReloadConfig(_) => "reload_config",
                Method::GetStatus(_) => "get_status",
                Method::GetLogs(_) => "get_logs",
                Method::ClearLogs(_) => "clear_logs",
                Method::IsRunning(_) => "is_running",
                Method::SetTunMode(_) => "set_tun_mode",
                Method::Shutdown(_) => "shutdown",
            }
        }

        /// Read-only queries that are safe to resend after a timeout.
        pub fn is_idempotent(&self) -> bool {
            matches!(
                self,
                Method::Ping(_)
                    | Method::GetVersion(_)
                    | Method::GetStatus(_)
                    | Method::GetLogs(_)
                    | Method::IsRunning(_)
            )
        }
    }
}

/// Failure category carried by a response. `Unspecified` means success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IpcErrorKind {
    Unspecified = 0,
    InvalidRequest = 1,
    BinaryMissing = 2,
    ConfigInvalid = 3,
    PortInUse = 4,
    ApiUnresponsive = 5,
    ProcessCrashed = 6,
    PayloadTooLarge = 7,
    Network = 8,
    Internal = 9,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
pub struct IpcCoreStatus {
    #[prost(bool, tag = "1")]
    pub running: bool,
    #[prost(uint32, optional, tag = "2")]
    pub pid: Option<u32>,
    #[prost(uint64, optional, tag = "3")]
    pub uptime_secs: Option<u64>,
    #[prost(string, optional, tag = "4")]
    pub config_path: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub last_error: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub version: Option<String>,
    #[prost(bool, tag = "7")]
    pub tun_enabled: bool,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
pub struct IpcLogEntry {
    #[prost(string, tag = "1")]
    pub timestamp: String,
    #[prost(string, tag = "2")]
    pub level: String,
    #[prost(string, tag = "3")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcLogList {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<IpcLogEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IpcResponse {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,
    #[prost(enumeration = "IpcErrorKind", tag = "2")]
    pub error_kind: i32,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(oneof = "ipc_response::Data", tags = "4, 5, 6, 7, 8")]
    pub data: Option<ipc_response::Data>,
}

pub mod ipc_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(string, tag = "4")]
        Version(String),
        #[prost(message, tag = "5")]
        Status(super::IpcCoreStatus),
        #[prost(message, tag = "6")]
        Logs(super::IpcLogList),
        #[prost(bool, tag = "7")]
        Flag(bool),
        #[prost(message, tag = "8")]
        Pong(super::IpcEmpty),
    }
}

impl IpcRequest {
    pub fn new(request_id: u64, method: ipc_request::Method) -> Self {
        Self {
            request_id,
            method: Some(method),
        }
    }
}

impl IpcResponse {
    pub fn ok(request_id: u64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            error_kind: IpcErrorKind::Unspecified as i32,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(request_id: u64, message: impl Into<String>, data: ipc_response::Data) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(request_id, message)
        }
    }

    pub fn failure(request_id: u64, kind: IpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            request_id,
            error_kind: kind as i32,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_kind == IpcErrorKind::Unspecified as i32
    }
}
