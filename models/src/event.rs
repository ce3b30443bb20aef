use crate::{CoreMode, RoutingMode};

use serde::Serialize;

pub const CORE_STARTED: &str = "core-started";
pub const CORE_STOPPED: &str = "core-stopped";
pub const TUN_MODE_CHANGED: &str = "tun-mode-changed";
pub const SYSTEM_PROXY_CHANGED: &str = "system-proxy-changed";
pub const PROXY_MODE_CHANGED: &str = "proxy-mode-changed";
pub const CORE_MODE_CHANGED: &str = "core-mode-changed";

/// Notifications pushed to the UI layer.
///
/// Events are hints. A listener that needs the authoritative state issues a
/// status query afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CoreEvent {
    CoreStarted { pid: Option<u32>, mode: CoreMode },
    CoreStopped { crashed: bool },
    TunModeChanged { enabled: bool },
    SystemProxyChanged { enabled: bool, port: u16 },
    ProxyModeChanged { mode: RoutingMode },
    CoreModeChanged { mode: CoreMode },
}

impl CoreEvent {
    /// Wire name of the event as the UI subscribes to it.
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::CoreStarted { .. } => CORE_STARTED,
            CoreEvent::CoreStopped { .. } => CORE_STOPPED,
            CoreEvent::TunModeChanged { .. } => TUN_MODE_CHANGED,
            CoreEvent::SystemProxyChanged { .. } => SYSTEM_PROXY_CHANGED,
            CoreEvent::ProxyModeChanged { .. } => PROXY_MODE_CHANGED,
            CoreEvent::CoreModeChanged { .. } => CORE_MODE_CHANGED,
        }
    }
}
