use crate::CORE_BINARY;
use crate::error::discovery::DiscoveryError;

use common::ErrorLocation;
use models::OrphanCandidate;

use std::panic::Location;
use std::path::Path;
use std::process;
use std::thread::sleep;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, trace, warn};
use netstat2::{
    AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, TcpState, get_sockets_info,
};
use sysinfo::{Pid, Process, ProcessesToUpdate, Signal, System};

const KILL_VERIFY_MAX_ELAPSED: Duration = Duration::from_secs(5);
const FORCED_KILL_SETTLE: Duration = Duration::from_millis(200);

#[track_caller]
fn query_tcp_sockets() -> Result<Vec<SocketInfo>, DiscoveryError> {
    get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    )
    .map_err(|e| DiscoveryError::NetworkQuery {
        message: format!("Failed to query network sockets: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })
}

fn listening_on(socket: &SocketInfo, port: u16) -> bool {
    matches!(
        &socket.protocol_socket_info,
        ProtocolSocketInfo::Tcp(tcp) if tcp.state == TcpState::Listen && tcp.local_port == port
    )
}

/// Whether anything is listening on `port`, including sockets whose owner
/// we are not allowed to see.
#[track_caller]
pub fn is_port_in_use(port: u16) -> Result<bool, DiscoveryError> {
    Ok(query_tcp_sockets()?
        .iter()
        .any(|socket| listening_on(socket, port)))
}

/// Find the process listening on `port`, ignoring our own PID.
///
/// Returns `None` when nothing listens there or when the owning PID is not
/// visible to this user (a root-owned core seen from the desktop app).
#[track_caller]
pub fn find_listener(port: u16) -> Result<Option<OrphanCandidate>, DiscoveryError> {
    let own_pid = process::id();

    for socket in query_tcp_sockets()? {
        if !listening_on(&socket, port) {
            continue;
        }

        if let Some(&pid) = socket.associated_pids.iter().find(|&&pid| pid != own_pid) {
            trace!("Found process {pid} listening on port {port}");
            return Ok(Some(OrphanCandidate::new(port, pid)));
        }
    }

    debug!("No visible process listening on port {port}");
    Ok(None)
}

#[track_caller]
pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);

    sys.process(Pid::from_u32(pid)).map(f)
}

pub(crate) fn format_command(process: &Process) -> String {
    process
        .cmd()
        .iter()
        .map(|s| s.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_process_alive(pid: u32) -> bool {
    with_process(pid, |_| true).unwrap_or(false)
}

/// Whether `pid` looks like a core binary, judged by process name or argv[0].
pub fn is_core_process(pid: u32) -> bool {
    let core_stem = Path::new(CORE_BINARY)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    with_process(pid, |p| {
        let name = p.name().to_string_lossy().to_lowercase();
        let command = format_command(p).to_lowercase();
        trace!("PID {pid}: name={name} command={command}");
        name.contains(&core_stem) || command.contains(&core_stem)
    })
    .unwrap_or(false)
}

/// Stop a process by PID.
///
/// Sends SIGTERM first and falls back to a forced kill, then verifies with
/// backoff for up to 5 seconds. Refuses PID 0, PID 1 and our own PID.
///
/// # Returns
///
/// * `true` - the process is gone (or was never there)
/// * `false` - the process is still alive or could not be signalled
pub fn stop_pid(pid: u32) -> bool {
    if pid <= 1 || pid == process::id() {
        warn!("Refusing to stop protected PID {pid}");
        return false;
    }

    let signalled = with_process(pid, |p| {
        if let Some(sent) = p.kill_with(Signal::Term) {
            debug!("Sent SIGTERM to PID {pid}: success={sent}");
            sent
        } else {
            let killed = p.kill();
            debug!("Sent SIGKILL to PID {pid}: success={killed}");
            killed
        }
    });

    match signalled {
        None => {
            debug!("Process {pid} not found");
            return true;
        }
        Some(false) => return false,
        Some(true) => {}
    }

    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(KILL_VERIFY_MAX_ELAPSED),
        ..Default::default()
    };

    loop {
        if !is_process_alive(pid) {
            debug!("Process {pid} successfully terminated");
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Process {pid} still alive, retrying after {duration:?}");
                sleep(duration);
            }
            None => {
                warn!("Process {pid} survived SIGTERM, forcing kill");
                let killed = with_process(pid, |p| p.kill()).unwrap_or(true);
                sleep(FORCED_KILL_SETTLE);
                return killed && !is_process_alive(pid);
            }
        }
    }
}

/// Make sure nothing else holds `port` before a core is spawned on it.
///
/// A leftover core from an earlier run is stopped. A foreign listener, or one
/// whose owner we cannot see, is reported as [`DiscoveryError::PortInUse`].
/// Blocks while waiting for the orphan to exit.
#[track_caller]
pub fn ensure_port_available(port: u16) -> Result<(), DiscoveryError> {
    let Some(candidate) = find_listener(port)? else {
        if is_port_in_use(port)? {
            return Err(DiscoveryError::PortInUse {
                message: format!("Port {port} is held by a process we cannot inspect"),
                port,
                pid: None,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        return Ok(());
    };

    if !is_core_process(candidate.pid) {
        return Err(DiscoveryError::PortInUse {
            message: format!("Port {port} is held by a foreign process ({candidate})"),
            port,
            pid: Some(candidate.pid),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    warn!("Stopping orphaned core: {candidate}");
    if stop_pid(candidate.pid) {
        return Ok(());
    }

    Err(DiscoveryError::Orphan {
        message: format!("Orphaned core could not be stopped: {candidate}"),
        candidate,
        location: ErrorLocation::from(Location::caller()),
    })
}
