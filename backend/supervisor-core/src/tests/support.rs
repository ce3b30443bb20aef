// Test doubles shared by the unit tests.

use crate::command::{CommandOutput, CommandRunner};
use crate::config::{AppConfig, ConfigStore};
use crate::error::CoreError;
use crate::error::ipc::IpcError;
use crate::error::network::NetworkError;
use crate::error::privilege::PrivilegeError;
use crate::events::EventSink;
use crate::ipc::{IpcClient, IpcClientConfig};
use crate::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus};
use crate::privilege::PrivilegedHelper;
use crate::supervisor::{
    Backends, CoreBackend, CoreProbe, RetryPolicy, StartOptions, Supervisor,
};

use common::ErrorLocation;
use models::{CoreEvent, CoreMode, PrivilegeState};

use std::io::Result as IoResult;
use std::panic::Location;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

pub const TEST_PROFILE: &str = "mixed-port: 7890\nexternal-controller: 127.0.0.1:1\n";

// ============================================
// COMMAND RUNNER
// ============================================

/// Records every command and answers from a script keyed by command-line prefix.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
}

impl RecordingRunner {
    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.respond_with(
            prefix,
            CommandOutput {
                status: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    pub fn respond_with(&self, prefix: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
    }

    /// Command lines in the order they ran.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> IoResult<CommandOutput> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        let responses = self.responses.lock().unwrap();
        Ok(responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                status: Some(0),
                ..Default::default()
            }))
    }
}

// ============================================
// NETWORK
// ============================================

/// In-memory OS network state.
pub struct FakeNetwork {
    pub proxy: Mutex<ProxyStatus>,
    pub dns: Mutex<DnsState>,
    pub log: Mutex<Vec<String>>,
    pub fail_set_dns: Mutex<bool>,
}

impl FakeNetwork {
    pub fn with_dns(scope: &str, servers: &[&str]) -> Self {
        Self {
            proxy: Mutex::new(ProxyStatus::default()),
            dns: Mutex::new(DnsState {
                scope: scope.to_string(),
                servers: servers.iter().map(|s| s.to_string()).collect(),
            }),
            log: Mutex::new(Vec::new()),
            fail_set_dns: Mutex::new(false),
        }
    }

    pub fn servers(&self) -> Vec<String> {
        self.dns.lock().unwrap().servers.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::with_dns("Wi-Fi", &[])
    }
}

#[async_trait]
impl NetworkConfigurator for FakeNetwork {
    async fn set_system_proxy(
        &self,
        settings: &ProxySettings,
        enabled: bool,
    ) -> Result<(), NetworkError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("proxy {enabled} {}:{}", settings.host, settings.port));
        *self.proxy.lock().unwrap() = ProxyStatus {
            enabled,
            host: Some(settings.host.clone()),
            port: Some(settings.port),
        };
        Ok(())
    }

    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError> {
        Ok(self.proxy.lock().unwrap().clone())
    }

    async fn current_dns(&self) -> Result<DnsState, NetworkError> {
        Ok(self.dns.lock().unwrap().clone())
    }

    async fn set_dns(&self, scope: &str, servers: &[String]) -> Result<(), NetworkError> {
        if *self.fail_set_dns.lock().unwrap() {
            return Err(NetworkError::Parse {
                message: "set_dns refused".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("set_dns {scope} {}", servers.join(",")));
        self.dns.lock().unwrap().servers = servers.to_vec();
        Ok(())
    }

    async fn reset_dns(&self, scope: &str) -> Result<(), NetworkError> {
        self.log.lock().unwrap().push(format!("reset_dns {scope}"));
        self.dns.lock().unwrap().servers.clear();
        Ok(())
    }
}

// ============================================
// BACKEND
// ============================================

#[derive(Debug, Default)]
pub struct FakeCore {
    pub running: bool,
    pub pid: Option<u32>,
    pub tun: bool,
    pub starts: u32,
    pub stops: u32,
    /// A core is already serving the control port before we start one.
    pub orphan: bool,
    /// Resolvers passed with the last TUN toggle.
    pub tun_dns: Vec<String>,
}

/// Backend that only flips flags.
pub struct FakeBackend {
    mode: CoreMode,
    pub core: Mutex<FakeCore>,
    pub fail_next_start: Mutex<Option<CoreError>>,
    pub fail_next_stop: Mutex<Option<CoreError>>,
    /// Status queries fail as if the backend could not be reached.
    pub probe_unreachable: Mutex<bool>,
}

impl FakeBackend {
    pub fn new(mode: CoreMode) -> Self {
        Self {
            mode,
            core: Mutex::new(FakeCore::default()),
            fail_next_start: Mutex::new(None),
            fail_next_stop: Mutex::new(None),
            probe_unreachable: Mutex::new(false),
        }
    }

    /// The next stop fails and leaves the core running.
    pub fn fail_next_stop(&self, error: impl Into<CoreError>) {
        *self.fail_next_stop.lock().unwrap() = Some(error.into());
    }

    pub fn fail_next_start(&self, error: impl Into<CoreError>) {
        *self.fail_next_start.lock().unwrap() = Some(error.into());
    }

    /// The process dies behind the supervisor's back.
    pub fn kill(&self) {
        let mut core = self.core.lock().unwrap();
        core.running = false;
        core.pid = None;
    }

    pub fn starts(&self) -> u32 {
        self.core.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.core.lock().unwrap().stops
    }

    pub fn is_running(&self) -> bool {
        self.core.lock().unwrap().running
    }

    pub fn tun(&self) -> bool {
        self.core.lock().unwrap().tun
    }

    fn snapshot(core: &FakeCore) -> CoreProbe {
        CoreProbe {
            running: core.running,
            pid: core.pid,
            version: core.running.then(|| "v1.19.0".to_string()),
            uptime: core.running.then(|| Duration::from_secs(1)),
            message: None,
            tun_enabled: core.tun,
        }
    }
}

#[async_trait]
impl CoreBackend for FakeBackend {
    fn mode(&self) -> CoreMode {
        self.mode
    }

    async fn start(&self, _options: &StartOptions) -> Result<CoreProbe, CoreError> {
        if let Some(e) = self.fail_next_start.lock().unwrap().take() {
            return Err(e);
        }

        let mut core = self.core.lock().unwrap();
        core.starts += 1;
        core.running = true;
        core.pid = Some(4000 + core.starts);
        Ok(Self::snapshot(&core))
    }

    async fn stop(&self) -> Result<(), CoreError> {
        if let Some(e) = self.fail_next_stop.lock().unwrap().take() {
            return Err(e);
        }

        let mut core = self.core.lock().unwrap();
        core.stops += 1;
        core.running = false;
        core.pid = None;
        core.tun = false;
        Ok(())
    }

    async fn probe(&self) -> Result<CoreProbe, CoreError> {
        if *self.probe_unreachable.lock().unwrap() {
            return Err(IpcError::Unreachable {
                message: "status query refused".to_string(),
                attempts: 1,
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }
        Ok(Self::snapshot(&self.core.lock().unwrap()))
    }

    async fn adopt(&self, _options: &StartOptions) -> Result<Option<CoreProbe>, CoreError> {
        let mut core = self.core.lock().unwrap();
        if !core.orphan {
            return Ok(None);
        }
        core.running = true;
        core.pid = Some(777);
        Ok(Some(Self::snapshot(&core)))
    }

    async fn set_tun(&self, enabled: bool, dns_servers: &[String]) -> Result<(), CoreError> {
        let mut core = self.core.lock().unwrap();
        core.tun = enabled;
        core.tun_dns = dns_servers.to_vec();
        Ok(())
    }
}

// ============================================
// HELPER
// ============================================

#[derive(Default)]
pub struct FakeHelper {
    pub state: Mutex<PrivilegeState>,
    pub installs: Mutex<u32>,
    pub uninstalls: Mutex<u32>,
    pub cancel_install: Mutex<bool>,
}

impl FakeHelper {
    pub fn installed() -> Self {
        let helper = Self::default();
        *helper.state.lock().unwrap() = PrivilegeState {
            helper_installed: true,
            helper_valid: true,
        };
        helper
    }

    pub fn installs(&self) -> u32 {
        *self.installs.lock().unwrap()
    }

    pub fn uninstalls(&self) -> u32 {
        *self.uninstalls.lock().unwrap()
    }
}

#[async_trait]
impl PrivilegedHelper for FakeHelper {
    async fn state(&self) -> Result<PrivilegeState, PrivilegeError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn install(&self) -> Result<(), PrivilegeError> {
        if *self.cancel_install.lock().unwrap() {
            return Err(PrivilegeError::Cancelled {
                message: "user said no".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        *self.installs.lock().unwrap() += 1;
        *self.state.lock().unwrap() = PrivilegeState {
            helper_installed: true,
            helper_valid: true,
        };
        Ok(())
    }

    async fn uninstall(&self) -> Result<(), PrivilegeError> {
        *self.uninstalls.lock().unwrap() += 1;
        *self.state.lock().unwrap() = PrivilegeState::not_installed();
        Ok(())
    }
}

// ============================================
// EVENTS
// ============================================

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CoreEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<CoreEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(CoreEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CoreEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================
// SUPERVISOR HARNESS
// ============================================

/// A supervisor wired to fakes, with its config and profile in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub config: ConfigStore,
    pub supervisor: Arc<Supervisor>,
    pub user: Arc<FakeBackend>,
    pub service: Arc<FakeBackend>,
    pub network: Arc<FakeNetwork>,
    pub events: Arc<RecordingSink>,
    pub ipc: IpcClient,
}

/// Client pointed at an endpoint nobody listens on.
pub fn dead_ipc_client(dir: &Path) -> IpcClient {
    IpcClient::new(IpcClientConfig {
        endpoint: dir.join("nobody.sock").to_string_lossy().into_owned(),
        timeout: Duration::from_millis(200),
        max_attempts: 1,
        retry_delay: Duration::from_millis(10),
    })
}

pub fn test_config(dir: &Path, preferred: CoreMode) -> AppConfig {
    let profile = dir.join("config.yaml");
    std::fs::write(&profile, TEST_PROFILE).unwrap();

    let mut config = AppConfig::default();
    config.core.config_path = profile;
    config.core.work_dir = dir.to_path_buf();
    config.mode.preferred = preferred;
    config.service.handshake_timeout_ms = 300;
    config.health.status_timeout_ms = 500;
    config
}

pub async fn harness(preferred: CoreMode) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigStore::new(dir.path().to_path_buf(), test_config(dir.path(), preferred));

    let user = Arc::new(FakeBackend::new(CoreMode::User));
    let service = Arc::new(FakeBackend::new(CoreMode::Service));
    let network = Arc::new(FakeNetwork::default());
    let events = Arc::new(RecordingSink::default());
    let ipc = dead_ipc_client(dir.path());

    let backends = Backends {
        user: user.clone(),
        service: service.clone(),
    };

    let supervisor = Supervisor::new(
        config.clone(),
        backends,
        network.clone(),
        events.clone(),
        ipc.clone(),
    )
    .await
    .with_controller_retry(RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
    });

    Harness {
        dir,
        config,
        supervisor: Arc::new(supervisor),
        user,
        service,
        network,
        events,
        ipc,
    }
}
