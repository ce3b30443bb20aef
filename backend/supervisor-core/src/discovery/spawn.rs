use crate::controller::ControllerClient;
use crate::discovery::process::with_process;
use crate::error::spawn::SpawnError;

use common::ErrorLocation;

use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child as TokioChild;
use tokio::process::Command as TokioCommand;
use tokio::spawn as TokioSpawn;
use sysinfo::Signal;
use tokio::time::{sleep as TokioSleep, timeout};

const WORK_DIR_FLAG: &str = "-d";
const CONFIG_FLAG: &str = "-f";
const EXTERNAL_CONTROLLER_FLAG: &str = "-ext-ctl";
const CORE_LOG_PREFIX: &str = "core_";
const CORE_LOG_SUFFIX: &str = ".log";

/// Everything needed to launch one core instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub binary: PathBuf,
    pub config_path: PathBuf,
    pub work_dir: PathBuf,
    /// `host:port` for the REST controller.
    pub external_controller: String,
}

impl SpawnOptions {
    /// Fail fast on a missing binary or profile before touching the OS.
    #[track_caller]
    pub fn validate(&self) -> Result<(), SpawnError> {
        if !self.binary.is_file() {
            return Err(SpawnError::BinaryMissing {
                message: format!("Core binary not found at {}", self.binary.display()),
                path: self.binary.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if !self.config_path.is_file() {
            return Err(SpawnError::Validation {
                message: format!("Core profile not found at {}", self.config_path.display()),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

pub(crate) fn build_spawn_command(options: &SpawnOptions) -> TokioCommand {
    let mut cmd = TokioCommand::new(&options.binary);
    cmd.arg(WORK_DIR_FLAG)
        .arg(&options.work_dir)
        .arg(CONFIG_FLAG)
        .arg(&options.config_path)
        .arg(EXTERNAL_CONTROLLER_FLAG)
        .arg(&options.external_controller)
        .current_dir(&options.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn the core binary. The child is killed when its handle is dropped.
pub fn spawn_core(options: &SpawnOptions) -> Result<TokioChild, SpawnError> {
    options.validate()?;

    create_dir_all(&options.work_dir).map_err(|e| SpawnError::Spawn {
        message: format!(
            "Failed to create work dir {}: {e}",
            options.work_dir.display()
        ),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    })?;

    debug!(
        "Spawning {} with profile {}",
        options.binary.display(),
        options.config_path.display()
    );

    let child = build_spawn_command(options)
        .spawn()
        .map_err(|e| SpawnError::Spawn {
            message: format!("Failed to spawn {}: {e}", options.binary.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

    info!("Spawned core (PID: {:?})", child.id());
    Ok(child)
}

/// Pump the child's stdout and stderr line by line into `on_line`.
pub fn forward_output<F>(child: &mut TokioChild, on_line: F)
where
    F: Fn(OutputStream, String) + Clone + Send + Sync + 'static,
{
    if let Some(stdout) = child.stdout.take() {
        pump_lines(stdout, OutputStream::Stdout, on_line.clone());
    }

    if let Some(stderr) = child.stderr.take() {
        pump_lines(stderr, OutputStream::Stderr, on_line);
    }
}

fn pump_lines<R, F>(reader: R, stream: OutputStream, on_line: F)
where
    R: AsyncRead + Unpin + Send + 'static,
    F: Fn(OutputStream, String) + Send + Sync + 'static,
{
    TokioSpawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            on_line(stream, line);
        }
        trace!("Core {} closed", stream.as_str());
    });
}

/// Poll `GET /version` until it answers or `window` elapses.
///
/// When `child` is given, an early exit of the process ends the wait with
/// [`SpawnError::Exited`] instead of burning the whole window.
pub async fn wait_for_api(
    client: &ControllerClient,
    window: Duration,
    interval: Duration,
    mut child: Option<&mut TokioChild>,
) -> Result<String, SpawnError> {
    let mut backoff = ExponentialBackoff {
        initial_interval: interval,
        max_interval: interval,
        multiplier: 1.0,
        randomization_factor: 0.0,
        max_elapsed_time: Some(window),
        ..Default::default()
    };

    debug!("Waiting up to {window:?} for controller at {}", client.base_url());

    loop {
        if let Ok(version) = client.version().await {
            info!("Core controller ready at {} ({version})", client.base_url());
            return Ok(version);
        }

        if let Some(child) = child.as_deref_mut()
            && let Ok(Some(status)) = child.try_wait()
        {
            return Err(SpawnError::Exited {
                message: format!("Core exited during startup with {status}"),
                code: status.code(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Controller not ready, retrying after {duration:?}");
                TokioSleep(duration).await;
            }
            None => {
                return Err(SpawnError::Timeout {
                    message: format!(
                        "Controller at {} did not answer within {window:?}",
                        client.base_url()
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
}

/// Stop a spawned core: SIGTERM, wait up to `grace`, then kill.
///
/// Returns `true` when the forced kill was needed.
pub async fn terminate_child(child: &mut TokioChild, grace: Duration) -> bool {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("Core already exited with {status}");
        return false;
    }

    let signalled = child
        .id()
        .and_then(|pid| with_process(pid, |p| p.kill_with(Signal::Term)))
        .flatten()
        .unwrap_or(false);

    if signalled {
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Core exited with {status}");
                return false;
            }
            Ok(Err(e)) => warn!("Failed to wait for core: {e}"),
            Err(_) => warn!("Core ignored SIGTERM for {grace:?}, killing"),
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill core: {e}");
    }
    true
}

/// `core_YYYYMMDD.log` for the UTC day containing `at`.
pub fn core_log_file_name(at: SystemTime) -> String {
    let stamp = humantime::format_rfc3339_seconds(at).to_string();
    let date: String = stamp.chars().take(10).filter(|c| *c != '-').collect();
    format!("{CORE_LOG_PREFIX}{date}{CORE_LOG_SUFFIX}")
}

/// Appends core output to a daily log file, rolling over at UTC midnight.
pub struct CoreLogFile {
    dir: PathBuf,
    current: Mutex<Option<(String, File)>>,
}

impl CoreLogFile {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn append(&self, stream: OutputStream, line: &str) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        let now = SystemTime::now();
        let name = core_log_file_name(now);

        if current.as_ref().is_none_or(|(open, _)| *open != name) {
            match self.open(&name) {
                Ok(file) => *current = Some((name, file)),
                Err(e) => {
                    warn!("Failed to open core log {name}: {e}");
                    return;
                }
            }
        }

        if let Some((_, file)) = current.as_mut() {
            let stamp = humantime::format_rfc3339_millis(now);
            if let Err(e) = writeln!(file, "{stamp} [{}] {line}", stream.as_str()) {
                warn!("Failed to write core log: {e}");
            }
        }
    }

    fn open(&self, name: &str) -> std::io::Result<File> {
        create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))
    }
}
