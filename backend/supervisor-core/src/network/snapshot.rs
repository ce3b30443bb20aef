use crate::error::network::NetworkError;
use crate::network::DnsState;

use common::ErrorLocation;

use std::fs;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FILE_NAME: &str = "dns_backup.json";

/// Pre-override DNS servers. `Empty` is the sentinel for "none configured",
/// which restores to DHCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "servers")]
pub enum DnsSnapshot {
    Empty,
    Servers(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkOverrideSnapshot {
    /// Network service (macOS) or interface (Windows/Linux) the DNS belongs to.
    pub scope: String,
    pub dns: DnsSnapshot,
    pub captured_at: String,
}

impl NetworkOverrideSnapshot {
    pub fn capture(state: &DnsState) -> Self {
        let dns = if state.servers.is_empty() {
            DnsSnapshot::Empty
        } else {
            DnsSnapshot::Servers(state.servers.clone())
        };

        Self {
            scope: state.scope.clone(),
            dns,
            captured_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        }
    }
}

/// The snapshot file. Its presence means a restoration is owed.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(SNAPSHOT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_owed(&self) -> bool {
        self.path.exists()
    }

    #[track_caller]
    fn snapshot_error(&self, message: String) -> NetworkError {
        NetworkError::Snapshot {
            message,
            path: self.path.clone(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    pub fn load(&self) -> Result<Option<NetworkOverrideSnapshot>, NetworkError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| self.snapshot_error(format!("read failed: {e}")))?;

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| self.snapshot_error(format!("corrupt snapshot: {e}")))
    }

    /// Write the snapshot atomically. An owed snapshot is never overwritten,
    /// since it holds the only record of the user's original settings.
    pub fn save(&self, snapshot: &NetworkOverrideSnapshot) -> Result<(), NetworkError> {
        if self.is_owed() {
            return Err(self.snapshot_error("a snapshot is already owed".to_string()));
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.snapshot_error(format!("create dir failed: {e}")))?;
        }

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| self.snapshot_error(format!("serialize failed: {e}")))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .map_err(|e| self.snapshot_error(format!("write failed: {e}")))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| self.snapshot_error(format!("rename failed: {e}")))?;

        debug!("DNS snapshot written to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), NetworkError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("DNS snapshot {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.snapshot_error(format!("remove failed: {e}"))),
        }
    }
}
