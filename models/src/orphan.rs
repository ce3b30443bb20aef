use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::{Deserialize, Serialize};

/// A process found listening on the core's control port at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCandidate {
    pub port: u16,
    pub pid: u32,
}

impl OrphanCandidate {
    pub fn new(port: u16, pid: u32) -> Self {
        Self { port, pid }
    }
}

impl Display for OrphanCandidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "PID {} on port {}", self.pid, self.port)
    }
}
