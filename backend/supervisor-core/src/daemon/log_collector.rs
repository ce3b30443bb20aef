use crate::discovery::OutputStream;

use models::ipc::IpcLogEntry;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use regex::Regex;

pub const DEFAULT_CAPACITY: usize = 1000;
const LEVEL_PATTERN: &str = r"(?i)(?:level=(?P<kv>[a-z]+)|\[(?P<bracket>trace|debug|info|warn|warning|error|fatal)\])";

static LEVEL_REGEX: OnceLock<Regex> = OnceLock::new();

fn level_regex() -> &'static Regex {
    LEVEL_REGEX.get_or_init(|| Regex::new(LEVEL_PATTERN).expect("valid regex pattern"))
}

/// Level of a core log line: `level=info` or `[INFO]` style. Lines without
/// a marker take the stream default (stderr → error).
pub fn parse_level(line: &str, stream: OutputStream) -> String {
    let found = level_regex().captures(line).and_then(|cap| {
        cap.name("kv")
            .or_else(|| cap.name("bracket"))
            .map(|m| m.as_str().to_lowercase())
    });

    match found.as_deref() {
        Some("warn") | Some("warning") => "warning".to_string(),
        Some(level) => level.to_string(),
        None => match stream {
            OutputStream::Stdout => "info".to_string(),
            OutputStream::Stderr => "error".to_string(),
        },
    }
}

/// Bounded in-memory ring of the core's recent output.
#[derive(Clone)]
pub struct LogCollector {
    entries: Arc<Mutex<VecDeque<IpcLogEntry>>>,
    capacity: usize,
}

impl LogCollector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, stream: OutputStream, line: &str) {
        let entry = IpcLogEntry {
            timestamp: humantime::format_rfc3339_millis(SystemTime::now()).to_string(),
            level: parse_level(line, stream),
            message: line.to_string(),
        };

        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The newest `limit` entries, oldest first. `None` returns everything.
    pub fn recent(&self, limit: Option<usize>) -> Vec<IpcLogEntry> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |limit| entries.len().saturating_sub(limit));
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for LogCollector {
    fn default() -> Self {
        Self::new()
    }
}
