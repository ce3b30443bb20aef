use supervisor_core::events::EventSink;

use models::CoreEvent;

use log::{debug, warn};
use tauri::{AppHandle, Emitter};

/// Forwards supervisor events to every webview under their wire name.
#[derive(Clone)]
pub struct TauriEventSink {
    app: AppHandle,
}

impl TauriEventSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn emit(&self, event: CoreEvent) {
        let name = event.name();
        match self.app.emit(name, &event) {
            Ok(()) => debug!("Emitted {name}"),
            Err(e) => warn!("Failed to emit {name}: {e}"),
        }
    }
}
