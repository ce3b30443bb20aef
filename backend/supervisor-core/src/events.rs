//! Lifecycle notifications.
//!
//! Events are notifications only. Consumers re-query status for the truth.

use models::CoreEvent;

/// Implemented by the desktop shell, which forwards events to the UI.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CoreEvent);
}
