use serde::{Deserialize, Serialize};

/// On-disk state of the privileged helper.
///
/// `helper_installed` means the service descriptor exists. `helper_valid` means
/// the descriptor points at a daemon binary that exists and the service manager
/// has it loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeState {
    pub helper_installed: bool,
    pub helper_valid: bool,
}

impl PrivilegeState {
    pub fn not_installed() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.helper_installed && self.helper_valid
    }
}
