//! Saved-state format versioning

use serde::{Deserialize, Serialize};

/// Saved-state format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVersion {
    pub major: u8,
    pub minor: u8,
}

/// Current saved-state version
pub const CURRENT_VERSION: StateVersion = StateVersion { major: 1, minor: 0 };

impl StateVersion {
    /// Check if state written by `other` can be loaded by this version
    pub fn is_compatible_with(&self, other: &StateVersion) -> bool {
        self.major == other.major && self.minor >= other.minor
    }
}
