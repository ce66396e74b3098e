use serde::{Deserialize, Serialize};

use crate::payload::Payload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum ScanState {
    Idle,
    AwaitingPermission,
    PermissionDenied,
    Scanning,
    Found(Payload),
    Error(String),
}

impl Default for ScanState {
    fn default() -> Self {
        ScanState::Idle
    }
}

impl ScanState {
    pub fn is_scanning(&self) -> bool {
        matches!(self, ScanState::Scanning)
    }

    /// A camera is being requested or is in use.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::AwaitingPermission | ScanState::Scanning)
    }

    /// The attempt has ended and waits for the user.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Found(_) | ScanState::PermissionDenied | ScanState::Error(_)
        )
    }

    pub fn into_payload(self) -> Option<Payload> {
        match self {
            ScanState::Found(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &ScanState) -> bool {
        use ScanState::*;

        match (self, next) {
            // stop, cancel and reset
            (_, Idle) => true,
            (Idle | PermissionDenied | Error(_), AwaitingPermission) => true,
            (AwaitingPermission, Scanning | PermissionDenied | Error(_)) => true,
            (Scanning, Found(_)) => true,
            _ => false,
        }
    }
}
