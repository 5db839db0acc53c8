use thiserror::Error;

/// Errors raised by the remote inventory core.
#[derive(Debug, Error)]
pub enum InvError {
    /// No adapter is registered for the running host version. Fatal at startup.
    #[error("unsupported host version: {0}")]
    UnsupportedVersion(String),

    /// The participant has never played or has no stored inventory.
    #[error("no stored data for participant {0}")]
    DataUnavailable(String),

    /// Persisted data exists but cannot be read in full.
    #[error("corrupt data for participant {participant}: {reason}")]
    CorruptData { participant: String, reason: String },

    /// Two sessions claimed the same inventory. Indicates an adapter or caller bug.
    #[error("concurrent modification conflict: {0}")]
    ConcurrentModificationConflict(String),

    /// Participant lookup failed.
    #[error("participant not found: {0}")]
    NotFound(String),

    /// Permission check returned deny.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The operator has no open view on that target.
    #[error("{operator} is not viewing {target}")]
    NotViewing { operator: String, target: String },

    /// Mirror viewers observe but do not write.
    #[error("view is read-only for {0}")]
    ReadOnlyView(String),

    #[error("slot {slot} out of range (inventory has {len} slots)")]
    SlotOutOfRange { slot: usize, len: usize },

    /// The adapter cannot close without notifying the owner.
    #[error("silent close is not supported on host version {0}")]
    SilentUnsupported(String),

    /// A host object did not have the native shape the adapter expects.
    #[error("layout mismatch on host version {version}: {detail}")]
    LayoutMismatch { version: String, detail: String },

    /// The service is shutting down and accepts no new views.
    #[error("inventory service is shutting down")]
    ShuttingDown,

    /// Wrapper around sled's error type.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Wrapper around IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (task join errors, poisoned locks)
    #[error("internal error: {0}")]
    Internal(String),
}

impl InvError {
    pub fn corrupt(participant: impl ToString, reason: impl ToString) -> Self {
        InvError::CorruptData {
            participant: participant.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Text shown to the operator when a command fails.
    pub fn operator_message(&self) -> String {
        match self {
            InvError::NotFound(_) => "Player not found!".to_string(),
            InvError::DataUnavailable(_) => {
                "That player has no saved inventory to open.".to_string()
            }
            InvError::CorruptData { .. } => {
                "That player's saved data is unreadable; refusing to open it.".to_string()
            }
            InvError::PermissionDenied(what) => format!("You do not have permission to {}.", what),
            InvError::NotViewing { .. } => "You do not have that inventory open.".to_string(),
            InvError::ReadOnlyView(_) => {
                "Another operator is editing this inventory; your view is read-only.".to_string()
            }
            InvError::SlotOutOfRange { slot, len } => {
                format!("Slot {} does not exist (0-{}).", slot, len.saturating_sub(1))
            }
            InvError::SilentUnsupported(_) => {
                "Silent mode is unavailable on this server version.".to_string()
            }
            InvError::ShuttingDown => "The server is shutting down; try again later.".to_string(),
            InvError::UnsupportedVersion(_)
            | InvError::ConcurrentModificationConflict(_)
            | InvError::LayoutMismatch { .. }
            | InvError::Storage(_)
            | InvError::Io(_)
            | InvError::Internal(_) => "An internal error occurred. See the server log.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failures_share_one_operator_message() {
        let a = InvError::ConcurrentModificationConflict("x".into()).operator_message();
        let b = InvError::Internal("y".into()).operator_message();
        assert_eq!(a, b);
    }

    #[test]
    fn slot_range_message_lists_bounds() {
        let msg = InvError::SlotOutOfRange { slot: 50, len: 41 }.operator_message();
        assert!(msg.contains("0-40"), "got {}", msg);
    }
}
