//! Silent containers and the per-operator silent toggle.
//!
//! Closing a view normally does two things: notify the owner that the
//! container was accessed and closed, then release the viewer through the
//! session manager. A silent view skips only the notification. Release,
//! bookkeeping and the final flush/close happen exactly as for a normal view.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::debug;

use super::adapter::{CloseCoupling, InventoryAdapter};
use super::errors::InvError;
use super::session::{ContainerSessionManager, ReleaseOutcome, SessionHandle};
use super::types::ParticipantId;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    Normal,
    Silent,
}

/// An operator's open container together with how it will be closed.
#[derive(Debug, Clone)]
pub struct ContainerView {
    handle: SessionHandle,
    mode: CloseMode,
}

impl ContainerView {
    pub fn normal(handle: SessionHandle) -> Self {
        Self {
            handle,
            mode: CloseMode::Normal,
        }
    }

    /// Wrap for a silent close. Refused when the adapter cannot separate the
    /// close notification from viewer bookkeeping.
    pub fn silent(handle: SessionHandle, adapter: &dyn InventoryAdapter) -> Result<Self, InvError> {
        if adapter.close_coupling() == CloseCoupling::Coupled {
            return Err(InvError::SilentUnsupported(adapter.version().to_string()));
        }
        Ok(Self {
            handle,
            mode: CloseMode::Silent,
        })
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn mode(&self) -> CloseMode {
        self.mode
    }

    pub fn is_silent(&self) -> bool {
        self.mode == CloseMode::Silent
    }

    /// Close this view. The caller runs any returned teardown.
    pub fn close(self, manager: &mut ContainerSessionManager) -> Result<ReleaseOutcome, InvError> {
        close_view(
            manager,
            self.handle.operator(),
            &self.handle.target().id,
            self.mode,
        )
    }
}

/// Close path shared by [`ContainerView::close`] and the service, which
/// tracks modes by `(operator, target)`.
pub fn close_view(
    manager: &mut ContainerSessionManager,
    operator: &ParticipantId,
    target: &ParticipantId,
    mode: CloseMode,
) -> Result<ReleaseOutcome, InvError> {
    let Some(session) = manager.session(target) else {
        return Err(InvError::NotViewing {
            operator: operator.to_string(),
            target: target.to_string(),
        });
    };
    if !session.has_viewer(operator) {
        return Err(InvError::NotViewing {
            operator: operator.to_string(),
            target: target.to_string(),
        });
    }

    match mode {
        CloseMode::Normal => {
            manager
                .adapter()
                .notify_closed(session.snapshot(), operator)?;
            metrics::inc_notified_closes();
        }
        CloseMode::Silent => {
            debug!("Suppressing close notification for {} on {}", operator, target);
            metrics::inc_silent_closes();
        }
    }
    manager.release(operator, target)
}

/// Per-operator silent flags. Process lifetime; persisted only through
/// [`SilentToggles::export`].
#[derive(Debug, Default)]
pub struct SilentToggles {
    flags: RwLock<HashMap<ParticipantId, bool>>,
}

impl SilentToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(flags: HashMap<ParticipantId, bool>) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    pub fn is_enabled(&self, operator: &ParticipantId) -> bool {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operator)
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&self, operator: ParticipantId, enabled: bool) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operator, enabled);
    }

    /// Flip the flag and return the new state.
    pub fn toggle(&self, operator: ParticipantId) -> bool {
        let mut flags = self.flags.write().unwrap_or_else(PoisonError::into_inner);
        let entry = flags.entry(operator).or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn export(&self) -> HashMap<ParticipantId, bool> {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_toggle_restores_state() {
        let toggles = SilentToggles::new();
        let op = ParticipantId::new_random();
        assert!(!toggles.is_enabled(&op));
        assert!(toggles.toggle(op));
        assert!(!toggles.toggle(op));
        assert!(!toggles.is_enabled(&op));

        toggles.set(op, true);
        toggles.toggle(op);
        toggles.toggle(op);
        assert!(toggles.is_enabled(&op));
    }

    #[test]
    fn toggles_are_per_operator() {
        let toggles = SilentToggles::new();
        let x = ParticipantId::new_random();
        let y = ParticipantId::new_random();
        toggles.toggle(x);
        assert!(toggles.is_enabled(&x));
        assert!(!toggles.is_enabled(&y));
        assert_eq!(toggles.export().len(), 1);
    }
}
