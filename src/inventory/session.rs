//! # Container Session Management
//!
//! Tracks which operators have which participant's inventory open.
//!
//! Per target the state machine is
//!
//! ```text
//! NoSession ── acquire ──▶ Open { primary, mirrors } ── last release ──▶ NoSession
//!                              │   ▲
//!                              └───┘ acquire (join as mirror) / release (detach, promote)
//! ```
//!
//! The first operator to open a target becomes the primary viewer and the only
//! one allowed to write. Later operators join as mirrors of the same
//! [`InventorySnapshot`]. When the primary leaves, the oldest remaining mirror
//! is promoted. When the last viewer leaves, the session is removed and a
//! [`Teardown`] is handed back; running it flushes and closes the snapshot.
//! Exactly one `Teardown` exists per open period and running it consumes it,
//! so the backing inventory is flushed and closed exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use super::adapter::InventoryAdapter;
use super::errors::InvError;
use super::snapshot::InventorySnapshot;
use super::types::{ItemStack, ParticipantId, ParticipantRef};
use crate::metrics;

/// One open period of one target's inventory.
#[derive(Debug)]
pub struct ContainerSession {
    id: u64,
    target: ParticipantRef,
    snapshot: InventorySnapshot,
    /// Attach order. `viewers[0]` is the primary.
    viewers: Vec<ParticipantId>,
    opened_at: DateTime<Utc>,
}

impl ContainerSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &ParticipantRef {
        &self.target
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    pub fn primary(&self) -> Option<&ParticipantId> {
        self.viewers.first()
    }

    pub fn mirrors(&self) -> &[ParticipantId] {
        self.viewers.get(1..).unwrap_or(&[])
    }

    pub fn viewers(&self) -> &[ParticipantId] {
        &self.viewers
    }

    pub fn has_viewer(&self, viewer: &ParticipantId) -> bool {
        self.viewers.contains(viewer)
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    fn handle_for(&self, operator: ParticipantId) -> SessionHandle {
        SessionHandle {
            session_id: self.id,
            operator,
            target: self.target.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}

/// An operator's view of an open session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: u64,
    operator: ParticipantId,
    target: ParticipantRef,
    snapshot: InventorySnapshot,
}

impl SessionHandle {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn operator(&self) -> &ParticipantId {
        &self.operator
    }

    pub fn target(&self) -> &ParticipantRef {
        &self.target
    }

    pub fn snapshot(&self) -> &InventorySnapshot {
        &self.snapshot
    }

    /// Primary status can change on promotion, so this is read live.
    pub fn is_primary(&self) -> bool {
        self.snapshot.writer() == Some(self.operator)
    }

    pub fn get(&self, slot: usize) -> Result<Option<ItemStack>, InvError> {
        self.snapshot.get(slot)
    }

    pub fn set(&self, slot: usize, item: Option<ItemStack>) -> Result<Option<ItemStack>, InvError> {
        self.snapshot.set_slot_as(&self.operator, slot, item)
    }

    pub fn contents(&self) -> Vec<Option<ItemStack>> {
        self.snapshot.contents()
    }
}

/// Final flush + close for a session whose last viewer left.
///
/// Dropping an unrun `Teardown` runs it, so unflushed offline writes are
/// never discarded.
#[must_use = "a teardown must be run to flush and close the inventory"]
pub struct Teardown {
    adapter: Arc<dyn InventoryAdapter>,
    snapshot: Option<InventorySnapshot>,
    session_id: u64,
}

impl Teardown {
    pub fn snapshot(&self) -> Option<&InventorySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Flush, then close. Close runs even when the flush fails.
    pub fn run(mut self) -> Result<(), InvError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), InvError> {
        let Some(snapshot) = self.snapshot.take() else {
            return Ok(());
        };
        let flushed = self.adapter.flush(&snapshot);
        match &flushed {
            Ok(()) => metrics::inc_flushes(),
            Err(e) => {
                metrics::inc_flush_failures();
                error!(
                    "Failed to flush inventory of {} (session {}): {}",
                    snapshot.owner(),
                    self.session_id,
                    e
                );
            }
        }
        let closed = self.adapter.close(&snapshot);
        metrics::inc_sessions_closed();
        info!(
            "Closed inventory session {} for {}",
            self.session_id,
            snapshot.owner()
        );
        flushed.and(closed)
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            warn!(
                "Teardown for session {} dropped without running; flushing now",
                self.session_id
            );
            let _ = self.finish();
        }
    }
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    /// A mirror left; nothing else changed.
    Detached,
    /// The primary left and the oldest mirror took over.
    Promoted { primary: ParticipantId },
    /// The last viewer left. The session is gone; run the teardown.
    Closed(Teardown),
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("session_id", &self.session_id)
            .field("pending", &self.snapshot.is_some())
            .finish()
    }
}

/// Owns the target → session map. Every method runs on the host's update
/// context; the async front end serializes calls per target.
pub struct ContainerSessionManager {
    adapter: Arc<dyn InventoryAdapter>,
    sessions: HashMap<ParticipantId, ContainerSession>,
    next_session_id: u64,
}

impl ContainerSessionManager {
    pub fn new(adapter: Arc<dyn InventoryAdapter>) -> Self {
        Self {
            adapter,
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn InventoryAdapter> {
        &self.adapter
    }

    pub fn session(&self, target: &ParticipantId) -> Option<&ContainerSession> {
        self.sessions.get(target)
    }

    pub fn is_open(&self, target: &ParticipantId) -> bool {
        self.sessions.contains_key(target)
    }

    pub fn open_targets(&self) -> Vec<ParticipantId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open `target` for `operator`, or join the existing session as a mirror.
    ///
    /// On failure the target stays in `NoSession`.
    pub fn acquire(
        &mut self,
        operator: &ParticipantId,
        target: &ParticipantRef,
    ) -> Result<SessionHandle, InvError> {
        if let Some(handle) = self.join_existing(operator, &target.id)? {
            return Ok(handle);
        }
        let snapshot = self.adapter.open(target).map_err(|e| {
            metrics::inc_open_failures();
            warn!("Open of {} for {} failed: {}", target, operator, e);
            e
        })?;
        self.install(operator, snapshot)
    }

    /// Join an open session. `Ok(None)` when the target has no session.
    /// Re-acquiring by a current viewer returns its existing view.
    pub fn join_existing(
        &mut self,
        operator: &ParticipantId,
        target: &ParticipantId,
    ) -> Result<Option<SessionHandle>, InvError> {
        let Some(session) = self.sessions.get_mut(target) else {
            return Ok(None);
        };
        if session.has_viewer(operator) {
            return Ok(Some(session.handle_for(*operator)));
        }
        self.adapter.attach_viewer(&session.snapshot, operator)?;
        session.viewers.push(*operator);
        metrics::inc_mirrors_attached();
        debug!(
            "{} joined session {} on {} as mirror ({} viewers)",
            operator,
            session.id,
            session.target,
            session.viewers.len()
        );
        Ok(Some(session.handle_for(*operator)))
    }

    /// Register a freshly opened snapshot with `operator` as primary.
    ///
    /// Used directly when the snapshot was loaded off the update context.
    pub fn install(
        &mut self,
        operator: &ParticipantId,
        snapshot: InventorySnapshot,
    ) -> Result<SessionHandle, InvError> {
        let target = snapshot.owner().clone();
        if self.sessions.contains_key(&target.id) {
            let _ = self.adapter.close(&snapshot);
            return Err(InvError::ConcurrentModificationConflict(format!(
                "a session for {} is already open",
                target
            )));
        }
        if let Err(e) = self.adapter.attach_viewer(&snapshot, operator) {
            let _ = self.adapter.close(&snapshot);
            return Err(e);
        }
        snapshot.set_writer(Some(*operator));

        let id = self.next_session_id;
        self.next_session_id += 1;
        let session = ContainerSession {
            id,
            target: target.clone(),
            snapshot,
            viewers: vec![*operator],
            opened_at: Utc::now(),
        };
        let handle = session.handle_for(*operator);
        self.sessions.insert(target.id, session);
        metrics::inc_sessions_opened();
        info!(
            "Opened inventory session {} on {} for {} ({})",
            id,
            target,
            operator,
            if handle.snapshot.is_live() { "live" } else { "offline" }
        );
        Ok(handle)
    }

    /// Remove `operator` from the target's viewers.
    pub fn release(
        &mut self,
        operator: &ParticipantId,
        target: &ParticipantId,
    ) -> Result<ReleaseOutcome, InvError> {
        let not_viewing = || InvError::NotViewing {
            operator: operator.to_string(),
            target: target.to_string(),
        };
        let session = self.sessions.get_mut(target).ok_or_else(not_viewing)?;
        let position = session
            .viewers
            .iter()
            .position(|v| v == operator)
            .ok_or_else(not_viewing)?;

        if let Err(e) = self.adapter.detach_viewer(&session.snapshot, operator) {
            warn!(
                "Detaching {} from {} failed: {} (continuing release)",
                operator, session.target, e
            );
        }
        session.viewers.remove(position);

        if session.viewers.is_empty() {
            let Some(session) = self.sessions.remove(target) else {
                return Err(InvError::Internal(format!("session for {} vanished", target)));
            };
            session.snapshot.set_writer(None);
            debug!("Last viewer left session {} on {}", session.id, session.target);
            return Ok(ReleaseOutcome::Closed(Teardown {
                adapter: self.adapter.clone(),
                snapshot: Some(session.snapshot),
                session_id: session.id,
            }));
        }

        if position == 0 {
            let primary = session.viewers[0];
            session.snapshot.set_writer(Some(primary));
            metrics::inc_promotions();
            debug!(
                "Promoted {} to primary of session {} on {}",
                primary, session.id, session.target
            );
            return Ok(ReleaseOutcome::Promoted { primary });
        }
        Ok(ReleaseOutcome::Detached)
    }

    /// Drop every session without per-viewer bookkeeping. Used at shutdown
    /// after views have been closed; returns teardowns for anything left.
    pub fn drain(&mut self) -> Vec<Teardown> {
        self.sessions
            .drain()
            .map(|(_, session)| {
                session.snapshot.set_writer(None);
                Teardown {
                    adapter: self.adapter.clone(),
                    snapshot: Some(session.snapshot),
                    session_id: session.id,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::{MemoryPlayerData, MemoryWorld, RecordingEvents};
    use crate::host::HostBindings;
    use crate::inventory::adapter::v1_9;
    use crate::inventory::types::HostVersion;

    fn manager_with_online(target: &ParticipantRef) -> ContainerSessionManager {
        let world = Arc::new(MemoryWorld::new());
        world.insert(target.id, v1_9::PlayerInventory::new().into_live());
        let adapter = Arc::new(v1_9::Accessor::new(
            HostVersion::new("v1_9_R1"),
            HostBindings {
                world,
                data: Arc::new(MemoryPlayerData::new()),
                events: Arc::new(RecordingEvents::new()),
            },
        ));
        ContainerSessionManager::new(adapter)
    }

    #[test]
    fn reacquire_by_same_operator_does_not_duplicate() {
        let target = ParticipantRef::online(ParticipantId::new_random(), "Steve");
        let mut mgr = manager_with_online(&target);
        let op = ParticipantId::new_random();
        let first = mgr.acquire(&op, &target).expect("open");
        let second = mgr.acquire(&op, &target).expect("reopen");
        assert_eq!(first.session_id(), second.session_id());
        assert_eq!(mgr.session(&target.id).unwrap().viewers().len(), 1);
    }

    #[test]
    fn release_by_stranger_is_not_viewing() {
        let target = ParticipantRef::online(ParticipantId::new_random(), "Steve");
        let mut mgr = manager_with_online(&target);
        let op = ParticipantId::new_random();
        let _ = mgr.acquire(&op, &target).expect("open");
        let err = mgr
            .release(&ParticipantId::new_random(), &target.id)
            .unwrap_err();
        assert!(matches!(err, InvError::NotViewing { .. }));
        assert!(mgr.is_open(&target.id));
    }

    #[test]
    fn install_over_open_session_is_a_conflict() {
        let target = ParticipantRef::online(ParticipantId::new_random(), "Steve");
        let mut mgr = manager_with_online(&target);
        let op = ParticipantId::new_random();
        let _ = mgr.acquire(&op, &target).expect("open");
        let stray = mgr.adapter().open(&target).expect("second snapshot");
        let err = mgr.install(&ParticipantId::new_random(), stray).unwrap_err();
        assert!(matches!(err, InvError::ConcurrentModificationConflict(_)));
        assert_eq!(mgr.session(&target.id).unwrap().viewers(), &[op]);
    }

    #[test]
    fn drained_teardowns_close_snapshots() {
        let target = ParticipantRef::online(ParticipantId::new_random(), "Steve");
        let mut mgr = manager_with_online(&target);
        let handle = mgr.acquire(&ParticipantId::new_random(), &target).unwrap();
        let teardowns = mgr.drain();
        assert_eq!(teardowns.len(), 1);
        for t in teardowns {
            t.run().expect("teardown");
        }
        assert!(handle.snapshot().is_closed());
        assert!(mgr.is_empty());
    }
}
