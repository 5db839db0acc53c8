//! Shared inventory view handed out to container sessions.
//!
//! An [`InventorySnapshot`] is a cheap, clonable handle. Every clone refers to
//! the same backing slots, so a write through one viewer's handle is visible
//! to all other viewers (and, for online targets, to the running simulation)
//! on the next read.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::errors::InvError;
use super::types::{InventoryKind, InventoryLayout, ItemStack, ParticipantId, ParticipantRef};

/// Version-specific slot storage behind a snapshot.
///
/// Implementations use interior mutability because a snapshot is shared by
/// every viewer of the same inventory.
pub trait SlotStore: Send + Sync {
    fn get(&self, kind: InventoryKind, index: usize) -> Option<ItemStack>;

    /// Replace a slot, returning what was there.
    fn set(&self, kind: InventoryKind, index: usize, item: Option<ItemStack>) -> Option<ItemStack>;

    /// Adapter access to its own concrete store.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Bound to the simulation's own inventory object.
    Live,
    /// Materialized from persisted data; flushed back on close.
    Offline,
}

struct SnapshotInner {
    owner: ParticipantRef,
    origin: SnapshotOrigin,
    layout: InventoryLayout,
    store: Box<dyn SlotStore>,
    writer: Mutex<Option<ParticipantId>>,
    dirty: AtomicBool,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct InventorySnapshot {
    inner: Arc<SnapshotInner>,
}

impl InventorySnapshot {
    pub fn new(
        owner: ParticipantRef,
        origin: SnapshotOrigin,
        layout: InventoryLayout,
        store: Box<dyn SlotStore>,
    ) -> Self {
        Self {
            inner: Arc::new(SnapshotInner {
                owner,
                origin,
                layout,
                store,
                writer: Mutex::new(None),
                dirty: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn owner(&self) -> &ParticipantRef {
        &self.inner.owner
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.inner.origin
    }

    pub fn is_live(&self) -> bool {
        self.inner.origin == SnapshotOrigin::Live
    }

    pub fn layout(&self) -> InventoryLayout {
        self.inner.layout
    }

    pub fn slot_count(&self) -> usize {
        self.inner.layout.slot_count()
    }

    pub fn store(&self) -> &dyn SlotStore {
        self.inner.store.as_ref()
    }

    /// True when both handles refer to the same underlying inventory.
    pub fn same_as(&self, other: &InventorySnapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn locate(&self, slot: usize) -> Result<(InventoryKind, usize), InvError> {
        self.inner
            .layout
            .locate(slot)
            .ok_or(InvError::SlotOutOfRange {
                slot,
                len: self.slot_count(),
            })
    }

    pub fn get(&self, slot: usize) -> Result<Option<ItemStack>, InvError> {
        let (kind, index) = self.locate(slot)?;
        Ok(self.inner.store.get(kind, index))
    }

    /// All slots in flat order.
    pub fn contents(&self) -> Vec<Option<ItemStack>> {
        self.inner
            .layout
            .sections()
            .iter()
            .flat_map(|(kind, len)| (0..*len).map(move |index| (*kind, index)))
            .map(|(kind, index)| self.inner.store.get(kind, index))
            .collect()
    }

    /// Write a slot on behalf of `viewer`. Only the current writer may write.
    pub fn set_slot_as(
        &self,
        viewer: &ParticipantId,
        slot: usize,
        item: Option<ItemStack>,
    ) -> Result<Option<ItemStack>, InvError> {
        if self.is_closed() {
            return Err(InvError::ConcurrentModificationConflict(format!(
                "write to closed inventory of {}",
                self.inner.owner
            )));
        }
        if self.writer().as_ref() != Some(viewer) {
            return Err(InvError::ReadOnlyView(viewer.to_string()));
        }
        let (kind, index) = self.locate(slot)?;
        // An empty stack is an empty slot.
        let item = item.filter(|stack| stack.amount > 0);
        let previous = self.inner.store.set(kind, index, item);
        self.inner.dirty.store(true, Ordering::Release);
        Ok(previous)
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<ParticipantId>> {
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn writer(&self) -> Option<ParticipantId> {
        *self.lock_writer()
    }

    pub(crate) fn set_writer(&self, writer: Option<ParticipantId>) {
        *self.lock_writer() = writer;
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn clear_dirty(&self) {
        self.inner.dirty.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Mark closed. Returns false if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.inner.closed.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for InventorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventorySnapshot")
            .field("owner", &self.inner.owner)
            .field("origin", &self.inner.origin)
            .field("slots", &self.slot_count())
            .field("writer", &self.writer())
            .field("closed", &self.is_closed())
            .finish()
    }
}
