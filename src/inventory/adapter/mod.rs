//! Per-host-version inventory access.
//!
//! The host's native inventory objects and its persisted player data change
//! shape between releases. Each supported release gets one module here that
//! implements [`InventoryAdapter`] over that release's layout. Consumers only
//! ever see the trait; [`registry::VersionAdapterRegistry`] picks the
//! implementation once at startup.

pub mod registry;
pub mod v1_8;
pub mod v1_9;

use super::errors::InvError;
use super::snapshot::InventorySnapshot;
use super::types::{HostVersion, InventoryLayout, ParticipantId, ParticipantRef};

/// Whether a release can unregister a viewer without telling the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCoupling {
    /// `notify_closed` and `detach_viewer` are independent calls.
    Separable,
    /// The host only offers one call that does both; `detach_viewer` notifies.
    Coupled,
}

pub trait InventoryAdapter: Send + Sync {
    fn version(&self) -> &HostVersion;

    fn layout(&self) -> InventoryLayout;

    fn close_coupling(&self) -> CloseCoupling;

    /// True when the host currently holds a live inventory for `target`.
    fn is_live(&self, target: &ParticipantRef) -> bool;

    /// Bind to the live inventory (online) or load persisted data (offline).
    ///
    /// Offline failures: [`InvError::DataUnavailable`] when nothing is stored,
    /// [`InvError::CorruptData`] when anything stored cannot be read in full.
    fn open(&self, target: &ParticipantRef) -> Result<InventorySnapshot, InvError>;

    /// A stored record for a participant with an empty inventory, in this
    /// release's persisted layout.
    fn empty_record(&self) -> Result<Vec<u8>, InvError>;

    /// Persist offline contents. No-op for live snapshots. Idempotent.
    fn flush(&self, snapshot: &InventorySnapshot) -> Result<(), InvError>;

    /// Release adapter resources. Second call is a no-op.
    fn close(&self, snapshot: &InventorySnapshot) -> Result<(), InvError>;

    /// Register a viewer with the native inventory. Emits the open notification.
    fn attach_viewer(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError>;

    /// Unregister a viewer. Notifies the owner only on [`CloseCoupling::Coupled`] hosts.
    fn detach_viewer(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError>;

    /// Emit the owner-facing close notification without touching bookkeeping.
    /// No-op on coupled hosts, where `detach_viewer` already notifies.
    fn notify_closed(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError>;
}
