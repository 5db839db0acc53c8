//! # Host Collaborators
//!
//! The simulation host owns participants, their live inventories, their
//! persisted data and the chat channel. This module defines the seams the
//! inventory core uses to reach those things.
//!
//! - [`Permissions`] - capability checks for operators
//! - [`ParticipantDirectory`] - name / id lookups
//! - [`Messenger`] - fire-and-forget operator messages
//! - [`LiveWorld`] - native inventory objects of online participants
//! - [`PlayerDataStore`] - persisted player data, in the host's byte layout
//! - [`ContainerEvents`] - owner-facing open/close notifications
//!
//! [`sled_store::SledPlayerData`] backs the data store with sled, and
//! [`memory`] provides in-process implementations of every seam.

pub mod memory;
pub mod sled_store;

use std::any::Any;
use std::sync::Arc;

use crate::inventory::errors::InvError;
use crate::inventory::types::{ParticipantId, ParticipantRef};

/// Opaque native object owned by the running host. Adapters downcast it.
pub type HostHandle = Arc<dyn Any + Send + Sync>;

pub trait Permissions: Send + Sync {
    fn has_capability(&self, operator: &ParticipantId, capability: &str) -> bool;
}

pub trait ParticipantDirectory: Send + Sync {
    /// Resolve by display name (case-insensitive) or by id string.
    fn resolve_participant(&self, name_or_id: &str) -> Option<ParticipantRef>;
}

pub trait Messenger: Send + Sync {
    fn send_message(&self, operator: &ParticipantId, text: &str);
}

pub trait LiveWorld: Send + Sync {
    /// The simulation's own inventory object for an online participant.
    fn live_inventory(&self, id: &ParticipantId) -> Option<HostHandle>;
}

pub trait PlayerDataStore: Send + Sync {
    /// `Ok(None)` when the participant has never been saved.
    fn load(&self, id: &ParticipantId) -> Result<Option<Vec<u8>>, InvError>;

    fn store(&self, id: &ParticipantId, bytes: &[u8]) -> Result<(), InvError>;
}

pub trait ContainerEvents: Send + Sync {
    fn viewer_opened(&self, owner: &ParticipantId, viewer: &ParticipantId);

    /// "This container was accessed and is now closed."
    fn viewer_closed(&self, owner: &ParticipantId, viewer: &ParticipantId);
}

/// Host objects an adapter binds to when it is constructed.
#[derive(Clone)]
pub struct HostBindings {
    pub world: Arc<dyn LiveWorld>,
    pub data: Arc<dyn PlayerDataStore>,
    pub events: Arc<dyn ContainerEvents>,
}

/// Front-end collaborators used by the inventory service.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn Permissions>,
    pub directory: Arc<dyn ParticipantDirectory>,
    pub messenger: Arc<dyn Messenger>,
}
