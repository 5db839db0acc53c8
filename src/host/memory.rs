//! In-process host collaborators, for embedding hosts and tests.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{
    ContainerEvents, HostHandle, LiveWorld, Messenger, ParticipantDirectory, Permissions,
    PlayerDataStore,
};
use crate::inventory::errors::InvError;
use crate::inventory::types::{Connectivity, ParticipantId, ParticipantRef};

/// Online participants and their native inventory objects.
#[derive(Default)]
pub struct MemoryWorld {
    online: RwLock<HashMap<ParticipantId, HostHandle>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&self, id: ParticipantId, native: Arc<T>) {
        self.online
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, native);
    }

    pub fn remove(&self, id: &ParticipantId) {
        self.online
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

impl LiveWorld for MemoryWorld {
    fn live_inventory(&self, id: &ParticipantId) -> Option<HostHandle> {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

/// Persisted player data kept in a map. Counts writes so callers can check
/// how often data was flushed.
#[derive(Default)]
pub struct MemoryPlayerData {
    records: Mutex<HashMap<ParticipantId, Vec<u8>>>,
    writes: Mutex<Vec<ParticipantId>>,
}

impl MemoryPlayerData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&self, id: ParticipantId, bytes: Vec<u8>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bytes);
    }

    pub fn raw(&self, id: &ParticipantId) -> Option<Vec<u8>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn write_count(&self, id: &ParticipantId) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| *w == id)
            .count()
    }
}

impl PlayerDataStore for MemoryPlayerData {
    fn load(&self, id: &ParticipantId) -> Result<Option<Vec<u8>>, InvError> {
        Ok(self.raw(id))
    }

    fn store(&self, id: &ParticipantId, bytes: &[u8]) -> Result<(), InvError> {
        self.put_raw(*id, bytes.to_vec());
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEvent {
    Opened {
        owner: ParticipantId,
        viewer: ParticipantId,
    },
    Closed {
        owner: ParticipantId,
        viewer: ParticipantId,
    },
}

/// Records every notification in order.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ContainerEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ContainerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn closed_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ContainerEvent::Closed { .. }))
            .count()
    }

    pub fn opened_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ContainerEvent::Opened { .. }))
            .count()
    }

    fn push(&self, event: ContainerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ContainerEvents for RecordingEvents {
    fn viewer_opened(&self, owner: &ParticipantId, viewer: &ParticipantId) {
        self.push(ContainerEvent::Opened {
            owner: *owner,
            viewer: *viewer,
        });
    }

    fn viewer_closed(&self, owner: &ParticipantId, viewer: &ParticipantId) {
        self.push(ContainerEvent::Closed {
            owner: *owner,
            viewer: *viewer,
        });
    }
}

/// Fixed capability grants.
#[derive(Default)]
pub struct StaticPermissions {
    grants: RwLock<HashMap<ParticipantId, HashSet<String>>>,
    allow_all: bool,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operator holds every capability.
    pub fn allow_all() -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
            allow_all: true,
        }
    }

    pub fn grant(&self, operator: ParticipantId, capability: &str) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operator)
            .or_default()
            .insert(capability.to_string());
    }
}

impl Permissions for StaticPermissions {
    fn has_capability(&self, operator: &ParticipantId, capability: &str) -> bool {
        self.allow_all
            || self
                .grants
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(operator)
                .map(|caps| caps.contains(capability))
                .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    participants: RwLock<Vec<ParticipantRef>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, participant: ParticipantRef) {
        let mut list = self
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        list.retain(|p| p.id != participant.id);
        list.push(participant);
    }

    pub fn set_connectivity(&self, id: &ParticipantId, connectivity: Connectivity) {
        let mut list = self
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(p) = list.iter_mut().find(|p| p.id == *id) {
            p.connectivity = connectivity;
        }
    }
}

impl ParticipantDirectory for MemoryDirectory {
    fn resolve_participant(&self, name_or_id: &str) -> Option<ParticipantRef> {
        let list = self
            .participants
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = ParticipantId::parse(name_or_id) {
            return list.iter().find(|p| p.id == id).cloned();
        }
        list.iter()
            .find(|p| p.name.eq_ignore_ascii_case(name_or_id.trim()))
            .cloned()
    }
}

/// Keeps every message sent, per operator.
#[derive(Default)]
pub struct CollectingMessenger {
    sent: Mutex<Vec<(ParticipantId, String)>>,
}

impl CollectingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, operator: &ParticipantId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(to, _)| to == operator)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_for(&self, operator: &ParticipantId) -> Option<String> {
        self.messages_for(operator).pop()
    }
}

impl Messenger for CollectingMessenger {
    fn send_message(&self, operator: &ParticipantId, text: &str) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((*operator, text.to_string()));
    }
}
