//! Test utilities & fixtures.
//! An in-memory host with every collaborator recorded, plus helpers to place
//! participants online or offline for a given host version.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use remoteinv::host::memory::{
    CollectingMessenger, MemoryDirectory, MemoryPlayerData, MemoryWorld, RecordingEvents,
    StaticPermissions,
};
use remoteinv::host::{Collaborators, HostBindings, PlayerDataStore};
use remoteinv::inventory::adapter::{v1_8, v1_9};
use remoteinv::inventory::service::capabilities;
use remoteinv::inventory::{
    ContainerSessionManager, HostVersion, InvError, InventoryAdapter, InventoryService,
    ParticipantId, ParticipantRef, SilentToggles, VersionAdapterRegistry,
};

/// Player data whose loads take a while, so an offline open stays in flight.
pub struct SlowPlayerData {
    inner: Arc<MemoryPlayerData>,
    delay: Duration,
}

impl SlowPlayerData {
    pub fn new(inner: Arc<MemoryPlayerData>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl PlayerDataStore for SlowPlayerData {
    fn load(&self, id: &ParticipantId) -> Result<Option<Vec<u8>>, InvError> {
        // Loads run on the blocking pool.
        std::thread::sleep(self.delay);
        self.inner.load(id)
    }

    fn store(&self, id: &ParticipantId, bytes: &[u8]) -> Result<(), InvError> {
        self.inner.store(id, bytes)
    }
}

pub struct TestHost {
    pub world: Arc<MemoryWorld>,
    pub data: Arc<MemoryPlayerData>,
    pub events: Arc<RecordingEvents>,
    pub permissions: Arc<StaticPermissions>,
    pub directory: Arc<MemoryDirectory>,
    pub messenger: Arc<CollectingMessenger>,
}

#[allow(dead_code)] // Each test binary uses a different subset.
impl TestHost {
    pub fn new() -> Self {
        Self {
            world: Arc::new(MemoryWorld::new()),
            data: Arc::new(MemoryPlayerData::new()),
            events: Arc::new(RecordingEvents::new()),
            permissions: Arc::new(StaticPermissions::new()),
            directory: Arc::new(MemoryDirectory::new()),
            messenger: Arc::new(CollectingMessenger::new()),
        }
    }

    pub fn bindings(&self) -> HostBindings {
        HostBindings {
            world: self.world.clone(),
            data: self.data.clone(),
            events: self.events.clone(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            permissions: self.permissions.clone(),
            directory: self.directory.clone(),
            messenger: self.messenger.clone(),
        }
    }

    pub fn adapter(&self, version: &str) -> Arc<dyn InventoryAdapter> {
        VersionAdapterRegistry::with_builtin()
            .resolve(&HostVersion::new(version), self.bindings())
            .expect("builtin version")
    }

    pub fn manager(&self, version: &str) -> ContainerSessionManager {
        ContainerSessionManager::new(self.adapter(version))
    }

    pub fn service(&self, version: &str) -> InventoryService {
        InventoryService::new(
            self.adapter(version),
            self.collaborators(),
            SilentToggles::new(),
            true,
        )
    }

    /// Same as `service`, but offline loads sleep for `delay` first.
    pub fn slow_service(&self, version: &str, delay: Duration) -> InventoryService {
        let bindings = HostBindings {
            data: Arc::new(SlowPlayerData::new(self.data.clone(), delay)),
            ..self.bindings()
        };
        let adapter = VersionAdapterRegistry::with_builtin()
            .resolve(&HostVersion::new(version), bindings)
            .expect("builtin version");
        InventoryService::new(adapter, self.collaborators(), SilentToggles::new(), true)
    }

    /// An operator allowed to open inventories and use silent mode.
    pub fn operator(&self, name: &str) -> ParticipantRef {
        let op = ParticipantRef::online(ParticipantId::new_random(), name);
        self.directory.add(op.clone());
        self.permissions.grant(op.id, capabilities::OPEN_INVENTORY);
        self.permissions.grant(op.id, capabilities::SILENT);
        op
    }

    pub fn online_v19(&self, name: &str, inventory: v1_9::PlayerInventory) -> (ParticipantRef, Arc<Mutex<v1_9::PlayerInventory>>) {
        let target = ParticipantRef::online(ParticipantId::new_random(), name);
        let native = inventory.into_live();
        self.world.insert(target.id, native.clone());
        self.directory.add(target.clone());
        (target, native)
    }

    pub fn offline_v19(&self, name: &str, inventory: &v1_9::PlayerInventory) -> ParticipantRef {
        let target = ParticipantRef::offline(ParticipantId::new_random(), name);
        let bytes = v1_9::encode_player_data(inventory).expect("encode");
        self.data.put_raw(target.id, bytes);
        self.directory.add(target.clone());
        target
    }

    pub fn offline_v18(&self, name: &str, inventory: &v1_8::PlayerInventory) -> ParticipantRef {
        let target = ParticipantRef::offline(ParticipantId::new_random(), name);
        let bytes = v1_8::encode_player_data(inventory).expect("encode");
        self.data.put_raw(target.id, bytes);
        self.directory.add(target.clone());
        target
    }

    pub fn stored_v19(&self, id: &ParticipantId) -> v1_9::PlayerInventory {
        let bytes = self.data.raw(id).expect("stored record");
        v1_9::decode_player_data(id, &bytes).expect("decode stored record")
    }

    pub fn stored_v18(&self, id: &ParticipantId) -> v1_8::PlayerInventory {
        let bytes = self.data.raw(id).expect("stored record");
        v1_8::decode_player_data(id, &bytes).expect("decode stored record")
    }
}
