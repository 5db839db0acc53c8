//! Host release 1.8 (`v1_8_R3`).
//!
//! Native inventory: 36 main slots and 4 armor slots, no off-hand. The host
//! only exposes `close_container`, which unregisters a viewer and notifies the
//! owner in one step, so this release cannot close silently.
//!
//! Persisted layout: bincode of the 40 flat slots, followed by a little-endian
//! CRC-32 of that payload.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bincode::Options;
use crc::{Crc, CRC_32_ISO_HDLC};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{CloseCoupling, InventoryAdapter};
use crate::host::{ContainerEvents, HostBindings};
use crate::inventory::errors::InvError;
use crate::inventory::snapshot::{InventorySnapshot, SlotStore, SnapshotOrigin};
use crate::inventory::types::{
    HostVersion, InventoryKind, InventoryLayout, ItemStack, ParticipantId, ParticipantRef,
};

/// This release only closes a container through `close_container`, which
/// always notifies the owner.
pub const CLOSE_COUPLING: CloseCoupling = CloseCoupling::Coupled;

pub const LAYOUT: InventoryLayout =
    InventoryLayout::new(&[(InventoryKind::Main, 36), (InventoryKind::Armor, 4)]);

const CHECKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInventory {
    pub items: Vec<Option<ItemStack>>,
    pub armor: Vec<Option<ItemStack>>,
    transaction: Vec<ParticipantId>,
}

impl Default for PlayerInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerInventory {
    pub fn new() -> Self {
        Self {
            items: vec![None; LAYOUT.section_len(InventoryKind::Main)],
            armor: vec![None; LAYOUT.section_len(InventoryKind::Armor)],
            transaction: Vec::new(),
        }
    }

    pub fn into_live(self) -> Arc<Mutex<PlayerInventory>> {
        Arc::new(Mutex::new(self))
    }

    pub fn viewers(&self) -> &[ParticipantId] {
        &self.transaction
    }

    pub fn start_open(&mut self, viewer: ParticipantId) {
        if !self.transaction.contains(&viewer) {
            self.transaction.push(viewer);
        }
    }

    /// The only close entry point this release has: unregister and notify.
    pub fn close_container(
        &mut self,
        owner: &ParticipantId,
        viewer: &ParticipantId,
        events: &dyn ContainerEvents,
    ) {
        self.transaction.retain(|v| v != viewer);
        events.viewer_closed(owner, viewer);
    }

    fn slot(&self, kind: InventoryKind, index: usize) -> Option<&Option<ItemStack>> {
        match kind {
            InventoryKind::Main => self.items.get(index),
            InventoryKind::Armor => self.armor.get(index),
            InventoryKind::OffHand => None,
        }
    }

    fn slot_mut(&mut self, kind: InventoryKind, index: usize) -> Option<&mut Option<ItemStack>> {
        match kind {
            InventoryKind::Main => self.items.get_mut(index),
            InventoryKind::Armor => self.armor.get_mut(index),
            InventoryKind::OffHand => None,
        }
    }
}

fn lock(native: &Mutex<PlayerInventory>) -> MutexGuard<'_, PlayerInventory> {
    native.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyPlayerData {
    slots: Vec<Option<ItemStack>>,
}

pub fn encode_player_data(inventory: &PlayerInventory) -> Result<Vec<u8>, InvError> {
    let record = LegacyPlayerData {
        slots: inventory
            .items
            .iter()
            .chain(inventory.armor.iter())
            .cloned()
            .collect(),
    };
    let mut bytes =
        bincode::serialize(&record).map_err(|e| InvError::Internal(format!("encode: {}", e)))?;
    let sum = CHECKSUM.checksum(&bytes);
    bytes.extend_from_slice(&sum.to_le_bytes());
    Ok(bytes)
}

pub fn decode_player_data(
    owner: &ParticipantId,
    bytes: &[u8],
) -> Result<PlayerInventory, InvError> {
    if bytes.len() < 4 {
        return Err(InvError::corrupt(owner, "record shorter than checksum"));
    }
    let (payload, trailer) = bytes.split_at(bytes.len() - 4);
    let mut sum = [0u8; 4];
    sum.copy_from_slice(trailer);
    if CHECKSUM.checksum(payload) != u32::from_le_bytes(sum) {
        return Err(InvError::corrupt(owner, "checksum mismatch"));
    }
    let record: LegacyPlayerData = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(payload)
        .map_err(|e| InvError::corrupt(owner, format!("decode: {}", e)))?;
    if record.slots.len() != LAYOUT.slot_count() {
        return Err(InvError::corrupt(
            owner,
            format!(
                "{} slots stored, layout has {}",
                record.slots.len(),
                LAYOUT.slot_count()
            ),
        ));
    }
    if let Some(index) = record
        .slots
        .iter()
        .position(|s| matches!(s, Some(item) if item.amount == 0))
    {
        return Err(InvError::corrupt(owner, format!("empty stack in slot {}", index)));
    }

    let mut slots = record.slots;
    let armor = slots.split_off(LAYOUT.section_len(InventoryKind::Main));
    Ok(PlayerInventory {
        items: slots,
        armor,
        transaction: Vec::new(),
    })
}

struct NativeStore {
    native: Arc<Mutex<PlayerInventory>>,
}

impl SlotStore for NativeStore {
    fn get(&self, kind: InventoryKind, index: usize) -> Option<ItemStack> {
        lock(&self.native).slot(kind, index).cloned().flatten()
    }

    fn set(&self, kind: InventoryKind, index: usize, item: Option<ItemStack>) -> Option<ItemStack> {
        let mut native = lock(&self.native);
        match native.slot_mut(kind, index) {
            Some(slot) => std::mem::replace(slot, item),
            None => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct Accessor {
    version: HostVersion,
    host: HostBindings,
}

impl Accessor {
    pub fn new(version: HostVersion, host: HostBindings) -> Self {
        Self { version, host }
    }

    fn native_of<'a>(&self, snapshot: &'a InventorySnapshot) -> Result<&'a NativeStore, InvError> {
        snapshot
            .store()
            .as_any()
            .downcast_ref::<NativeStore>()
            .ok_or_else(|| InvError::LayoutMismatch {
                version: self.version.to_string(),
                detail: "snapshot was not opened by this adapter".to_string(),
            })
    }
}

impl InventoryAdapter for Accessor {
    fn version(&self) -> &HostVersion {
        &self.version
    }

    fn layout(&self) -> InventoryLayout {
        LAYOUT
    }

    fn close_coupling(&self) -> CloseCoupling {
        CLOSE_COUPLING
    }

    fn is_live(&self, target: &ParticipantRef) -> bool {
        self.host.world.live_inventory(&target.id).is_some()
    }

    fn open(&self, target: &ParticipantRef) -> Result<InventorySnapshot, InvError> {
        if let Some(handle) = self.host.world.live_inventory(&target.id) {
            let native = handle.downcast::<Mutex<PlayerInventory>>().map_err(|_| {
                InvError::LayoutMismatch {
                    version: self.version.to_string(),
                    detail: format!("live inventory of {} has a foreign layout", target),
                }
            })?;
            return Ok(InventorySnapshot::new(
                target.clone(),
                SnapshotOrigin::Live,
                LAYOUT,
                Box::new(NativeStore { native }),
            ));
        }

        let bytes = self
            .host
            .data
            .load(&target.id)?
            .ok_or_else(|| InvError::DataUnavailable(target.to_string()))?;
        let inventory = decode_player_data(&target.id, &bytes)?;
        debug!("[{}] loaded offline inventory of {}", self.version, target);
        Ok(InventorySnapshot::new(
            target.clone(),
            SnapshotOrigin::Offline,
            LAYOUT,
            Box::new(NativeStore {
                native: inventory.into_live(),
            }),
        ))
    }

    fn empty_record(&self) -> Result<Vec<u8>, InvError> {
        encode_player_data(&PlayerInventory::new())
    }

    fn flush(&self, snapshot: &InventorySnapshot) -> Result<(), InvError> {
        if snapshot.is_live() {
            return Ok(());
        }
        let store = self.native_of(snapshot)?;
        let bytes = encode_player_data(&lock(&store.native))?;
        self.host.data.store(&snapshot.owner().id, &bytes)?;
        snapshot.clear_dirty();
        Ok(())
    }

    fn close(&self, snapshot: &InventorySnapshot) -> Result<(), InvError> {
        if snapshot.mark_closed() {
            debug!("[{}] closed inventory of {}", self.version, snapshot.owner());
        }
        Ok(())
    }

    fn attach_viewer(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError> {
        lock(&self.native_of(snapshot)?.native).start_open(*viewer);
        self.host
            .events
            .viewer_opened(&snapshot.owner().id, viewer);
        Ok(())
    }

    fn detach_viewer(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError> {
        let store = self.native_of(snapshot)?;
        lock(&store.native).close_container(
            &snapshot.owner().id,
            viewer,
            self.host.events.as_ref(),
        );
        Ok(())
    }

    fn notify_closed(
        &self,
        _snapshot: &InventorySnapshot,
        _viewer: &ParticipantId,
    ) -> Result<(), InvError> {
        // close_container already notified.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_guards_payload() {
        let owner = ParticipantId::new_random();
        let mut inv = PlayerInventory::new();
        inv.items[4] = Some(ItemStack::new("bread", 12));
        inv.armor[0] = Some(ItemStack::new("leather_boots", 1));
        let mut bytes = encode_player_data(&inv).expect("encode");
        assert_eq!(decode_player_data(&owner, &bytes).expect("decode"), inv);

        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            decode_player_data(&owner, &bytes),
            Err(InvError::CorruptData { .. })
        ));
    }

    #[test]
    fn padded_payload_is_corrupt_even_with_valid_checksum() {
        let owner = ParticipantId::new_random();
        let bytes = encode_player_data(&PlayerInventory::new()).expect("encode");
        let mut payload = bytes[..bytes.len() - 4].to_vec();
        payload.extend_from_slice(&[0, 0, 0]);
        let sum = CHECKSUM.checksum(&payload);
        payload.extend_from_slice(&sum.to_le_bytes());
        assert!(matches!(
            decode_player_data(&owner, &payload),
            Err(InvError::CorruptData { .. })
        ));
    }

    #[test]
    fn wrong_slot_count_is_corrupt() {
        let owner = ParticipantId::new_random();
        let record = LegacyPlayerData {
            slots: vec![None; 41],
        };
        let mut bytes = bincode::serialize(&record).unwrap();
        let sum = CHECKSUM.checksum(&bytes);
        bytes.extend_from_slice(&sum.to_le_bytes());
        assert!(matches!(
            decode_player_data(&owner, &bytes),
            Err(InvError::CorruptData { .. })
        ));
    }
}
