//! Host release 1.9 (`v1_9_R1`, `v1_9_R2`).
//!
//! Native inventory: 36 main slots, 4 armor slots and one off-hand slot,
//! held by the host as `Arc<Mutex<PlayerInventory>>`.
//!
//! Persisted layout: gzip-compressed bincode of a data-version tag plus a list
//! of `(slot id, item)` entries. Slot ids follow the host's numbering:
//! `0..=35` main, `100..=103` armor, `-106` off-hand.

use std::any::Any;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bincode::Options;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{CloseCoupling, InventoryAdapter};
use crate::host::HostBindings;
use crate::inventory::errors::InvError;
use crate::inventory::snapshot::{InventorySnapshot, SlotStore, SnapshotOrigin};
use crate::inventory::types::{
    HostVersion, InventoryKind, InventoryLayout, ItemStack, ParticipantId, ParticipantRef,
};

pub const CLOSE_COUPLING: CloseCoupling = CloseCoupling::Separable;

pub const LAYOUT: InventoryLayout = InventoryLayout::new(&[
    (InventoryKind::Main, 36),
    (InventoryKind::Armor, 4),
    (InventoryKind::OffHand, 1),
]);

/// Data version written into every record by this release.
pub const DATA_VERSION: u16 = 169;

const ARMOR_SLOT_BASE: i16 = 100;
const OFFHAND_SLOT: i16 = -106;

// ============================================================================
// Native host structure
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInventory {
    pub items: Vec<Option<ItemStack>>,
    pub armor: Vec<Option<ItemStack>>,
    pub extra_slots: Vec<Option<ItemStack>>,
    viewers: Vec<ParticipantId>,
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
            extra_slots: vec![None; LAYOUT.section_len(InventoryKind::OffHand)],
            viewers: Vec::new(),
        }
    }

    /// Wrap for insertion into the host's live world.
    pub fn into_live(self) -> Arc<Mutex<PlayerInventory>> {
        Arc::new(Mutex::new(self))
    }

    fn section(&self, kind: InventoryKind) -> &Vec<Option<ItemStack>> {
        match kind {
            InventoryKind::Main => &self.items,
            InventoryKind::Armor => &self.armor,
            InventoryKind::OffHand => &self.extra_slots,
        }
    }

    fn section_mut(&mut self, kind: InventoryKind) -> &mut Vec<Option<ItemStack>> {
        match kind {
            InventoryKind::Main => &mut self.items,
            InventoryKind::Armor => &mut self.armor,
            InventoryKind::OffHand => &mut self.extra_slots,
        }
    }

    pub fn viewers(&self) -> &[ParticipantId] {
        &self.viewers
    }

    pub fn add_viewer(&mut self, viewer: ParticipantId) {
        if !self.viewers.contains(&viewer) {
            self.viewers.push(viewer);
        }
    }

    pub fn remove_viewer(&mut self, viewer: &ParticipantId) -> bool {
        let before = self.viewers.len();
        self.viewers.retain(|v| v != viewer);
        before != self.viewers.len()
    }
}

fn lock(native: &Mutex<PlayerInventory>) -> MutexGuard<'_, PlayerInventory> {
    native.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Persisted layout
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PlayerData {
    data_version: u16,
    inventory: Vec<SlotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SlotEntry {
    slot: i16,
    item: ItemStack,
}

fn host_slot_id(kind: InventoryKind, index: usize) -> i16 {
    match kind {
        InventoryKind::Main => index as i16,
        InventoryKind::Armor => ARMOR_SLOT_BASE + index as i16,
        InventoryKind::OffHand => OFFHAND_SLOT,
    }
}

fn from_host_slot_id(slot: i16) -> Option<(InventoryKind, usize)> {
    let main = LAYOUT.section_len(InventoryKind::Main) as i16;
    let armor = LAYOUT.section_len(InventoryKind::Armor) as i16;
    match slot {
        OFFHAND_SLOT => Some((InventoryKind::OffHand, 0)),
        s if (0..main).contains(&s) => Some((InventoryKind::Main, s as usize)),
        s if (ARMOR_SLOT_BASE..ARMOR_SLOT_BASE + armor).contains(&s) => {
            Some((InventoryKind::Armor, (s - ARMOR_SLOT_BASE) as usize))
        }
        _ => None,
    }
}

/// Encode an inventory in this release's on-disk layout.
pub fn encode_player_data(inventory: &PlayerInventory) -> Result<Vec<u8>, InvError> {
    let mut entries = Vec::new();
    for (kind, _) in LAYOUT.sections() {
        for (index, slot) in inventory.section(*kind).iter().enumerate() {
            if let Some(item) = slot {
                entries.push(SlotEntry {
                    slot: host_slot_id(*kind, index),
                    item: item.clone(),
                });
            }
        }
    }
    let record = PlayerData {
        data_version: DATA_VERSION,
        inventory: entries,
    };
    let payload =
        bincode::serialize(&record).map_err(|e| InvError::Internal(format!("encode: {}", e)))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}

/// Decode a persisted record. Any structural problem is `CorruptData`.
pub fn decode_player_data(
    owner: &ParticipantId,
    bytes: &[u8],
) -> Result<PlayerInventory, InvError> {
    let mut payload = Vec::new();
    let mut decoder = GzDecoder::new(bytes);
    decoder
        .read_to_end(&mut payload)
        .map_err(|e| InvError::corrupt(owner, format!("decompress: {}", e)))?;
    let rest = decoder.into_inner();
    if !rest.is_empty() {
        return Err(InvError::corrupt(
            owner,
            format!("{} bytes after compressed record", rest.len()),
        ));
    }
    let record: PlayerData = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(&payload)
        .map_err(|e| InvError::corrupt(owner, format!("decode: {}", e)))?;
    if record.data_version != DATA_VERSION {
        return Err(InvError::corrupt(
            owner,
            format!(
                "data version {} (expected {})",
                record.data_version, DATA_VERSION
            ),
        ));
    }

    let mut inventory = PlayerInventory::new();
    for entry in record.inventory {
        let (kind, index) = from_host_slot_id(entry.slot)
            .ok_or_else(|| InvError::corrupt(owner, format!("unknown slot id {}", entry.slot)))?;
        if entry.item.amount == 0 {
            return Err(InvError::corrupt(
                owner,
                format!("empty stack in slot {}", entry.slot),
            ));
        }
        let slot = &mut inventory.section_mut(kind)[index];
        if slot.is_some() {
            return Err(InvError::corrupt(
                owner,
                format!("duplicate slot id {}", entry.slot),
            ));
        }
        *slot = Some(entry.item);
    }
    Ok(inventory)
}

// ============================================================================
// Adapter
// ============================================================================

struct NativeStore {
    native: Arc<Mutex<PlayerInventory>>,
}

impl SlotStore for NativeStore {
    fn get(&self, kind: InventoryKind, index: usize) -> Option<ItemStack> {
        lock(&self.native)
            .section(kind)
            .get(index)
            .cloned()
            .flatten()
    }

    fn set(&self, kind: InventoryKind, index: usize, item: Option<ItemStack>) -> Option<ItemStack> {
        let mut native = lock(&self.native);
        match native.section_mut(kind).get_mut(index) {
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

    fn live_native(
        &self,
        target: &ParticipantRef,
    ) -> Result<Option<Arc<Mutex<PlayerInventory>>>, InvError> {
        let Some(handle) = self.host.world.live_inventory(&target.id) else {
            return Ok(None);
        };
        handle
            .downcast::<Mutex<PlayerInventory>>()
            .map(Some)
            .map_err(|_| InvError::LayoutMismatch {
                version: self.version.to_string(),
                detail: format!("live inventory of {} has a foreign layout", target),
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
        if let Some(native) = self.live_native(target)? {
            debug!("[{}] binding live inventory of {}", self.version, target);
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
        debug!(
            "[{}] loaded offline inventory of {} ({} bytes)",
            self.version,
            target,
            bytes.len()
        );
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
        lock(&self.native_of(snapshot)?.native).add_viewer(*viewer);
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
        lock(&self.native_of(snapshot)?.native).remove_viewer(viewer);
        Ok(())
    }

    fn notify_closed(
        &self,
        snapshot: &InventorySnapshot,
        viewer: &ParticipantId,
    ) -> Result<(), InvError> {
        self.host
            .events
            .viewer_closed(&snapshot.owner().id, viewer);
        Ok(())
    }
}
