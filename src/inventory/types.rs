use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Participants
// ============================================================================

/// Stable, opaque participant identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new_random() -> Self {
        ParticipantId(Uuid::new_v4())
    }

    /// Identity used for console operators (no in-world body).
    pub fn console() -> Self {
        ParticipantId(Uuid::nil())
    }

    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(ParticipantId)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    Online,
    Offline,
}

/// A resolved participant. Never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRef {
    pub id: ParticipantId,
    pub name: String,
    pub connectivity: Connectivity,
}

impl ParticipantRef {
    pub fn new(id: ParticipantId, name: &str, connectivity: Connectivity) -> Self {
        Self {
            id,
            name: name.to_string(),
            connectivity,
        }
    }

    pub fn online(id: ParticipantId, name: &str) -> Self {
        Self::new(id, name, Connectivity::Online)
    }

    pub fn offline(id: ParticipantId, name: &str) -> Self {
        Self::new(id, name, Connectivity::Offline)
    }

    pub fn is_online(&self) -> bool {
        self.connectivity == Connectivity::Online
    }
}

impl fmt::Display for ParticipantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Player names accepted by lookups: 3-16 chars of `[A-Za-z0-9_]`.
pub fn is_valid_participant_name(name: &str) -> bool {
    let len = name.chars().count();
    (3..=16).contains(&len) && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Items
// ============================================================================

/// Item descriptor held in a single slot.
///
/// Enchantments use a `BTreeMap` so the encoded form is stable across flushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub amount: u8,
    #[serde(default)]
    pub damage: u16,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub enchantments: BTreeMap<String, u8>,
}

impl ItemStack {
    pub fn new(item: &str, amount: u8) -> Self {
        Self {
            item: item.to_ascii_uppercase(),
            amount,
            damage: 0,
            display_name: None,
            enchantments: BTreeMap::new(),
        }
    }

    pub fn with_damage(mut self, damage: u16) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_enchantment(mut self, enchantment: &str, level: u8) -> Self {
        self.enchantments
            .insert(enchantment.to_ascii_uppercase(), level);
        self
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount > 1 {
            write!(f, "{}x ", self.amount)?;
        }
        write!(f, "{}", self.item)?;
        if self.damage > 0 {
            write!(f, ":{}", self.damage)?;
        }
        if let Some(name) = &self.display_name {
            write!(f, " \"{}\"", name)?;
        }
        Ok(())
    }
}

// ============================================================================
// Layouts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryKind {
    Main,
    Armor,
    OffHand,
}

impl InventoryKind {
    pub fn label(&self) -> &'static str {
        match self {
            InventoryKind::Main => "main",
            InventoryKind::Armor => "armor",
            InventoryKind::OffHand => "off-hand",
        }
    }
}

/// Flat slot indexing over an ordered list of inventory sections.
///
/// Slot counts are fixed per host version. A snapshot exposes slots
/// `0..slot_count()` in section order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryLayout {
    sections: &'static [(InventoryKind, usize)],
}

impl InventoryLayout {
    pub const fn new(sections: &'static [(InventoryKind, usize)]) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &'static [(InventoryKind, usize)] {
        self.sections
    }

    pub fn slot_count(&self) -> usize {
        self.sections.iter().map(|(_, len)| len).sum()
    }

    pub fn section_len(&self, kind: InventoryKind) -> usize {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }

    /// Map a flat slot to `(section, index within section)`.
    pub fn locate(&self, slot: usize) -> Option<(InventoryKind, usize)> {
        let mut base = 0;
        for (kind, len) in self.sections {
            if slot < base + len {
                return Some((*kind, slot - base));
            }
            base += len;
        }
        None
    }
}

// ============================================================================
// Host versions
// ============================================================================

/// Host runtime version identifier, e.g. `v1_9_R1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostVersion(String);

impl HostVersion {
    pub fn new(id: &str) -> Self {
        HostVersion(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
