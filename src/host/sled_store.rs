use std::path::Path;

use log::debug;

use super::{ParticipantDirectory, PlayerDataStore};
use crate::inventory::errors::InvError;
use crate::inventory::types::{is_valid_participant_name, ParticipantId, ParticipantRef};

const TREE_PLAYERDATA: &str = "playerdata";
const TREE_PROFILES: &str = "profiles";

/// Sled-backed host player data plus a name index.
///
/// Player data values are opaque bytes in whatever layout the host version
/// writes. Everything resolved from this store is reported offline.
#[derive(Clone)]
pub struct SledPlayerData {
    _db: sled::Db,
    playerdata: sled::Tree,
    profiles: sled::Tree,
}

impl SledPlayerData {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, InvError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let playerdata = db.open_tree(TREE_PLAYERDATA)?;
        let profiles = db.open_tree(TREE_PROFILES)?;
        Ok(Self {
            _db: db,
            playerdata,
            profiles,
        })
    }

    fn data_key(id: &ParticipantId) -> Vec<u8> {
        format!("players:{}", id).into_bytes()
    }

    fn name_key(name: &str) -> Vec<u8> {
        format!("names:{}", name.to_ascii_lowercase()).into_bytes()
    }

    fn id_key(id: &ParticipantId) -> Vec<u8> {
        format!("ids:{}", id).into_bytes()
    }

    /// Record the display name for a participant id.
    pub fn register_profile(&self, id: ParticipantId, name: &str) -> Result<(), InvError> {
        if !is_valid_participant_name(name) {
            return Err(InvError::NotFound(format!("invalid participant name: {}", name)));
        }
        if let Some(old) = self.profiles.get(Self::id_key(&id))? {
            let old_name = String::from_utf8_lossy(&old).to_string();
            self.profiles.remove(Self::name_key(&old_name))?;
        }
        self.profiles
            .insert(Self::name_key(name), id.to_string().as_bytes())?;
        self.profiles.insert(Self::id_key(&id), name.as_bytes())?;
        self.profiles.flush()?;
        Ok(())
    }

    fn name_of(&self, id: &ParticipantId) -> Result<Option<String>, InvError> {
        Ok(self
            .profiles
            .get(Self::id_key(id))?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    fn id_of(&self, name: &str) -> Result<Option<ParticipantId>, InvError> {
        Ok(self
            .profiles
            .get(Self::name_key(name))?
            .and_then(|bytes| ParticipantId::parse(&String::from_utf8_lossy(&bytes))))
    }

    /// All registered participants, sorted by name.
    pub fn list_profiles(&self) -> Result<Vec<ParticipantRef>, InvError> {
        let mut out = Vec::new();
        for entry in self.profiles.scan_prefix(b"ids:") {
            let (key, value) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text.strip_prefix("ids:").and_then(ParticipantId::parse) {
                out.push(ParticipantRef::offline(id, &String::from_utf8_lossy(&value)));
            }
        }
        out.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
        Ok(out)
    }
}

impl PlayerDataStore for SledPlayerData {
    fn load(&self, id: &ParticipantId) -> Result<Option<Vec<u8>>, InvError> {
        Ok(self.playerdata.get(Self::data_key(id))?.map(|v| v.to_vec()))
    }

    fn store(&self, id: &ParticipantId, bytes: &[u8]) -> Result<(), InvError> {
        self.playerdata.insert(Self::data_key(id), bytes)?;
        self.playerdata.flush()?;
        debug!("stored {} bytes of player data for {}", bytes.len(), id);
        Ok(())
    }
}

impl ParticipantDirectory for SledPlayerData {
    fn resolve_participant(&self, name_or_id: &str) -> Option<ParticipantRef> {
        let lookup = if let Some(id) = ParticipantId::parse(name_or_id) {
            self.name_of(&id).map(|name| name.map(|n| (id, n)))
        } else if is_valid_participant_name(name_or_id.trim()) {
            self.id_of(name_or_id.trim()).and_then(|id| match id {
                Some(id) => self.name_of(&id).map(|n| n.map(|n| (id, n))),
                None => Ok(None),
            })
        } else {
            Ok(None)
        };
        match lookup {
            Ok(Some((id, name))) => Some(ParticipantRef::offline(id, &name)),
            Ok(None) => None,
            Err(e) => {
                debug!("participant lookup for '{}' failed: {}", name_or_id, e);
                None
            }
        }
    }
}
