//! Registry mapping host runtime versions to inventory adapters.
//!
//! Supporting a new host release means adding an adapter module and one
//! `register` call in [`VersionAdapterRegistry::with_builtin`]; nothing that
//! consumes [`InventoryAdapter`] changes.
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use log::{info, warn};

use super::{v1_8, v1_9, CloseCoupling, InventoryAdapter};
use crate::host::HostBindings;
use crate::inventory::errors::InvError;
use crate::inventory::types::HostVersion;

type AdapterFactory = Box<dyn Fn(HostVersion, HostBindings) -> Arc<dyn InventoryAdapter> + Send + Sync>;

struct Entry {
    coupling: CloseCoupling,
    factory: AdapterFactory,
}

pub struct VersionAdapterRegistry {
    entries: BTreeMap<HostVersion, Entry>,
    resolved: OnceLock<Arc<dyn InventoryAdapter>>,
}

impl VersionAdapterRegistry {
    /// Create an empty registry with no host versions registered.
    pub fn new() -> Self {
        VersionAdapterRegistry {
            entries: BTreeMap::new(),
            resolved: OnceLock::new(),
        }
    }

    /// Registry preloaded with every adapter this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("v1_8_R3", v1_8::CLOSE_COUPLING, |version, host| {
            Arc::new(v1_8::Accessor::new(version, host))
        });
        for id in ["v1_9_R1", "v1_9_R2"] {
            registry.register(id, v1_9::CLOSE_COUPLING, |version, host| {
                Arc::new(v1_9::Accessor::new(version, host))
            });
        }
        registry
    }

    /// Register an adapter factory. A coupled close path is reported here, once.
    pub fn register<F>(&mut self, version: &str, coupling: CloseCoupling, factory: F)
    where
        F: Fn(HostVersion, HostBindings) -> Arc<dyn InventoryAdapter> + Send + Sync + 'static,
    {
        let version = HostVersion::new(version);
        if coupling == CloseCoupling::Coupled {
            warn!(
                "Host version {} cannot close a container without notifying its owner; silent mode will be refused",
                version
            );
        }
        self.entries.insert(
            version,
            Entry {
                coupling,
                factory: Box::new(factory),
            },
        );
    }

    pub fn supported_versions(&self) -> Vec<HostVersion> {
        self.entries.keys().cloned().collect()
    }

    /// Versions whose adapters cannot separate close notification from teardown.
    pub fn capability_gaps(&self) -> Vec<HostVersion> {
        self.entries
            .iter()
            .filter(|(_, e)| e.coupling == CloseCoupling::Coupled)
            .map(|(v, _)| v.clone())
            .collect()
    }

    /// Build the adapter for `version`.
    pub fn resolve(
        &self,
        version: &HostVersion,
        host: HostBindings,
    ) -> Result<Arc<dyn InventoryAdapter>, InvError> {
        let entry = self
            .entries
            .get(version)
            .ok_or_else(|| InvError::UnsupportedVersion(version.to_string()))?;
        let adapter = (entry.factory)(version.clone(), host);
        if adapter.close_coupling() != entry.coupling {
            return Err(InvError::LayoutMismatch {
                version: version.to_string(),
                detail: format!(
                    "registered as {:?} but the adapter reports {:?}",
                    entry.coupling,
                    adapter.close_coupling()
                ),
            });
        }
        Ok(adapter)
    }

    /// Resolve once; later calls return the cached adapter.
    ///
    /// A later call naming a different version is refused rather than
    /// handing back an adapter for the wrong layout.
    pub fn resolve_cached(
        &self,
        version: &HostVersion,
        host: HostBindings,
    ) -> Result<Arc<dyn InventoryAdapter>, InvError> {
        if let Some(adapter) = self.resolved.get() {
            if adapter.version() != version {
                return Err(InvError::UnsupportedVersion(format!(
                    "{} (already bound to {})",
                    version,
                    adapter.version()
                )));
            }
            return Ok(adapter.clone());
        }
        let adapter = self.resolve(version, host)?;
        let adapter = self.resolved.get_or_init(|| adapter).clone();
        info!("Bound inventory adapter for host version {}", adapter.version());
        Ok(adapter)
    }

    pub fn active(&self) -> Option<Arc<dyn InventoryAdapter>> {
        self.resolved.get().cloned()
    }
}

impl Default for VersionAdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
