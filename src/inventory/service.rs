//! Front-end facade: the calls a command layer makes.
//!
//! `InventoryService` owns the session manager and serializes every
//! open/close for a given target through a FIFO async gate, so acquire and
//! release for one target never interleave. Offline loads and final flushes
//! run on the blocking pool and are applied back under the same gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::sync::OwnedMutexGuard;

use super::adapter::registry::VersionAdapterRegistry;
use super::adapter::InventoryAdapter;
use super::errors::InvError;
use super::session::{ContainerSessionManager, ReleaseOutcome, SessionHandle, Teardown};
use super::silent::{close_view, CloseMode, ContainerView, SilentToggles};
use super::snapshot::InventorySnapshot;
use super::types::{ParticipantId, ParticipantRef};
use crate::config::migration::ConfigMigrator;
use crate::config::Config;
use crate::host::{Collaborators, HostBindings};
use crate::metrics;

/// Capability names checked through [`crate::host::Permissions`].
pub mod capabilities {
    pub const OPEN_INVENTORY: &str = "remoteinv.openinv";
    pub const SILENT: &str = "remoteinv.silent";
    /// Held by participants whose inventory others may not open.
    pub const EXEMPT: &str = "remoteinv.exempt";
    /// Lets an operator open exempt participants anyway.
    pub const OVERRIDE: &str = "remoteinv.override";
}

/// One async mutex per target with pending work.
#[derive(Default)]
struct TargetGates {
    gates: Mutex<HashMap<ParticipantId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetGates {
    fn map(&self) -> Result<MutexGuard<'_, HashMap<ParticipantId, Arc<tokio::sync::Mutex<()>>>>, InvError> {
        self.gates
            .lock()
            .map_err(|_| InvError::Internal("target gate map poisoned".to_string()))
    }

    async fn enter(&self, target: ParticipantId) -> Result<OwnedMutexGuard<()>, InvError> {
        let gate = self.map()?.entry(target).or_default().clone();
        Ok(gate.lock_owned().await)
    }

    /// Forget the gate once nobody but the caller holds or waits on it.
    fn retire(&self, target: &ParticipantId) {
        if let Ok(mut map) = self.map() {
            if map.get(target).map(|g| Arc::strong_count(g) <= 2).unwrap_or(false) {
                map.remove(target);
            }
        }
    }

    fn all(&self) -> Vec<Arc<tokio::sync::Mutex<()>>> {
        self.map()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

pub struct InventoryService {
    adapter: Arc<dyn InventoryAdapter>,
    sessions: Mutex<ContainerSessionManager>,
    gates: TargetGates,
    views: Mutex<HashMap<(ParticipantId, ParticipantId), CloseMode>>,
    silent: SilentToggles,
    collaborators: Collaborators,
    notify_silent: bool,
    stopping: AtomicBool,
}

impl InventoryService {
    pub fn new(
        adapter: Arc<dyn InventoryAdapter>,
        collaborators: Collaborators,
        silent: SilentToggles,
        notify_silent: bool,
    ) -> Self {
        Self {
            sessions: Mutex::new(ContainerSessionManager::new(adapter.clone())),
            adapter,
            gates: TargetGates::default(),
            views: Mutex::new(HashMap::new()),
            silent,
            collaborators,
            notify_silent,
            stopping: AtomicBool::new(false),
        }
    }

    /// Resolve the adapter for the configured host version. An unsupported
    /// version is returned as an error and the service is not created.
    pub fn start(
        config: &Config,
        registry: &VersionAdapterRegistry,
        host: HostBindings,
        collaborators: Collaborators,
    ) -> Result<Self, InvError> {
        let adapter = registry.resolve_cached(&config.host_version(), host)?;
        let silent = SilentToggles::from_map(config.silent_toggles());
        Ok(Self::new(
            adapter,
            collaborators,
            silent,
            config.notify.silent_chest,
        ))
    }

    /// Startup sequence: migrate the config file once, load it, bind the adapter.
    pub async fn bootstrap(
        config_path: &str,
        registry: &VersionAdapterRegistry,
        host: HostBindings,
        collaborators: Collaborators,
    ) -> anyhow::Result<(Self, Config)> {
        ConfigMigrator::new(config_path, collaborators.directory.clone())
            .check_for_updates()
            .await?;
        let config = Config::load(config_path).await?;
        let service = Self::start(&config, registry, host, collaborators)?;
        info!(
            "Remote inventory ready on host version {}",
            service.adapter.version()
        );
        Ok((service, config))
    }

    pub fn adapter(&self) -> &Arc<dyn InventoryAdapter> {
        &self.adapter
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, ContainerSessionManager>, InvError> {
        self.sessions
            .lock()
            .map_err(|_| InvError::Internal("session manager poisoned".to_string()))
    }

    fn lock_views(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<(ParticipantId, ParticipantId), CloseMode>>, InvError> {
        self.views
            .lock()
            .map_err(|_| InvError::Internal("view table poisoned".to_string()))
    }

    fn tell(&self, operator: &ParticipantId, text: &str) {
        self.collaborators.messenger.send_message(operator, text);
    }

    fn can(&self, operator: &ParticipantId, capability: &str) -> bool {
        self.collaborators
            .permissions
            .has_capability(operator, capability)
    }

    // ------------------------------------------------------------------
    // Silent mode
    // ------------------------------------------------------------------

    pub fn toggle_silent(&self, operator: &ParticipantId) -> Result<bool, InvError> {
        if !self.can(operator, capabilities::SILENT) {
            let err = InvError::PermissionDenied("use silent mode".to_string());
            self.tell(operator, &err.operator_message());
            return Err(err);
        }
        let enabled = self.silent.toggle(*operator);
        self.tell(
            operator,
            &format!("Silent mode is now {}.", if enabled { "ON" } else { "OFF" }),
        );
        Ok(enabled)
    }

    /// Report the current flag without changing it.
    pub fn silent_status(&self, operator: &ParticipantId) -> Result<bool, InvError> {
        if !self.can(operator, capabilities::SILENT) {
            let err = InvError::PermissionDenied("use silent mode".to_string());
            self.tell(operator, &err.operator_message());
            return Err(err);
        }
        let enabled = self.silent.is_enabled(operator);
        self.tell(
            operator,
            &format!("Silent mode is {}.", if enabled { "ON" } else { "OFF" }),
        );
        Ok(enabled)
    }

    pub fn is_silent(&self, operator: &ParticipantId) -> bool {
        self.silent.is_enabled(operator)
    }

    pub fn export_silent_toggles(&self, config: &mut Config) {
        config.set_silent_toggles(&self.silent.export());
    }

    // ------------------------------------------------------------------
    // Open / close
    // ------------------------------------------------------------------

    /// Open `query`'s inventory for `operator`. Failures are also reported
    /// to the operator through the messenger.
    pub async fn open_inventory(
        &self,
        operator: &ParticipantRef,
        query: &str,
    ) -> Result<ContainerView, InvError> {
        let result = self.open_inner(operator, query).await;
        if let Err(e) = &result {
            self.tell(&operator.id, &e.operator_message());
        }
        result
    }

    async fn open_inner(
        &self,
        operator: &ParticipantRef,
        query: &str,
    ) -> Result<ContainerView, InvError> {
        if self.is_stopping() {
            return Err(InvError::ShuttingDown);
        }
        if !self.can(&operator.id, capabilities::OPEN_INVENTORY) {
            return Err(InvError::PermissionDenied(
                "open other inventories".to_string(),
            ));
        }
        let target = self
            .collaborators
            .directory
            .resolve_participant(query)
            .ok_or_else(|| InvError::NotFound(query.to_string()))?;
        if target.id != operator.id
            && self.can(&target.id, capabilities::EXEMPT)
            && !self.can(&operator.id, capabilities::OVERRIDE)
        {
            return Err(InvError::PermissionDenied(format!(
                "open {}'s inventory",
                target.name
            )));
        }
        let wants_silent =
            self.silent.is_enabled(&operator.id) && self.can(&operator.id, capabilities::SILENT);

        let _gate = self.gates.enter(target.id).await?;
        // Shutdown raises the flag before collecting gates, so an open that
        // registered its gate too late to be awaited sees it here.
        if self.is_stopping() {
            self.gates.retire(&target.id);
            return Err(InvError::ShuttingDown);
        }
        let existing = self.lock_sessions()?.join_existing(&operator.id, &target.id)?;
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let snapshot = match self.open_snapshot(&target).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        self.gates.retire(&target.id);
                        return Err(e);
                    }
                };
                self.lock_sessions()?.install(&operator.id, snapshot)?
            }
        };

        let key = (operator.id, target.id);
        let previous_mode = self.lock_views()?.get(&key).copied();
        let mode = match previous_mode {
            Some(mode) => mode,
            None if wants_silent => CloseMode::Silent,
            None => CloseMode::Normal,
        };
        let view = self.wrap(handle, mode);
        self.lock_views()?.insert(key, view.mode());

        if view.is_silent() && self.notify_silent && previous_mode.is_none() {
            self.tell(
                &operator.id,
                &format!("You are opening {}'s inventory silently.", target.name),
            );
        }
        Ok(view)
    }

    fn wrap(&self, handle: SessionHandle, mode: CloseMode) -> ContainerView {
        if mode == CloseMode::Normal {
            return ContainerView::normal(handle);
        }
        match ContainerView::silent(handle.clone(), self.adapter.as_ref()) {
            Ok(view) => view,
            Err(e) => {
                warn!(
                    "Silent open requested by {} on {}: {}",
                    handle.operator(),
                    self.adapter.version(),
                    e
                );
                self.tell(handle.operator(), &e.operator_message());
                ContainerView::normal(handle)
            }
        }
    }

    /// Live targets bind inline; offline data is read on the blocking pool.
    async fn open_snapshot(&self, target: &ParticipantRef) -> Result<InventorySnapshot, InvError> {
        let opened = if self.adapter.is_live(target) {
            self.adapter.open(target)
        } else {
            let adapter = self.adapter.clone();
            let owned = target.clone();
            tokio::task::spawn_blocking(move || adapter.open(&owned))
                .await
                .map_err(|e| InvError::Internal(format!("offline load task failed: {}", e)))?
        };
        opened.map_err(|e| {
            metrics::inc_open_failures();
            warn!("Open of {} failed: {}", target, e);
            e
        })
    }

    pub async fn close_inventory(
        &self,
        operator: &ParticipantId,
        target: &ParticipantId,
    ) -> Result<(), InvError> {
        let result = self.close_inner(operator, target).await;
        if let Err(e) = &result {
            self.tell(operator, &e.operator_message());
        }
        result
    }

    async fn close_inner(&self, operator: &ParticipantId, target: &ParticipantId) -> Result<(), InvError> {
        let _gate = self.gates.enter(*target).await?;
        let result = self.release_view(operator, target).await;
        if !self.is_open(target) {
            self.gates.retire(target);
        }
        result
    }

    /// Runs with the target's gate held.
    async fn release_view(&self, operator: &ParticipantId, target: &ParticipantId) -> Result<(), InvError> {
        let key = (*operator, *target);
        let mode = self
            .lock_views()?
            .get(&key)
            .copied()
            .unwrap_or(CloseMode::Normal);
        let outcome = {
            let mut manager = self.lock_sessions()?;
            close_view(&mut manager, operator, target, mode)?
        };
        self.lock_views()?.remove(&key);
        if let ReleaseOutcome::Closed(teardown) = outcome {
            self.run_teardown(teardown).await?;
        }
        Ok(())
    }

    async fn run_teardown(&self, teardown: Teardown) -> Result<(), InvError> {
        let live = teardown.snapshot().map(|s| s.is_live()).unwrap_or(true);
        if live {
            return teardown.run();
        }
        tokio::task::spawn_blocking(move || teardown.run())
            .await
            .map_err(|e| InvError::Internal(format!("flush task failed: {}", e)))?
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Refuse new opens, wait for in-flight ones, close every view in its own mode, then
    /// flush and close whatever sessions remain.
    pub async fn shutdown(&self) -> Result<(), InvError> {
        self.stopping.store(true, Ordering::SeqCst);
        for gate in self.gates.all() {
            let _ = gate.lock().await;
        }

        let views: Vec<_> = self.lock_views()?.drain().collect();
        for ((operator, target), mode) in views {
            let outcome = {
                let mut manager = self.lock_sessions()?;
                close_view(&mut manager, &operator, &target, mode)
            };
            match outcome {
                Ok(ReleaseOutcome::Closed(teardown)) => {
                    if let Err(e) = self.run_teardown(teardown).await {
                        warn!("Teardown of {} during shutdown failed: {}", target, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Closing {}'s view of {} failed: {}", operator, target, e),
            }
        }

        let leftovers = self.lock_sessions()?.drain();
        for teardown in leftovers {
            if let Err(e) = self.run_teardown(teardown).await {
                warn!("Teardown during shutdown failed: {}", e);
            }
        }
        info!("Remote inventory service stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read-only queries
    // ------------------------------------------------------------------

    pub fn is_open(&self, target: &ParticipantId) -> bool {
        self.lock_sessions()
            .map(|m| m.is_open(target))
            .unwrap_or(false)
    }

    /// Viewers of `target` in attach order; the first is the primary.
    pub fn viewers(&self, target: &ParticipantId) -> Vec<ParticipantId> {
        self.lock_sessions()
            .ok()
            .and_then(|m| m.session(target).map(|s| s.viewers().to_vec()))
            .unwrap_or_default()
    }

    pub fn open_session_count(&self) -> usize {
        self.lock_sessions().map(|m| m.len()).unwrap_or(0)
    }
}
