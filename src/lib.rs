//! # remoteinv - Remote Inventory Access for Simulation Hosts
//!
//! remoteinv lets an authorized operator open another participant's inventory,
//! whether that participant is online or offline, and edit it as if it were a
//! chest. It runs inside a long-lived simulation host that changes its internal
//! inventory layout between releases, so every host release gets its own
//! adapter behind one trait.
//!
//! ## Features
//!
//! - **Version Adapters**: One [`inventory::InventoryAdapter`] per host release, chosen once at startup.
//! - **Shared Sessions**: A second operator opening the same target mirrors the first one's snapshot instead of loading a stale copy.
//! - **Exactly-Once Teardown**: Offline inventories are flushed and closed once, when the last viewer leaves.
//! - **Silent Mode**: Operators can close a container without the owner being told, on releases that allow it.
//! - **Config Migration**: Legacy name-keyed config files are upgraded to id-keyed ones at startup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remoteinv::host::memory::*;
//! use remoteinv::host::{Collaborators, HostBindings};
//! use remoteinv::inventory::{InventoryService, VersionAdapterRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = VersionAdapterRegistry::with_builtin();
//!     let host = HostBindings {
//!         world: Arc::new(MemoryWorld::new()),
//!         data: Arc::new(MemoryPlayerData::new()),
//!         events: Arc::new(RecordingEvents::new()),
//!     };
//!     let collaborators = Collaborators {
//!         permissions: Arc::new(StaticPermissions::allow_all()),
//!         directory: Arc::new(MemoryDirectory::new()),
//!         messenger: Arc::new(CollectingMessenger::new()),
//!     };
//!     let (service, _config) =
//!         InventoryService::bootstrap("config.toml", &registry, host, collaborators).await?;
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`inventory`] - adapters, snapshots, sessions, silent mode and the service facade
//! - [`host`] - seams to the simulation host, with sled and in-memory implementations
//! - [`config`] - TOML configuration and legacy config migration
//! - [`metrics`] - process-wide session counters

pub mod config;
pub mod host;
pub mod inventory;
pub mod metrics;
