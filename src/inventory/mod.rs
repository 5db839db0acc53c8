//! # Remote Inventory Core
//!
//! - [`adapter`] - per-host-version inventory access and the version registry
//! - [`snapshot`] - the shared, slot-addressable view of one inventory
//! - [`session`] - primary/mirror viewer bookkeeping and exactly-once teardown
//! - [`silent`] - close modes and per-operator silent flags
//! - [`service`] - async facade used by a command front end

pub mod adapter;
pub mod errors;
pub mod service;
pub mod session;
pub mod silent;
pub mod snapshot;
pub mod types;

pub use adapter::registry::VersionAdapterRegistry;
pub use adapter::{CloseCoupling, InventoryAdapter};
pub use errors::InvError;
pub use service::InventoryService;
pub use session::{ContainerSessionManager, ReleaseOutcome, SessionHandle, Teardown};
pub use silent::{CloseMode, ContainerView, SilentToggles};
pub use snapshot::{InventorySnapshot, SnapshotOrigin};
pub use types::{
    Connectivity, HostVersion, InventoryKind, InventoryLayout, ItemStack, ParticipantId,
    ParticipantRef,
};
