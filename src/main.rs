//! Binary entrypoint for the remoteinv CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `migrate-config` - upgrade a legacy config file in place
//! - `versions` - list supported host versions and their capability gaps
//! - `register <name> [--id <uuid>]` - add a participant to the sled store
//! - `show <participant>` - print a stored participant's inventory
//! - `set-slot <participant> <slot> <item> [--amount N]` - edit one slot
//! - `clear-slot <participant> <slot>` - empty one slot
//!
//! Edits run through the same session manager the host uses, so the stored
//! record is written once, when the console's view is closed.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use remoteinv::config::migration::ConfigMigrator;
use remoteinv::config::Config;
use remoteinv::host::memory::{MemoryWorld, StaticPermissions};
use remoteinv::host::sled_store::SledPlayerData;
use remoteinv::host::{Collaborators, ContainerEvents, HostBindings, Messenger, PlayerDataStore};
use remoteinv::inventory::{
    InventoryService, ItemStack, ParticipantId, ParticipantRef, VersionAdapterRegistry,
};
use remoteinv::metrics;

#[derive(Parser)]
#[command(name = "remoteinv")]
#[command(about = "Open and edit participant inventories stored by a simulation host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Upgrade a legacy configuration file to the current format
    MigrateConfig,
    /// List supported host versions
    Versions,
    /// Register a participant name (and an empty inventory if none is stored)
    Register {
        name: String,
        /// Existing participant id; a new one is generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Print a participant's inventory
    Show { participant: String },
    /// Put an item into a slot
    SetSlot {
        participant: String,
        slot: usize,
        item: String,
        #[arg(short, long, default_value_t = 1)]
        amount: u8,
    },
    /// Empty a slot
    ClearSlot { participant: String, slot: usize },
}

/// Console operator output goes straight to stdout.
struct ConsoleMessenger;

impl Messenger for ConsoleMessenger {
    fn send_message(&self, _operator: &ParticipantId, text: &str) {
        println!("{}", text);
    }
}

/// Stored participants are offline; open/close events only reach the log.
struct LoggedEvents;

impl ContainerEvents for LoggedEvents {
    fn viewer_opened(&self, owner: &ParticipantId, viewer: &ParticipantId) {
        debug!("{} opened inventory of {}", viewer, owner);
    }

    fn viewer_closed(&self, owner: &ParticipantId, viewer: &ParticipantId) {
        debug!("{} closed inventory of {}", viewer, owner);
    }
}

fn console() -> ParticipantRef {
    ParticipantRef::online(ParticipantId::console(), "CONSOLE")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before any config exists
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Created default configuration at {}", cli.config);
            println!("Edit [host] version to match the running host, then use 'remoteinv show <name>'.");
        }
        Commands::MigrateConfig => {
            let store = open_store(&pre_config)?;
            let report = ConfigMigrator::new(&cli.config, store)
                .check_for_updates()
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Versions => {
            let registry = VersionAdapterRegistry::with_builtin();
            let gaps = registry.capability_gaps();
            for version in registry.supported_versions() {
                let note = if gaps.contains(&version) {
                    " (silent close unsupported)"
                } else {
                    ""
                };
                println!("{}{}", version, note);
            }
        }
        Commands::Register { name, id } => {
            let config = require_config(pre_config)?;
            let store = open_store(&Some(config.clone()))?;
            let id = match id {
                Some(text) => {
                    ParticipantId::parse(&text).ok_or_else(|| anyhow!("invalid id: {}", text))?
                }
                None => ParticipantId::new_random(),
            };
            let adapter = VersionAdapterRegistry::with_builtin()
                .resolve(&config.host_version(), bindings(store.clone()))?;
            store.register_profile(id, &name)?;
            if store.load(&id)?.is_none() {
                store.store(&id, &adapter.empty_record()?)?;
            }
            println!("Registered {} as {}", name, id);
        }
        Commands::Show { participant } => {
            let (service, _) = start_service(&cli.config, &pre_config).await?;
            let operator = console();
            let view = service.open_inventory(&operator, &participant).await?;
            let layout = view.handle().snapshot().layout();
            println!("Inventory of {}:", view.handle().target());
            for (slot, item) in view.handle().contents().into_iter().enumerate() {
                let Some(item) = item else { continue };
                let section = layout
                    .locate(slot)
                    .map(|(kind, index)| format!("{} {}", kind.label(), index))
                    .unwrap_or_default();
                println!("  [{:>2}] {:<10} {}", slot, section, item);
            }
            service
                .close_inventory(&operator.id, &view.handle().target().id)
                .await?;
            service.shutdown().await?;
        }
        Commands::SetSlot {
            participant,
            slot,
            item,
            amount,
        } => {
            let stack = (amount > 0).then(|| ItemStack::new(&item, amount));
            edit_slot(&cli.config, &pre_config, &participant, slot, stack).await?;
        }
        Commands::ClearSlot { participant, slot } => {
            edit_slot(&cli.config, &pre_config, &participant, slot, None).await?;
        }
    }

    debug!(
        "metrics: {}",
        serde_json::to_string(&metrics::snapshot()).unwrap_or_default()
    );
    Ok(())
}

fn require_config(config: Option<Config>) -> Result<Config> {
    config.ok_or_else(|| anyhow!("No usable configuration found. Run 'remoteinv init' first."))
}

fn open_store(config: &Option<Config>) -> Result<Arc<SledPlayerData>> {
    let data_dir = config
        .as_ref()
        .map(|c| c.host.data_dir.clone())
        .unwrap_or_else(|| Config::default().host.data_dir);
    Ok(Arc::new(SledPlayerData::open(&data_dir)?))
}

/// The CLI has no running world; every participant is read from the store.
fn bindings(store: Arc<SledPlayerData>) -> HostBindings {
    HostBindings {
        world: Arc::new(MemoryWorld::new()),
        data: store,
        events: Arc::new(LoggedEvents),
    }
}

async fn start_service(
    config_path: &str,
    pre_config: &Option<Config>,
) -> Result<(InventoryService, Arc<SledPlayerData>)> {
    let store = open_store(pre_config)?;
    let registry = VersionAdapterRegistry::with_builtin();
    let host = bindings(store.clone());
    let collaborators = Collaborators {
        permissions: Arc::new(StaticPermissions::allow_all()),
        directory: store.clone(),
        messenger: Arc::new(ConsoleMessenger),
    };
    let (service, _config) =
        InventoryService::bootstrap(config_path, &registry, host, collaborators).await?;
    Ok((service, store))
}

async fn edit_slot(
    config_path: &str,
    pre_config: &Option<Config>,
    participant: &str,
    slot: usize,
    item: Option<ItemStack>,
) -> Result<()> {
    let (service, _store) = start_service(config_path, pre_config).await?;
    let operator = console();
    let view = service.open_inventory(&operator, participant).await?;
    let target = view.handle().target().clone();
    let written = view.handle().set(slot, item);
    // Close even when the write failed so nothing is left open.
    service.close_inventory(&operator.id, &target.id).await?;
    service.shutdown().await?;
    let previous = written?;
    info!("Updated slot {} of {}", slot, target);
    match previous {
        Some(old) => println!("Slot {} of {} updated (was {})", slot, target.name, old),
        None => println!("Slot {} of {} updated", slot, target.name),
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.clone())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Tee to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
