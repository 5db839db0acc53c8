mod common;

use std::sync::Arc;

use common::TestHost;
use remoteinv::config::migration::{ConfigMigrator, CURRENT_CONFIG_VERSION};
use remoteinv::config::Config;
use remoteinv::host::memory::MemoryDirectory;
use remoteinv::inventory::{InventoryService, ParticipantId, ParticipantRef, VersionAdapterRegistry};

const LEGACY: &str = r#"
ItemOpenInvItemID = 369
NotifySilentChest = false
NotifyAnyChest = true

[SilentChest.Notch]
toggle = true

[SilentChest.jeb_]
toggle = false

[SilentChest.Forgotten]
toggle = true

[AnyChest.Notch]
toggle = true
"#;

#[tokio::test]
async fn legacy_file_is_backed_up_and_converted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, LEGACY).unwrap();

    let directory = Arc::new(MemoryDirectory::new());
    let notch = ParticipantRef::offline(ParticipantId::new_random(), "Notch");
    let jeb = ParticipantRef::offline(ParticipantId::new_random(), "jeb_");
    directory.add(notch.clone());
    directory.add(jeb.clone());

    let report = ConfigMigrator::new(&path, directory)
        .check_for_updates()
        .await
        .expect("migration");
    assert!(report.migrated);
    assert_eq!(report.from_version, 1);
    assert_eq!(report.to_version, CURRENT_CONFIG_VERSION);

    let backup = tmp.path().join("config_old.toml");
    assert_eq!(report.backup.as_deref(), Some(backup.as_path()));
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), LEGACY);

    let silent = report
        .sections
        .iter()
        .find(|s| s.section == "SilentChest")
        .expect("silent section");
    assert_eq!((silent.converted, silent.total), (2, 3));
    assert!(report.sections.iter().all(|s| s.section != "ItemOpenInv"));

    let config = Config::load(path.to_str().unwrap()).await.expect("new config");
    assert_eq!(config.config_version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.items.open_inv, "BLAZE_ROD");
    assert!(!config.notify.silent_chest);
    assert!(config.notify.any_chest);
    let toggles = config.silent_toggles();
    assert_eq!(toggles.get(&notch.id), Some(&true));
    assert_eq!(toggles.get(&jeb.id), Some(&false));
    assert_eq!(toggles.len(), 2);
    assert_eq!(
        config.toggles.any_chest.get(&notch.id.to_string()),
        Some(&true)
    );
}

#[tokio::test]
async fn current_file_is_left_alone() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    let path_str = path.to_str().unwrap().to_string();
    Config::create_default(&path_str).await.unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let report = ConfigMigrator::new(&path, Arc::new(MemoryDirectory::new()))
        .check_for_updates()
        .await
        .unwrap();
    assert!(!report.migrated);
    assert!(report.backup.is_none());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    assert!(!tmp.path().join("config_old.toml").exists());
}

#[tokio::test]
async fn bootstrap_migrates_then_seeds_silent_flags() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, LEGACY).unwrap();

    let host = TestHost::new();
    let notch = host.operator("Notch");
    let registry = VersionAdapterRegistry::with_builtin();
    let (service, config) = InventoryService::bootstrap(
        path.to_str().unwrap(),
        &registry,
        host.bindings(),
        host.collaborators(),
    )
    .await
    .expect("bootstrap");

    assert_eq!(config.host.version, "v1_9_R1");
    assert!(service.is_silent(&notch.id));
    assert_eq!(registry.active().unwrap().version().as_str(), "v1_9_R1");
}

#[tokio::test]
async fn unsupported_host_version_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    let path_str = path.to_str().unwrap().to_string();
    let mut config = Config::default();
    config.host.version = "v1_7_R4".to_string();
    config.save(&path_str).await.unwrap();

    let host = TestHost::new();
    let registry = VersionAdapterRegistry::with_builtin();
    let err = InventoryService::bootstrap(&path_str, &registry, host.bindings(), host.collaborators())
        .await
        .err()
        .expect("bootstrap must fail");
    assert!(err.to_string().contains("unsupported host version"), "got {}", err);
    assert!(registry.active().is_none());
}

#[tokio::test]
async fn unversioned_file_keeps_its_current_tables() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    let data_dir = tmp.path().join("data");
    let log_file = tmp.path().join("remoteinv.log");
    let content = format!(
        r#"
NotifyAnyChest = false

[host]
version = "v1_8_R3"
data_dir = '{}'

[logging]
level = "debug"
file = '{}'

[items]
open_inv = "BONE"
"#,
        data_dir.display(),
        log_file.display()
    );
    std::fs::write(&path, &content).unwrap();

    let report = ConfigMigrator::new(&path, Arc::new(MemoryDirectory::new()))
        .check_for_updates()
        .await
        .expect("migration");
    assert!(report.migrated);

    let config = Config::load(path.to_str().unwrap()).await.expect("new config");
    assert_eq!(config.config_version, CURRENT_CONFIG_VERSION);
    assert_eq!(config.host.version, "v1_8_R3");
    assert_eq!(config.host.data_dir, data_dir.display().to_string());
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, Some(log_file.display().to_string()));
    assert_eq!(config.items.open_inv, "BONE");
    assert!(!config.notify.any_chest);
    assert!(config.notify.silent_chest);
}

#[tokio::test]
async fn malformed_table_aborts_before_the_backup() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");
    let content = "[host]\nversion = 18\n";
    std::fs::write(&path, content).unwrap();

    let err = ConfigMigrator::new(&path, Arc::new(MemoryDirectory::new()))
        .check_for_updates()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("[host]"), "got {}", err);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    assert!(!tmp.path().join("config_old.toml").exists());
}
