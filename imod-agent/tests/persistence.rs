//! Startup artifact lifecycle: write, rewrite in place, remove.

use imod::config::{self, ImodConfig, ImodPaths, OverrideEntry};
use imod::persist::{self, PersistOutcome};
use std::fs;
use tempfile::tempdir;

fn tuned() -> ImodConfig {
    let mut cfg = ImodConfig { global_interval: 0x3E8, ..ImodConfig::default() };
    cfg.overrides.push(OverrideEntry { enabled: Some(false), ..OverrideEntry::new("DEV_A36D") });
    cfg.overrides.push(OverrideEntry { interval: Some(0x10), ..OverrideEntry::new("VEN_1022") });
    cfg
}

#[test]
fn missing_script_loads_defaults() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());

    let cfg = persist::load(&paths);
    assert_eq!(cfg, ImodConfig::default());
    assert!(!cfg.has_persisted_script);
    assert!(!cfg.has_active_config());
}

#[test]
fn non_default_config_is_written_and_reloads() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = tuned();

    assert_eq!(persist::persist(&mut cfg, &paths).unwrap(), PersistOutcome::Written);
    assert!(cfg.has_persisted_script);
    assert!(paths.startup_script.is_file());

    let bytes = fs::read(&paths.startup_script).unwrap();
    assert!(bytes.is_ascii());

    let loaded = persist::load(&paths);
    assert_eq!(loaded.global_interval, 0x3E8);
    assert_eq!(loaded.overrides, cfg.overrides);
    assert!(loaded.has_persisted_script);
}

#[test]
fn rewriting_the_same_config_is_byte_stable() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = tuned();

    persist::persist(&mut cfg, &paths).unwrap();
    let first = fs::read(&paths.startup_script).unwrap();

    let mut reloaded = persist::load(&paths);
    persist::persist(&mut reloaded, &paths).unwrap();
    assert_eq!(fs::read(&paths.startup_script).unwrap(), first);
}

#[test]
fn user_edits_outside_the_block_survive() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = tuned();
    persist::persist(&mut cfg, &paths).unwrap();

    let original = fs::read_to_string(&paths.startup_script).unwrap();
    let edited = format!("# pinned by admin\r\n{original}Write-Host 'done'\r\n");
    fs::write(&paths.startup_script, &edited).unwrap();

    cfg.global_interval = 0x7D0;
    persist::persist(&mut cfg, &paths).unwrap();

    let text = fs::read_to_string(&paths.startup_script).unwrap();
    assert!(text.starts_with("# pinned by admin\r\n"));
    assert!(text.ends_with("Write-Host 'done'\r\n"));
    assert!(text.contains("$globalInterval = 0x7D0\r\n"));
    assert!(!text.contains("$globalInterval = 0x3E8"));
    assert_eq!(config::load(&paths.startup_script).global_interval, 0x7D0);
}

#[test]
fn foreign_file_is_replaced_by_the_template() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    fs::create_dir_all(paths.startup_script.parent().unwrap()).unwrap();
    fs::write(&paths.startup_script, "Write-Host 'unrelated'\r\n").unwrap();

    persist::persist(&mut tuned(), &paths).unwrap();
    let text = fs::read_to_string(&paths.startup_script).unwrap();
    assert!(!text.contains("unrelated"));
    assert!(text.contains("$imodScriptVersion = 11"));
}

#[test]
fn defaults_remove_every_artifact() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    persist::persist(&mut tuned(), &paths).unwrap();
    fs::create_dir_all(paths.driver_image.parent().unwrap()).unwrap();
    fs::write(&paths.driver_image, b"MZ").unwrap();
    fs::write(&paths.legacy_driver_image, b"MZ").unwrap();

    let mut cfg = persist::load(&paths);
    cfg.reset();
    assert_eq!(persist::persist(&mut cfg, &paths).unwrap(), PersistOutcome::Removed);

    assert!(!cfg.has_persisted_script);
    assert!(!paths.startup_script.exists());
    assert!(!paths.driver_image.exists());
    assert!(!paths.legacy_driver_image.exists());
}

#[test]
fn removing_nothing_is_fine() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = ImodConfig::default();
    assert_eq!(persist::persist(&mut cfg, &paths).unwrap(), PersistOutcome::Removed);
}

#[test]
fn blank_overrides_are_dropped_before_writing() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = tuned();
    cfg.overrides.push(OverrideEntry { interval: Some(1), ..OverrideEntry::new("   ") });

    persist::persist(&mut cfg, &paths).unwrap();
    assert_eq!(cfg.overrides.len(), 2);
    assert_eq!(persist::load(&paths).overrides.len(), 2);
}

#[test]
fn bom_and_foreign_bytes_survive_a_rewrite() {
    let dir = tempdir().unwrap();
    let paths = ImodPaths::rooted_at(dir.path());
    let mut cfg = tuned();
    persist::persist(&mut cfg, &paths).unwrap();

    let mut with_bom = vec![0xEF, 0xBB, 0xBF];
    with_bom.extend(fs::read(&paths.startup_script).unwrap());
    with_bom.extend_from_slice(b"# caf\xC3\xA9\r\n");
    fs::write(&paths.startup_script, &with_bom).unwrap();

    cfg.global_interval = 0x7D0;
    persist::persist(&mut cfg, &paths).unwrap();

    let bytes = fs::read(&paths.startup_script).unwrap();
    assert_eq!(&bytes[..9], b"\xEF\xBB\xBFparam(");
    assert!(bytes.ends_with(b"# caf\xC3\xA9\r\n"));
    assert_eq!(persist::load(&paths).global_interval, 0x7D0);

    // Unchanged config leaves the file byte-identical.
    let mut again = persist::load(&paths);
    persist::persist(&mut again, &paths).unwrap();
    assert_eq!(fs::read(&paths.startup_script).unwrap(), bytes);
}
