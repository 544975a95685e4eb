//! Configuration loading and root folder resolution
//!
//! Tests touching RLP_ROOT_FOLDER / RLP_ROOT are #[serial] so environment
//! changes never race each other.

use rlp_common::config::{
    load_toml_config, resolve_secret, write_toml_config, CompiledDefaults, RootFolderInitializer,
    RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV, ROOT_FOLDER_ENV_LEGACY,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_root_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    env::remove_var(ROOT_FOLDER_ENV_LEGACY);
}

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();
    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert!(defaults.root_folder.to_string_lossy().contains("rlp"));
    assert_eq!(defaults.log_level, "info");
    assert_eq!(defaults.bind_address, "127.0.0.1:5780");
}

#[test]
#[serial]
fn test_env_beats_toml() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV, "/from/env");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };
    let resolved = RootFolderResolver::new("rlp-server").resolve_with(&config);
    assert_eq!(resolved, PathBuf::from("/from/env"));

    clear_root_env();
}

#[test]
#[serial]
fn test_legacy_env_used_when_primary_unset() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV_LEGACY, "/from/legacy");

    let resolved = RootFolderResolver::new("rlp-server").resolve_with(&TomlConfig::default());
    assert_eq!(resolved, PathBuf::from("/from/legacy"));

    clear_root_env();
}

#[test]
#[serial]
fn test_blank_env_ignored() {
    clear_root_env();
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };
    let resolved = RootFolderResolver::new("rlp-server").resolve_with(&config);
    assert_eq!(resolved, PathBuf::from("/from/toml"));

    clear_root_env();
}

#[test]
#[serial]
fn test_falls_back_to_compiled_default() {
    clear_root_env();
    let resolved = RootFolderResolver::new("rlp-server").resolve_with(&TomlConfig::default());
    assert_eq!(resolved, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
fn test_missing_config_file_degrades_to_defaults() {
    let dir = TempDir::new().unwrap();
    let resolver = RootFolderResolver::new("rlp-server")
        .with_config_file(Some(dir.path().join("does-not-exist.toml")));

    let config = resolver.load_config();
    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
    assert!(config.digest.enabled);
}

#[test]
fn test_malformed_config_file_degrades_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    assert!(load_toml_config(&path).is_err());
    let config = RootFolderResolver::new("rlp-server")
        .with_config_file(Some(path))
        .load_config();
    assert!(config.root_folder.is_none());
}

#[test]
fn test_write_then_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("rlp-server.toml");

    let mut config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/label")),
        bind_address: Some("0.0.0.0:8080".to_string()),
        ..Default::default()
    };
    config.integrations.openai_model = Some("gpt-4o".to_string());
    config.digest.narrate = true;
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.root_folder, Some(PathBuf::from("/srv/label")));
    assert_eq!(loaded.bind_address.as_deref(), Some("0.0.0.0:8080"));
    assert_eq!(loaded.integrations.openai_model.as_deref(), Some("gpt-4o"));
    assert!(loaded.digest.narrate);
    assert!(!path.with_extension("toml.tmp").exists());
}

#[test]
#[serial]
fn test_secret_env_overrides_toml() {
    let var = "RLP_TEST_SECRET_VALUE";
    env::remove_var(var);
    let from_toml = "toml-key".to_string();

    assert_eq!(resolve_secret(var, Some(&from_toml)).as_deref(), Some("toml-key"));
    assert_eq!(resolve_secret(var, None), None);
    assert_eq!(resolve_secret(var, Some(&"  ".to_string())), None);

    env::set_var(var, "env-key");
    assert_eq!(resolve_secret(var, Some(&from_toml)).as_deref(), Some("env-key"));
    env::remove_var(var);
}

#[test]
fn test_initializer_creates_root_folder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("label-data");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();
    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("rlp.db"));
    assert!(!initializer.database_exists());
}
