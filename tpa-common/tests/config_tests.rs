//! Unit tests for configuration loading and root folder resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate TPA_TEST_ROOT_FOLDER are marked with #[serial].

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tpa_common::config::{
    load_toml_config, locate_config_file, resolve_root_folder, write_toml_config, TomlConfig,
};

const ENV_VAR: &str = "TPA_TEST_ROOT_FOLDER";

#[test]
#[serial]
fn test_cli_argument_wins_over_everything() {
    env::set_var(ENV_VAR, "/tmp/tpa-from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/tpa-from-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/tpa-from-cli")), ENV_VAR, &config);
    assert_eq!(resolved, PathBuf::from("/tmp/tpa-from-cli"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_wins_over_toml() {
    env::set_var(ENV_VAR, "/tmp/tpa-from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/tpa-from-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, ENV_VAR, &config);
    assert_eq!(resolved, PathBuf::from("/tmp/tpa-from-env"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_toml_used_when_no_cli_or_env() {
    env::remove_var(ENV_VAR);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/tpa-from-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, ENV_VAR, &config);
    assert_eq!(resolved, PathBuf::from("/tmp/tpa-from-toml"));
}

#[test]
#[serial]
fn test_default_root_folder_is_non_empty() {
    env::remove_var(ENV_VAR);
    let resolved = resolve_root_folder(None, ENV_VAR, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
    assert!(resolved.to_string_lossy().contains("tpa"));
}

#[test]
fn test_write_then_load_preserves_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("tpa-service.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/data/tpa"));
    config.logging.level = "debug".to_string();
    config.server.port = Some(6000);
    config.analysis.job_timeout_seconds = Some(42);
    config.storage.max_upload_bytes = Some(1024);

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_partial_toml_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tpa-service.toml");
    std::fs::write(&path, "[analysis]\njob_timeout_seconds = 10\n").unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.analysis.job_timeout_seconds, Some(10));
    assert_eq!(loaded.logging.level, "info");
    assert!(loaded.root_folder.is_none());
    assert!(loaded.server.cors_origins.is_empty());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tpa-service.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_explicit_config_path_is_used_verbatim() {
    let explicit = Path::new("/somewhere/custom.toml");
    assert_eq!(locate_config_file(Some(explicit)), Some(explicit.to_path_buf()));
}
