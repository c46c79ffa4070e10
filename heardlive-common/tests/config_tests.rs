//! Configuration resolution and graceful degradation tests
//!
//! Tests that touch HEARDLIVE_* environment variables are marked #[serial]
//! so they never run in parallel with each other.

use heardlive_common::config::{
    load_config, read_toml_config, resolve_config_path, BackendKind, CONFIG_ENV_VAR,
    SPOTIFY_CLIENT_ID_ENV, SUPABASE_ANON_KEY_ENV, SUPABASE_URL_ENV,
};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(SUPABASE_URL_ENV);
    env::remove_var(SUPABASE_ANON_KEY_ENV);
    env::remove_var(SPOTIFY_CLIENT_ID_ENV);
}

#[test]
#[serial]
fn test_cli_path_wins_over_env_var() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let cli_path = dir.path().join("cli.toml");
    env::set_var(CONFIG_ENV_VAR, dir.path().join("env.toml"));

    assert_eq!(resolve_config_path(Some(&cli_path)), Some(cli_path.clone()));

    clear_env();
}

#[test]
#[serial]
fn test_env_var_path_used_without_cli_arg() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let env_path = dir.path().join("env.toml");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    assert_eq!(resolve_config_path(None), Some(env_path));

    clear_env();
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = load_config(Some(&missing)).expect("missing config must not be fatal");
    assert_eq!(config.backend, BackendKind::Supabase);
    assert_eq!(config.search.debounce_ms, 500);
}

#[test]
#[serial]
fn test_file_values_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
bind_address = "0.0.0.0:8080"
backend = "supabase"

[supabase]
url = "https://project.supabase.co"
anon_key = "anon-from-file"

[spotify]
client_id = "id-from-file"
client_secret = "secret-from-file"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.bind_address(), "0.0.0.0:8080");
    assert_eq!(config.supabase.anon_key.as_deref(), Some("anon-from-file"));
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_env_credentials_override_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[supabase]
url = "https://file.supabase.co"
anon_key = "anon-from-file"
"#,
    )
    .unwrap();

    env::set_var(SUPABASE_ANON_KEY_ENV, "anon-from-env");
    env::set_var(SPOTIFY_CLIENT_ID_ENV, "   ");

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.supabase.anon_key.as_deref(), Some("anon-from-env"));
    assert_eq!(config.supabase.url.as_deref(), Some("https://file.supabase.co"));
    // Whitespace-only values are ignored
    assert_eq!(config.spotify.client_id, None);

    clear_env();
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "backend = [not valid").unwrap();

    let err = read_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_unknown_backend_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad-backend.toml");
    fs::write(&path, "backend = \"firebase\"").unwrap();

    assert!(read_toml_config(&path).is_err());
}
