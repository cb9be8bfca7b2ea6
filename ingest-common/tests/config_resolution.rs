//! Exercises the full CLI > env > TOML > default precedence chain against
//! real environment variables, the one layer the in-module unit tests
//! (which pass `None` for the env tier) don't cover end to end.

use ingest_common::config::{env_parsed, resolve_path, resolve_string};
use serial_test::serial;
use std::path::PathBuf;

#[test]
#[serial]
fn env_var_wins_over_toml_and_default() {
    std::env::set_var("INGEST_COMMON_TEST_PATH", "/from/env");
    let toml: toml::Value = toml::from_str("root = \"/from/toml\"").unwrap();

    let resolved = resolve_path(None, "INGEST_COMMON_TEST_PATH", Some(&toml), "root", || {
        PathBuf::from("/default")
    });

    std::env::remove_var("INGEST_COMMON_TEST_PATH");
    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn cli_arg_wins_over_env_var() {
    std::env::set_var("INGEST_COMMON_TEST_STR", "from-env");

    let resolved = resolve_string(Some("from-cli"), "INGEST_COMMON_TEST_STR", None, "k", || {
        "default".to_string()
    });

    std::env::remove_var("INGEST_COMMON_TEST_STR");
    assert_eq!(resolved, "from-cli");
}

#[test]
#[serial]
fn env_parsed_surfaces_unparsable_values_as_config_errors() {
    std::env::set_var("INGEST_COMMON_TEST_NUM", "not-a-number");
    let result: ingest_common::Result<u64> = env_parsed("INGEST_COMMON_TEST_NUM", 42);
    std::env::remove_var("INGEST_COMMON_TEST_NUM");

    assert!(result.is_err());
}

#[test]
#[serial]
fn env_parsed_falls_back_to_default_when_unset() {
    std::env::remove_var("INGEST_COMMON_TEST_NUM_UNSET");
    let result: ingest_common::Result<u64> = env_parsed("INGEST_COMMON_TEST_NUM_UNSET", 42);
    assert_eq!(result.unwrap(), 42);
}
