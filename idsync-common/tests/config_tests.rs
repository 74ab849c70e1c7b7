//! Tests for proxy configuration loading
//!
//! Uses serial_test: tests that manipulate IDSYNC_CONFIG or
//! IDSYNC_LDAP_PASSWORD are marked #[serial] so they never race.

use idsync_common::config::{resolve_config_path, ProxyConfig, CONFIG_ENV_VAR, PASSWORD_ENV_VAR};
use idsync_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

const FULL_CONFIG: &str = r#"
database_path = "/tmp/idsync-config-test.db"
actor = "sync-bot"

[ldap.search]
host = "ldap.example.org"
port = 636

[ldap.creds]
user = "cn=admin,dc=example,dc=org"
password = "from-toml"

[ldap.match]
query = "ou=people,dc=example,dc=org"
filter = "(cn={cn})"

[logging]
level = "debug"
"#;

const MINIMAL_CONFIG: &str = r#"
[ldap.search]
host = "ldap.example.org"

[ldap.creds]
user = "cn=admin,dc=example,dc=org"

[ldap.match]
query = "ou=people,dc=example,dc=org"
filter = "(uid={cn})"
"#;

#[test]
#[serial]
fn test_full_config_parses() {
    env::remove_var(PASSWORD_ENV_VAR);

    let config = ProxyConfig::from_toml_str(FULL_CONFIG).unwrap();

    assert_eq!(config.actor, "sync-bot");
    assert_eq!(config.ldap.search.host, "ldap.example.org");
    assert_eq!(config.ldap.search.port, 636);
    assert_eq!(config.ldap.creds.password, "from-toml");
    assert_eq!(config.ldap.matching.query, "ou=people,dc=example,dc=org");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.database_path(), PathBuf::from("/tmp/idsync-config-test.db"));
}

#[test]
#[serial]
fn test_minimal_config_uses_defaults() {
    env::remove_var(PASSWORD_ENV_VAR);

    let config = ProxyConfig::from_toml_str(MINIMAL_CONFIG).unwrap();

    assert_eq!(config.actor, "idsync");
    assert_eq!(config.ldap.search.port, 389);
    assert_eq!(config.ldap.creds.password, "");
    assert_eq!(config.logging.level, "info");
    assert!(config.database_path.is_none());
    assert!(config.database_path().ends_with("idsync.db"));
}

#[test]
#[serial]
fn test_password_env_override() {
    env::set_var(PASSWORD_ENV_VAR, "from-env");

    let config = ProxyConfig::from_toml_str(FULL_CONFIG).unwrap();
    assert_eq!(config.ldap.creds.password, "from-env");

    env::remove_var(PASSWORD_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_password_env_is_ignored() {
    env::set_var(PASSWORD_ENV_VAR, "   ");

    let config = ProxyConfig::from_toml_str(FULL_CONFIG).unwrap();
    assert_eq!(config.ldap.creds.password, "from-toml");

    env::remove_var(PASSWORD_ENV_VAR);
}

#[test]
#[serial]
fn test_filter_without_placeholder_is_rejected() {
    env::remove_var(PASSWORD_ENV_VAR);

    let broken = MINIMAL_CONFIG.replace("(uid={cn})", "(uid=*)");
    let result = ProxyConfig::from_toml_str(&broken);
    assert!(matches!(result, Err(Error::Config(_))), "got {:?}", result);
}

#[test]
#[serial]
fn test_missing_section_is_config_error() {
    env::remove_var(PASSWORD_ENV_VAR);

    let result = ProxyConfig::from_toml_str("[ldap.search]\nhost = \"x\"\n");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_load_from_file() {
    env::remove_var(PASSWORD_ENV_VAR);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = ProxyConfig::load(&path).unwrap();
    assert_eq!(config.actor, "sync-bot");

    let missing = ProxyConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");

    let resolved = resolve_config_path(Some(Path::new("/from/cli.toml"))).unwrap();
    assert_eq!(resolved, PathBuf::from("/from/cli.toml"));

    let resolved = resolve_config_path(None).unwrap();
    assert_eq!(resolved, PathBuf::from("/from/env.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}
