//! Configuration loading for the identity synchronization proxy
//!
//! Bootstrap configuration lives in a TOML file with `ldap.search`,
//! `ldap.creds` and `ldap.match` sections. Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `IDSYNC_CONFIG` environment variable
//! 3. `~/.config/idsync/config.toml`
//! 4. `/etc/idsync/config.toml`
//!
//! The directory service password may be overridden with `IDSYNC_LDAP_PASSWORD`.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "IDSYNC_CONFIG";

/// Environment variable overriding `ldap.creds.password`
pub const PASSWORD_ENV_VAR: &str = "IDSYNC_LDAP_PASSWORD";

/// Placeholder substituted with the escaped common name in `ldap.match.filter`
pub const CN_PLACEHOLDER: &str = "{cn}";

/// Proxy configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Path to the SQLite database file (optional, OS default otherwise)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Actor name stamped on every touch
    #[serde(default = "default_actor")]
    pub actor: String,

    pub ldap: LdapConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Directory service settings
#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    pub search: SearchConfig,
    pub creds: CredentialsConfig,
    #[serde(rename = "match")]
    pub matching: MatchConfig,
}

/// Directory server location
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub host: String,
    #[serde(default = "default_ldap_port")]
    pub port: u16,
}

/// Service account used to bind
#[derive(Clone, Deserialize)]
pub struct CredentialsConfig {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Duplicate-detection search
#[derive(Debug, Clone, Deserialize)]
pub struct MatchConfig {
    /// Search base DN
    pub query: String,
    /// Filter template containing `{cn}`
    pub filter: String,
}

impl MatchConfig {
    /// Filter for `cn`, escaped per RFC 4515
    pub fn filter_for(&self, cn: &str) -> String {
        self.filter.replace(CN_PLACEHOLDER, &escape_filter_value(cn))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_actor() -> String {
    "idsync".to_string()
}

fn default_ldap_port() -> u16 {
    389
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ProxyConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace the bind password from `IDSYNC_LDAP_PASSWORD` when set
    pub fn apply_env_overrides(&mut self) {
        let Ok(password) = std::env::var(PASSWORD_ENV_VAR) else {
            return;
        };
        if password.trim().is_empty() {
            return;
        }
        if !self.ldap.creds.password.is_empty() {
            warn!(
                "Directory password found in both TOML and {}. Using environment variable.",
                PASSWORD_ENV_VAR
            );
        } else {
            info!("Directory password loaded from environment variable");
        }
        self.ldap.creds.password = password;
    }

    pub fn validate(&self) -> Result<()> {
        if self.ldap.search.host.trim().is_empty() {
            return Err(Error::Config("ldap.search.host must not be empty".to_string()));
        }
        if self.ldap.creds.user.trim().is_empty() {
            return Err(Error::Config("ldap.creds.user must not be empty".to_string()));
        }
        if !self.ldap.matching.filter.contains(CN_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "ldap.match.filter must contain {}: {}",
                CN_PLACEHOLDER, self.ldap.matching.filter
            )));
        }
        if self.actor.trim().is_empty() {
            return Err(Error::Config("actor must not be empty".to_string()));
        }
        Ok(())
    }

    /// Configured database path or the OS default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Resolve the config file path
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: user config, then system config
    let user_config = dirs::config_dir().map(|d| d.join("idsync").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }
    let system_config = PathBuf::from("/etc/idsync/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config(format!(
        "No config file found. Pass --config, set {}, or create ~/.config/idsync/config.toml",
        CONFIG_ENV_VAR
    )))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("idsync"))
        .unwrap_or_else(|| PathBuf::from("./idsync_data"))
        .join("idsync.db")
}

/// Escape a filter assertion value (RFC 4515 section 3)
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("alice"), "alice");
        assert_eq!(escape_filter_value("a*b"), "a\\2ab");
        assert_eq!(escape_filter_value("(x)\\"), "\\28x\\29\\5c");
        assert_eq!(escape_filter_value("nul\0"), "nul\\00");
    }

    #[test]
    fn test_filter_for_substitutes_cn() {
        let matching = MatchConfig {
            query: "ou=people,dc=example,dc=org".to_string(),
            filter: "(&(objectClass=person)(cn={cn}))".to_string(),
        };
        assert_eq!(matching.filter_for("bob*"), "(&(objectClass=person)(cn=bob\\2a))");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = CredentialsConfig {
            user: "cn=admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("cn=admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_default_database_path_file_name() {
        let path = default_database_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("idsync.db"));
    }
}
