//! Configuration loading.
//!
//! Configuration files are INI-style: `[section]` headers, `key = value`
//! pairs, `#`/`;` comments, optional single or double quotes around values,
//! and comma-separated lists. Repeating a key appends to the existing value
//! with a comma, so list keys may be spread over several lines. Malformed
//! numeric and boolean values fall back to their defaults.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::{
    DEFAULT_BUFFER_SIZE, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT, DEFAULT_SOCKET_TIMEOUT,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Parsed `[section] key = value` data.
#[derive(Debug, Default, Clone)]
pub struct ConfigParser {
    sections: HashMap<String, HashMap<String, String>>,
}

impl ConfigParser {
    /// Load and parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse config data from a string.
    pub fn parse(content: &str) -> Self {
        let mut parser = Self::default();
        let mut current_section = String::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let mut value = value.trim().to_string();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }

            let section = parser.sections.entry(current_section.clone()).or_default();
            match section.get_mut(&key) {
                Some(existing) if !existing.is_empty() => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                _ => {
                    section.insert(key, value);
                }
            }
        }

        parser
    }

    /// String value, or `default` when absent.
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Integer value, or `default` when absent or malformed.
    pub fn get_u64(&self, section: &str, key: &str, default: u64) -> u64 {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean value (`true`/`yes`/`1`/`on`), or `default` when absent or
    /// malformed.
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.sections.get(section).and_then(|s| s.get(key)) {
            Some(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            ),
            None => default,
        }
    }

    /// Comma-separated list, or `default` when absent.
    pub fn get_list(&self, section: &str, key: &str, default: &[&str]) -> Vec<String> {
        match self.sections.get(section).and_then(|s| s.get(key)) {
            Some(value) if !value.is_empty() => value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Server-side configuration snapshot, read-only after startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds.
    pub listen_address: String,
    /// Port the listener binds.
    pub listen_port: u16,
    /// Listen backlog.
    pub max_connections: usize,
    /// Socket read/write timeout.
    pub timeout: Duration,
    /// Shared secret key, 64 hex characters with optional `0x` prefix.
    pub secret_key: String,
    /// Optional hex override of the key-derivation salt.
    pub key_salt: String,
    /// Whether clients must hold the shared key.
    pub require_auth: bool,
    /// Per-chunk buffer size.
    pub buffer_size: usize,
    /// Base directories clients may write beneath.
    pub allowed_paths: Vec<String>,
    /// Log level name for the subscriber.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: DEFAULT_SOCKET_TIMEOUT,
            secret_key: String::new(),
            key_salt: String::new(),
            require_auth: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            allowed_paths: vec!["/var/lib/net_copy".to_string()],
            log_level: "INFO".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from an INI file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let parser = ConfigParser::load_from_file(path)?;
        let defaults = Self::default();

        Ok(Self {
            listen_address: parser.get_string("network", "listen_address", &defaults.listen_address),
            listen_port: parser.get_u64("network", "listen_port", defaults.listen_port as u64)
                as u16,
            max_connections: parser.get_u64(
                "network",
                "max_connections",
                defaults.max_connections as u64,
            ) as usize,
            timeout: Duration::from_secs(parser.get_u64("network", "timeout", 30)),
            secret_key: parser.get_string("security", "secret_key", ""),
            key_salt: parser.get_string("security", "key_salt", ""),
            require_auth: parser.get_bool("security", "require_auth", defaults.require_auth),
            buffer_size: parser.get_u64("performance", "buffer_size", defaults.buffer_size as u64)
                as usize,
            allowed_paths: parser.get_list("paths", "allowed_paths", &["/var/lib/net_copy"]),
            log_level: parser.get_string("logging", "log_level", &defaults.log_level),
        })
    }
}

/// Client-side configuration snapshot.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Shared secret key, 64 hex characters with optional `0x` prefix.
    pub secret_key: String,
    /// Optional hex override of the key-derivation salt.
    pub key_salt: String,
    /// Per-chunk buffer size.
    pub buffer_size: usize,
    /// Bandwidth cap as a percentage; 100 disables pacing.
    pub max_bandwidth_percent: u32,
    /// Socket read/write timeout.
    pub timeout: Duration,
    /// Whether directory transfers materialize empty directories.
    pub create_empty_directories: bool,
    /// Log level name for the subscriber.
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            key_salt: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_bandwidth_percent: 40,
            timeout: DEFAULT_SOCKET_TIMEOUT,
            create_empty_directories: true,
            log_level: "INFO".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load client configuration from an INI file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let parser = ConfigParser::load_from_file(path)?;
        let defaults = Self::default();

        Ok(Self {
            secret_key: parser.get_string("security", "secret_key", ""),
            key_salt: parser.get_string("security", "key_salt", ""),
            buffer_size: parser.get_u64("performance", "buffer_size", defaults.buffer_size as u64)
                as usize,
            max_bandwidth_percent: parser.get_u64(
                "performance",
                "max_bandwidth_percent",
                defaults.max_bandwidth_percent as u64,
            ) as u32,
            timeout: Duration::from_secs(parser.get_u64("connection", "timeout", 30)),
            create_empty_directories: parser.get_bool(
                "transfer",
                "create_empty_directories",
                defaults.create_empty_directories,
            ),
            log_level: parser.get_string("logging", "log_level", &defaults.log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# server settings
[network]
listen_address = 127.0.0.1
listen_port = 9400
timeout = 5

[security]
secret_key = "0xdeadbeef"
require_auth = yes

[paths]
allowed_paths = /tmp/out, /srv/drop
allowed_paths = /data/extra

; trailing comment
"#;

    #[test]
    fn test_sections_and_values() {
        let parser = ConfigParser::parse(SAMPLE);
        assert_eq!(parser.get_string("network", "listen_address", ""), "127.0.0.1");
        assert_eq!(parser.get_u64("network", "listen_port", 0), 9400);
        // quotes stripped
        assert_eq!(parser.get_string("security", "secret_key", ""), "0xdeadbeef");
        assert!(parser.get_bool("security", "require_auth", false));
    }

    #[test]
    fn test_repeated_key_appends() {
        let parser = ConfigParser::parse(SAMPLE);
        assert_eq!(
            parser.get_list("paths", "allowed_paths", &[]),
            ["/tmp/out", "/srv/drop", "/data/extra"]
        );
    }

    #[test]
    fn test_defaults_for_missing_keys() {
        let parser = ConfigParser::parse(SAMPLE);
        assert_eq!(parser.get_u64("performance", "buffer_size", 65536), 65536);
        assert!(parser.get_bool("transfer", "create_empty_directories", true));
        assert_eq!(parser.get_list("paths", "other", &["/fallback"]), ["/fallback"]);
    }

    #[test]
    fn test_malformed_number_falls_back() {
        let parser = ConfigParser::parse("[network]\nlisten_port = lots\n");
        assert_eq!(parser.get_u64("network", "listen_port", 1245), 1245);
    }

    #[test]
    fn test_bool_spellings() {
        let parser = ConfigParser::parse("[a]\nx = on\ny = off\nz = TRUE\n");
        assert!(parser.get_bool("a", "x", false));
        assert!(!parser.get_bool("a", "y", true));
        assert!(parser.get_bool("a", "z", false));
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_port, 1245);
        assert!(config.require_auth);
        assert_eq!(config.allowed_paths, ["/var/lib/net_copy"]);
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.buffer_size, 65536);
        assert_eq!(config.max_bandwidth_percent, 40);
        assert!(config.create_empty_directories);
    }
}
