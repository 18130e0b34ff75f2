//! CLI configuration
//!
//! Loaded from a TOML file, then overridden by `PLUGGET_*` environment
//! variables. The host version is always required and always parsed
//! strictly; an editor build we cannot identify installs nothing.

use plugget_errors::Error;
use plugget_types::HostVersion;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "plugget.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host build identifier, e.g. "5.3" or "5.4-ea"
    pub host_version: String,
    /// Manifest endpoint URL
    pub manifest_url: String,
    /// Live plugin root the editor scans
    #[serde(default = "default_plugin_root")]
    pub plugin_root: PathBuf,
    /// Work area; must share a filesystem with the plugin root
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Manifest freshness window in minutes
    #[serde(default = "default_manifest_max_age")]
    pub manifest_max_age_minutes: i64,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Refresh endpoint of the authentication provider
    pub refresh_url: String,
}

fn default_plugin_root() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".plugget")
}

fn default_manifest_max_age() -> i64 {
    15
}

impl Config {
    /// Load configuration from `path` (or `plugget.toml`), then apply
    /// environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or the
    /// host version does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let text = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(&e, path))?;

        let mut config: Self = toml::from_str(&text)
            .map_err(|e| Error::internal(format!("invalid config {}: {e}", path.display())))?;
        config.merge_env();
        config.host()?;

        Ok(config)
    }

    /// Apply `PLUGGET_*` environment overrides
    fn merge_env(&mut self) {
        if let Ok(value) = std::env::var("PLUGGET_HOST_VERSION") {
            self.host_version = value;
        }
        if let Ok(value) = std::env::var("PLUGGET_MANIFEST_URL") {
            self.manifest_url = value;
        }
        if let Ok(value) = std::env::var("PLUGGET_PLUGIN_ROOT") {
            self.plugin_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("PLUGGET_WORK_DIR") {
            self.work_dir = PathBuf::from(value);
        }
    }

    /// The parsed host version (fail closed on anything unparseable)
    ///
    /// # Errors
    ///
    /// Returns `VersionError::UnknownVersion` for malformed versions.
    pub fn host(&self) -> Result<HostVersion, Error> {
        Ok(self.host_version.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            host_version = "5.3"
            manifest_url = "https://plugins.example.com/manifest.json"

            [auth]
            refresh_url = "https://auth.example.com/refresh"
            "#,
        )
        .unwrap();

        assert_eq!(config.host().unwrap(), "5.3".parse().unwrap());
        assert_eq!(config.plugin_root, PathBuf::from("plugins"));
        assert_eq!(config.manifest_max_age_minutes, 15);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            host_version = "5.3"
            manifest_url = "https://plugins.example.com/manifest.json"
            surprise = true

            [auth]
            refresh_url = "https://auth.example.com/refresh"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn bad_host_version_fails_closed() {
        let config: Config = toml::from_str(
            r#"
            host_version = "latest"
            manifest_url = "https://plugins.example.com/manifest.json"

            [auth]
            refresh_url = "https://auth.example.com/refresh"
            "#,
        )
        .unwrap();
        assert!(config.host().is_err());
    }
}
