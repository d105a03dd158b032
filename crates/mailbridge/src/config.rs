//! Service configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "MAILBRIDGE_CONFIG";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8756;

/// Service configuration, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Address to listen on.
    pub bind_address: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Store snapshot to serve.
    pub store_path: PathBuf,
    /// Root directory for saved attachments.
    pub scratch_dir: PathBuf,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            store_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mailbridge")
                .join("store.json"),
            scratch_dir: std::env::temp_dir().join("mailbridge"),
            log_filter: None,
        }
    }
}

impl Config {
    /// Location of the configuration file.
    #[must_use]
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_ENV).map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mailbridge")
                    .join("config.json")
            },
            PathBuf::from,
        )
    }

    /// Loads the configuration file, falling back to defaults when it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::path()).await
    }

    /// Loads configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Socket address to listen on.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8756");
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"port": 9000, "storePath": "/srv/mail/store.json", "logFilter": "debug"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).await.unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.store_path, PathBuf::from("/srv/mail/store.json"));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{port: }").unwrap();

        let err = Config::load_from(&path).await.unwrap_err();
        assert!(err.to_string().starts_with("parsing config"));
    }
}
