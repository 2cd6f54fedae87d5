use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config file used when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Relay configuration, loaded from a JSON file.
///
/// On disk: `{"bind": ":8080", "use_cert": false, "cert_file": "...", "key_file": "..."}`.
/// Missing fields take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address: `host:port`, `:port` (all interfaces) or a bare port.
    #[serde(rename = "bind")]
    pub bind_address: String,
    /// Serve HTTPS/WSS using `cert_file` and `key_file`.
    #[serde(rename = "use_cert")]
    pub use_tls: bool,
    /// PEM certificate chain.
    pub cert_file: String,
    /// PEM private key.
    pub key_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: ":8080".to_string(),
            use_tls: false,
            cert_file: "fullchain.cer".to_string(),
            key_file: "private.key".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
}

impl Config {
    /// Load the config file at `path`. Never fails.
    ///
    /// If the file cannot be read, the defaults are written to `path` and
    /// used. If it cannot be parsed, the defaults are used and the file is
    /// left alone.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(err @ ConfigError::Read { .. }) => {
                tracing::warn!(error = %err, "config file unavailable, writing defaults");
                let config = Self::default();
                if let Err(err) = config.write(path) {
                    tracing::error!(error = %err, "failed to write default config");
                }
                config
            }
            Err(err) => {
                tracing::error!(error = %err, "invalid config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this config as pretty-printed JSON.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve `bind_address` to a socket address.
    ///
    /// `:port` and a bare port bind `0.0.0.0`, which is IPv4 only. Use
    /// `[::]:port` to listen on IPv6 as well.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let bind = self.bind_address.trim();
        let invalid = || ConfigError::InvalidBind(self.bind_address.clone());

        // ":8080" and "8080" both mean every IPv4 interface.
        let port = bind.strip_prefix(':').unwrap_or(bind);
        if let Ok(port) = port.parse::<u16>() {
            return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        }

        if let Ok(addr) = bind.parse::<SocketAddr>() {
            return Ok(addr);
        }

        bind.to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }
}
