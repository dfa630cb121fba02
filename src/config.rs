//! Webhook configuration file.
//!
//! YAML (or JSON) with the listener settings and the injection policy:
//!
//! ```yaml
//! http:
//!   listenAddress: ":8443"
//!   tls:
//!     certfile: /etc/webhook/certs/tls.crt
//!     keyfile: /etc/webhook/certs/tls.key
//! volumes:
//!   - name: etc-ssl-certs
//!     hostPath:
//!       path: /etc/ssl/certs
//!       type: Directory
//! volumeMounts:
//!   - name: etc-ssl-certs
//!     mountPath: /etc/ssl/certs
//!     readOnly: true
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::webhooks::{InjectionPolicy, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH};

/// Listen address used when the file does not set one
pub const DEFAULT_LISTEN_ADDRESS: &str = ":8080";

/// Errors raised while loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid listen address {0:?}")]
    ListenAddress(String),
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(flatten)]
    pub policy: InjectionPolicy,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TlsConfig {
    #[serde(rename = "certfile")]
    pub cert_file: PathBuf,
    #[serde(rename = "keyfile")]
    pub key_file: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_file: PathBuf::from(WEBHOOK_CERT_PATH),
            key_file: PathBuf::from(WEBHOOK_KEY_PATH),
        }
    }
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

impl Config {
    /// Read and parse the config file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        config.listen_addr()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Resolved listen address
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_listen_address(&self.http.listen_address)
    }
}

/// Parse a listen address. A bare `:port` binds all interfaces.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr, ConfigError> {
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::ListenAddress(addr.to_string()))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    addr.parse()
        .map_err(|_| ConfigError::ListenAddress(addr.to_string()))
}
