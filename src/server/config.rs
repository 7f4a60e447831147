//! Server configuration.
//!
//! [`Options`] is the user-facing shape read from a JSON file; every field is
//! optional. [`ServerConfig`] is the validated, immutable form the server runs
//! with.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::server::error::Error;
use crate::server::proxy::ProxyRule;

/// Whether directories without an index file get a generated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Autoindex {
    On,
    Off,
}

/// Options as written in a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub autoindex: Option<Autoindex>,
    pub index: Option<Vec<String>>,
    pub error_page: Option<PathBuf>,
    /// Path prefix to upstream origin. Object key order is match priority.
    pub proxy: Option<Map<String, Value>>,
    pub https: Option<bool>,
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
}

impl Options {
    /// Parse options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON options file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }
}

/// Locations of the PEM-encoded TLS credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub key: PathBuf,
    pub cert: PathBuf,
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub host: IpAddr,
    /// The port to bind to.
    pub port: u16,
    /// Directory under which request paths are resolved.
    pub root: PathBuf,
    /// Generate listings for directories without an index file.
    pub autoindex: bool,
    /// Index file names, first match wins.
    pub index: Vec<String>,
    /// Custom 404 page, relative to the working directory.
    pub error_page: Option<PathBuf>,
    /// Proxy rules in declaration order.
    pub proxy: Vec<ProxyRule>,
    /// TLS credentials; `None` serves plain HTTP.
    pub tls: Option<TlsSettings>,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size, which also bounds the size of a request head.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            root: PathBuf::from("."),
            autoindex: true,
            index: vec!["index.html".to_string(), "index.htm".to_string()],
            error_page: None,
            proxy: Vec::new(),
            tls: None,
            max_connections: 1024,
            read_buffer_size: 8192,
        }
    }
}

impl ServerConfig {
    /// Build a validated configuration, falling back to defaults for absent options.
    pub fn from_options(options: Options) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(port) = options.port {
            config.port = port;
        }
        if let Some(root) = options.root {
            config.root = root;
        }
        if let Some(autoindex) = options.autoindex {
            config.autoindex = autoindex == Autoindex::On;
        }
        if let Some(index) = options.index {
            config.index = index;
        }
        config.error_page = options.error_page;

        if let Some(proxy) = options.proxy {
            for (prefix, target) in proxy {
                let target = match target {
                    Value::String(target) => target,
                    other => {
                        return Err(Error::InvalidProxyTarget {
                            target: other.to_string(),
                            reason: "target must be a string".to_string(),
                        });
                    }
                };
                config.proxy.push(ProxyRule::new(prefix, &target)?);
            }
        }

        if options.https.unwrap_or(false) {
            match (options.key, options.cert) {
                (Some(key), Some(cert)) => config.tls = Some(TlsSettings { key, cert }),
                _ => {
                    return Err(Error::ConfigError(
                        "https requires both key and cert".to_string(),
                    ));
                }
            }
        }

        Ok(config)
    }
}
