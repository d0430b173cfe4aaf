use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use std::fmt::{self, Display};
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod v1;

pub const DEFAULT_PATH: &str = "/etc/wanwatch/config.toml";
pub const ENV_VAR: &str = "WANWATCH_CONFIG_PATH";

pub const DEFAULT_HEALTHCHECK: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub healthcheck: Ipv4Addr,
    pub interval: Duration,
    pub timeout: Duration,
    /// Managed links in priority order, index 0 is most preferred.
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub device: String,
    pub link_type: LinkType,
    /// Type specific probe parameter, e.g. the modem serial device for cellular links.
    pub check: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Cellular,
    Wireless,
    Satellite,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration file not found")]
    NoFile,
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    TomlDeserialization(#[from] toml::de::Error),
    #[error("Unsupported config version: {0}")]
    VersionMismatch(i64),
    #[error("No interfaces configured")]
    NoInterfaces,
    #[error("Interface #{index} is missing a device")]
    MissingDevice { index: usize },
    #[error("Interface `{device}` is missing a type")]
    MissingType { device: String },
    #[error("Interface `{device}` has unknown type `{link_type}`")]
    UnknownLinkType { device: String, link_type: String },
    #[error("Interface `{0}` is configured more than once")]
    DuplicateDevice(String),
    #[error("Check interval must be greater than zero")]
    ZeroInterval,
    #[error("Probe timeout must be greater than zero")]
    ZeroTimeout,
}

impl FromStr for LinkType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cellular" | "gprs" => Ok(LinkType::Cellular),
            "wireless" | "wifi" => Ok(LinkType::Wireless),
            "satellite" | "starlink" => Ok(LinkType::Satellite),
            _ => Err(()),
        }
    }
}

impl Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkType::Cellular => write!(f, "cellular"),
            LinkType::Wireless => write!(f, "wireless"),
            LinkType::Satellite => write!(f, "satellite"),
        }
    }
}

impl Display for InterfaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device, self.link_type)
    }
}

pub async fn read(path: &Path) -> Result<Config, Error> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoFile
        } else {
            Error::IO(e)
        }
    })?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config, Error> {
    let table = content.parse::<toml::Table>()?;
    // files without an explicit version are treated as the current format
    let version = table.get("version").and_then(|v| v.as_integer()).unwrap_or(1);

    match version {
        1 => {
            let res = toml::from_str::<v1::Config>(content)?;
            let wrong_keys = v1::wrong_keys(&table);
            for key in wrong_keys.iter() {
                tracing::warn!(%key, "ignoring unsupported key in configuration file");
            }
            res.try_into()
        }
        _ => Err(Error::VersionMismatch(version)),
    }
}
