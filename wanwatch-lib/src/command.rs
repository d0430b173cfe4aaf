use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::config::LinkType;
use crate::log_output;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Status,
    Quality(String),
    Ping,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Status(StatusResponse),
    Quality(QualityResponse),
    Pong,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Device currently holding the preferred default route.
    pub active: Option<String>,
    /// When `active` last changed.
    pub since: Option<SystemTime>,
    /// One entry per managed interface, in priority order.
    pub interfaces: Vec<InterfaceStatus>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStatus {
    pub device: String,
    pub link_type: LinkType,
    pub quality: Quality,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Quality {
    Reading(u8),
    Unavailable(String),
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum QualityResponse {
    Reading { device: String, quality: u8 },
    Unavailable { device: String, error: String },
    UnknownDevice(String),
}

impl StatusResponse {
    pub fn new(active: Option<String>, since: Option<SystemTime>, interfaces: Vec<InterfaceStatus>) -> Self {
        StatusResponse {
            active,
            since,
            interfaces,
        }
    }
}

impl QualityResponse {
    pub fn from_result<E: fmt::Display>(device: String, res: Result<u8, E>) -> Self {
        match res {
            Ok(quality) => QualityResponse::Reading { device, quality },
            Err(e) => QualityResponse::Unavailable {
                device,
                error: e.to_string(),
            },
        }
    }
}

impl<E: fmt::Display> From<Result<u8, E>> for Quality {
    fn from(res: Result<u8, E>) -> Self {
        match res {
            Ok(q) => Quality::Reading(q),
            Err(e) => Quality::Unavailable(e.to_string()),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Quality::Reading(q) => write!(f, "{q}%"),
            Quality::Unavailable(e) => write!(f, "unavailable ({e})"),
        }
    }
}

impl fmt::Display for StatusResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.active, &self.since) {
            (Some(active), Some(since)) => {
                writeln!(f, "Active: {active} (since {})", log_output::elapsed(since))?
            }
            (Some(active), None) => writeln!(f, "Active: {active}")?,
            (None, _) => writeln!(f, "Active: none")?,
        }
        writeln!(f, "Interfaces:")?;
        for (priority, iface) in self.interfaces.iter().enumerate() {
            let marker = if self.active.as_deref() == Some(iface.device.as_str()) {
                "*"
            } else {
                " "
            };
            writeln!(
                f,
                " {marker} {priority}: {} ({}) quality {}",
                iface.device, iface.link_type, iface.quality
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = log_output::serialize(self);
        write!(f, "{s}")
    }
}

impl FromStr for Command {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
