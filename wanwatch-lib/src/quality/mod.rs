//! Link quality probes.
//!
//! Each configured interface gets exactly one [`Probe`], resolved from its
//! link type when the configuration is loaded. A probe holds no mutable
//! state; every [`Probe::measure`] call opens whatever OS resource it needs
//! and releases it before returning, so probes can be called concurrently.

use thiserror::Error;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{InterfaceSpec, LinkType};
use crate::shell_command_ext;

pub mod cellular;
pub mod serial;
pub mod wireless;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serial device required for cellular interface `{0}`")]
    MissingSerialDevice(String),
    #[error("No signal quality response within {0:?}")]
    Timeout(Duration),
    #[error("Signal strength not found in link output")]
    SignalNotFound,
    #[error("Serial line error: {0}")]
    Serial(#[from] serial::Error),
    #[error(transparent)]
    ShellCommand(#[from] shell_command_ext::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Probe {
    /// Queries the modem over its AT command serial line.
    Cellular {
        device: String,
        serial: Option<PathBuf>,
        deadline: Duration,
    },
    /// Reads the link signal of a wireless device from the OS.
    Wireless { device: String },
    /// Satellite terminals expose no local signal.
    Satellite { device: String },
}

impl Probe {
    pub fn for_interface(spec: &InterfaceSpec) -> Self {
        let device = spec.device.clone();
        match spec.link_type {
            LinkType::Cellular => Probe::Cellular {
                device,
                serial: spec.check.as_ref().map(PathBuf::from),
                deadline: cellular::DEADLINE,
            },
            LinkType::Wireless => Probe::Wireless { device },
            LinkType::Satellite => Probe::Satellite { device },
        }
    }

    pub fn device(&self) -> &str {
        match self {
            Probe::Cellular { device, .. } | Probe::Wireless { device } | Probe::Satellite { device } => device,
        }
    }

    pub fn link_type(&self) -> LinkType {
        match self {
            Probe::Cellular { .. } => LinkType::Cellular,
            Probe::Wireless { .. } => LinkType::Wireless,
            Probe::Satellite { .. } => LinkType::Satellite,
        }
    }

    /// Measures the current link quality as a 0-100 percentage.
    #[tracing::instrument(skip(self), fields(device = %self.device(), link_type = %self.link_type()), err)]
    pub async fn measure(&self) -> Result<u8, Error> {
        match self {
            Probe::Cellular {
                device,
                serial,
                deadline,
            } => {
                let path = serial
                    .as_ref()
                    .ok_or_else(|| Error::MissingSerialDevice(device.clone()))?;
                cellular::measure(path, *deadline).await
            }
            Probe::Wireless { device } => wireless::measure(device).await,
            Probe::Satellite { .. } => Ok(0),
        }
    }
}

/// Resolves one probe per configured interface, keeping priority order.
pub fn probes(interfaces: &[InterfaceSpec]) -> Vec<Probe> {
    interfaces.iter().map(Probe::for_interface).collect()
}
