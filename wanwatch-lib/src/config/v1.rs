use serde::{Deserialize, Serialize};

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::{self, InterfaceSpec, LinkType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: Option<u8>,
    pub(super) healthcheck: Option<Ipv4Addr>,
    #[serde(default, with = "humantime_serde::option")]
    pub(super) interval: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub(super) timeout: Option<Duration>,
    pub(super) interfaces: Option<Vec<Interface>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(super) struct Interface {
    device: Option<String>,
    #[serde(rename = "type")]
    link_type: Option<String>,
    check: Option<String>,
}

pub fn wrong_keys(table: &toml::Table) -> Vec<String> {
    let mut wrong_keys = Vec::new();
    for (key, value) in table.iter() {
        match key.as_str() {
            "version" | "healthcheck" | "interval" | "timeout" => continue,
            "interfaces" => {
                let entries = value.as_array().map(|a| a.as_slice()).unwrap_or_default();
                for (index, entry) in entries.iter().enumerate() {
                    if let Some(iface) = entry.as_table() {
                        for k in iface.keys() {
                            if k == "device" || k == "type" || k == "check" {
                                continue;
                            }
                            wrong_keys.push(format!("interfaces[{index}].{k}"));
                        }
                    }
                }
            }
            _ => wrong_keys.push(key.to_string()),
        }
    }
    wrong_keys
}

fn convert_interfaces(value: Option<Vec<Interface>>) -> Result<Vec<InterfaceSpec>, config::Error> {
    let entries = value.unwrap_or_default();
    if entries.is_empty() {
        return Err(config::Error::NoInterfaces);
    }

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let device = match entry.device {
            Some(d) if !d.trim().is_empty() => d.trim().to_string(),
            _ => return Err(config::Error::MissingDevice { index }),
        };
        let raw_type = match entry.link_type {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(config::Error::MissingType { device }),
        };
        let link_type = raw_type
            .parse::<LinkType>()
            .map_err(|_| config::Error::UnknownLinkType {
                device: device.clone(),
                link_type: raw_type.clone(),
            })?;
        if !seen.insert(device.clone()) {
            return Err(config::Error::DuplicateDevice(device));
        }

        let check = entry.check.filter(|c| !c.trim().is_empty());
        if link_type == LinkType::Cellular && check.is_none() {
            tracing::warn!(%device, "cellular interface without serial device - quality readings will fail");
        }

        result.push(InterfaceSpec {
            device,
            link_type,
            check,
        });
    }
    Ok(result)
}

impl TryFrom<Config> for config::Config {
    type Error = config::Error;

    fn try_from(value: Config) -> Result<Self, Self::Error> {
        let interval = value.interval.unwrap_or(config::DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(config::Error::ZeroInterval);
        }
        let timeout = value.timeout.unwrap_or(config::DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(config::Error::ZeroTimeout);
        }
        let interfaces = convert_interfaces(value.interfaces)?;
        Ok(config::Config {
            healthcheck: value.healthcheck.unwrap_or(config::DEFAULT_HEALTHCHECK),
            interval,
            timeout,
            interfaces,
        })
    }
}
