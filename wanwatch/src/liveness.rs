//! Per-interface connectivity check.
//!
//! An interface is live when it is administratively up and at least one ICMP
//! echo to the healthcheck target comes back through it.

use async_trait::async_trait;
use thiserror::Error;

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::icmp::{self, EchoOps};
use crate::routing::{self, netlink_ops::NetlinkOps};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Interface `{0}` not found")]
    NotFound(String),
    #[error("No probe result within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Routing(routing::Error),
    #[error(transparent)]
    Echo(#[from] icmp::Error),
}

impl From<routing::Error> for Error {
    fn from(error: routing::Error) -> Self {
        match error {
            routing::Error::LinkNotFound(device) => Error::NotFound(device),
            other => Error::Routing(other),
        }
    }
}

#[async_trait]
pub trait LivenessCheck: Send + Sync {
    async fn is_live(&self, device: &str) -> Result<bool, Error>;
}

#[derive(Clone)]
pub struct Prober<N, E> {
    netlink: N,
    echo: E,
    target: Ipv4Addr,
    timeout: Duration,
}

impl<N, E> Prober<N, E>
where
    N: NetlinkOps,
    E: EchoOps,
{
    pub fn new(netlink: N, echo: E, target: Ipv4Addr, timeout: Duration) -> Self {
        Self {
            netlink,
            echo,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl<N, E> LivenessCheck for Prober<N, E>
where
    N: NetlinkOps,
    E: EchoOps,
{
    #[tracing::instrument(skip(self), fields(target = %self.target))]
    async fn is_live(&self, device: &str) -> Result<bool, Error> {
        let link = self.netlink.link_by_name(device).await?;
        if !link.up {
            tracing::debug!("status=down admin");
            return Ok(false);
        }

        let stats = tokio::time::timeout(self.timeout, self.echo.echo(device, self.target))
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        if stats.received == 0 {
            tracing::debug!(transmitted = stats.transmitted, "status=down no replies");
            return Ok(false);
        }

        let rtt = stats.avg_rtt().unwrap_or_default();
        tracing::debug!(
            transmitted = stats.transmitted,
            received = stats.received,
            "status=up rtt={}ms",
            rtt.as_millis()
        );
        Ok(true)
    }
}
