//! ICMP echo probing bound to a single egress device.

use async_trait::async_trait;
use futures::future::join_all;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use thiserror::Error;

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const PAYLOAD: &[u8] = b"wanwatch";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unable to open ICMP socket on `{device}`: {error}")]
    Socket { device: String, error: io::Error },
    #[error("Echo request failed: {0}")]
    Ping(#[from] SurgeError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub count: u16,
    /// Gap between two consecutive requests.
    pub interval: Duration,
    pub ttl: u32,
    /// How long to wait for the reply to one request.
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            count: 5,
            interval: Duration::from_millis(100),
            ttl: 64,
            timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    pub transmitted: u16,
    pub received: u16,
    pub rtts: Vec<Duration>,
}

impl Statistics {
    pub fn avg_rtt(&self) -> Option<Duration> {
        let count = u32::try_from(self.rtts.len()).ok().filter(|c| *c > 0)?;
        Some(self.rtts.iter().sum::<Duration>() / count)
    }

    /// Folds per-request outcomes. A timed out request is a lost reply, any
    /// other failure means the probe could not run.
    fn from_replies(replies: Vec<Result<Duration, SurgeError>>) -> Result<Self, Error> {
        let mut stats = Statistics::default();
        for reply in replies {
            stats.transmitted += 1;
            match reply {
                Ok(rtt) => {
                    stats.received += 1;
                    stats.rtts.push(rtt);
                }
                Err(SurgeError::Timeout { seq }) => tracing::trace!(?seq, "echo reply lost"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }
}

#[async_trait]
pub trait EchoOps: Send + Sync + Clone {
    /// Send a bounded burst of echo requests to `target` out of `device`.
    async fn echo(&self, device: &str, target: Ipv4Addr) -> Result<Statistics, Error>;
}

#[derive(Clone, Debug, Default)]
pub struct RawEchoOps {
    options: Options,
}

impl RawEchoOps {
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

#[async_trait]
impl EchoOps for RawEchoOps {
    #[tracing::instrument(skip(self), level = "debug", err)]
    async fn echo(&self, device: &str, target: Ipv4Addr) -> Result<Statistics, Error> {
        let config = Config::builder()
            .kind(ICMP::V4)
            .sock_type_hint(socket2::Type::RAW)
            .interface(device)
            .ttl(self.options.ttl)
            .build();
        let client = Client::new(&config).map_err(|error| Error::Socket {
            device: device.to_string(),
            error,
        })?;

        let ident: u16 = rand::random();
        // requests go out `interval` apart while earlier ones still wait for replies
        let requests = (0..self.options.count).map(|seq| {
            let client = client.clone();
            let delay = self.options.interval * u32::from(seq);
            let timeout = self.options.timeout;
            async move {
                tokio::time::sleep(delay).await;
                let mut pinger = client.pinger(IpAddr::V4(target), PingIdentifier(ident)).await;
                pinger.timeout(timeout);
                pinger.ping(PingSequence(seq), PAYLOAD).await.map(|(_, rtt)| rtt)
            }
        });

        Statistics::from_replies(join_all(requests).await)
    }
}
