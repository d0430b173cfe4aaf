//! Default route metric reconciliation.
//!
//! Every managed interface keeps at most one default route in the main
//! table. [`Reconciler::set_metric`] rewrites that route's metric so the
//! kernel prefers the active link.

use async_trait::async_trait;

use super::Error;
use super::netlink_ops::{NetlinkOps, RouteSpec};
use super::shell_ops::ShellOps;

/// Metric of the default route through the active interface.
pub const PREFERRED_METRIC: u32 = 100;
/// Metric of the default routes through every other managed interface.
pub const DEPRIORITIZED_METRIC: u32 = 101;

#[async_trait]
pub trait MetricOps: Send + Sync {
    /// Assign `metric` to the single default route leaving through `device`.
    async fn set_metric(&self, device: &str, metric: u32) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct Reconciler<N, S> {
    netlink: N,
    shell: S,
}

impl<N, S> Reconciler<N, S>
where
    N: NetlinkOps,
    S: ShellOps,
{
    pub fn new(netlink: N, shell: S) -> Self {
        Self { netlink, shell }
    }

    async fn default_routes(&self, if_index: u32) -> Result<Vec<RouteSpec>, Error> {
        Ok(self
            .netlink
            .route_list()
            .await?
            .into_iter()
            .filter(|r| r.is_default() && r.in_main_table() && r.if_index == if_index)
            .collect())
    }
}

#[async_trait]
impl<N, S> MetricOps for Reconciler<N, S>
where
    N: NetlinkOps,
    S: ShellOps,
{
    #[tracing::instrument(skip(self), err)]
    async fn set_metric(&self, device: &str, metric: u32) -> Result<(), Error> {
        let link = self.netlink.link_by_name(device).await?;
        let routes = self.default_routes(link.index).await?;

        let current = match routes.as_slice() {
            [] => {
                tracing::debug!("no default route - nothing to steer");
                return Ok(());
            }
            [route] => route,
            _ => {
                return Err(Error::AmbiguousRoute {
                    device: device.to_string(),
                    count: routes.len(),
                });
            }
        };

        if current.metric() == metric {
            tracing::debug!("default route already carries desired metric");
            return Ok(());
        }

        let replacement = RouteSpec {
            metric: Some(metric),
            ..current.clone()
        };

        self.netlink.route_del(current).await?;
        // not transactional: a failing add leaves the interface without a default route
        // until the next successful pass
        self.netlink.route_add(&replacement).await?;
        self.shell.flush_routing_cache().await?;

        tracing::info!(gateway = ?current.gateway, from = current.metric(), to = metric, "rewrote default route metric");
        Ok(())
    }
}
