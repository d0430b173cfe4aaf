//! Priority ordered failover between the managed interfaces.
//!
//! Each tick walks the interfaces in priority order and stops at the first
//! live one. Routes are only rewritten when that interface differs from the
//! active one. When nothing is live the previous choice stays in place.

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use std::time::Duration;

use crate::active::ActiveLink;
use crate::liveness::LivenessCheck;
use crate::routing::{DEPRIORITIZED_METRIC, MetricOps, PREFERRED_METRIC};

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    NoneLive,
    Unchanged(String),
    Switched { from: Option<String>, to: String },
}

pub struct Controller<L, M> {
    devices: Vec<String>,
    liveness: L,
    metrics: M,
    active: ActiveLink,
}

impl<L, M> Controller<L, M>
where
    L: LivenessCheck,
    M: MetricOps,
{
    /// `devices` in priority order, most preferred first.
    pub fn new(devices: Vec<String>, liveness: L, metrics: M) -> Self {
        Self {
            devices,
            liveness,
            metrics,
            active: ActiveLink::new(),
        }
    }

    /// Read handle on the active interface.
    pub fn active(&self) -> ActiveLink {
        self.active.clone()
    }

    pub async fn tick(&self) -> TickOutcome {
        let Some(found) = self.first_live().await else {
            tracing::debug!("no live interface - keeping routes");
            return TickOutcome::NoneLive;
        };

        let current = self.active.device();
        if current.as_deref() == Some(found.as_str()) {
            return TickOutcome::Unchanged(found);
        }

        self.reconcile(&found).await;
        self.active.publish(&found);
        tracing::info!(from = current.as_deref().unwrap_or("none"), to = %found, "active interface changed");
        TickOutcome::Switched { from: current, to: found }
    }

    /// Ticks on `period` until `cancel` fires. An overrunning tick delays the
    /// next one instead of overlapping it.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("controller loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn first_live(&self) -> Option<String> {
        for device in &self.devices {
            match self.liveness.is_live(device).await {
                Ok(true) => return Some(device.clone()),
                Ok(false) => tracing::debug!(%device, "interface not live"),
                Err(error) => tracing::error!(%device, %error, "liveness probe failed"),
            }
        }
        None
    }

    async fn reconcile(&self, preferred: &str) {
        for device in &self.devices {
            let metric = if device == preferred {
                PREFERRED_METRIC
            } else {
                DEPRIORITIZED_METRIC
            };
            if let Err(error) = self.metrics.set_metric(device, metric).await {
                tracing::error!(%device, metric, %error, "route reconciliation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness;
    use crate::routing::{self, Reconciler};
    use crate::routing::mocks::{MockNetlinkOps, MockShellOps, NetlinkState};
    use crate::routing::netlink_ops::{LinkInfo, MAIN_TABLE, RouteSpec};

    use rtnetlink::packet_route::route::{RouteProtocol, RouteScope};

    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct LiveState {
        live: HashSet<String>,
        failing: HashSet<String>,
        probed: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct MockLiveness(Arc<Mutex<LiveState>>);

    impl MockLiveness {
        fn set_live(&self, device: &str, live: bool) {
            let mut s = self.0.lock().unwrap();
            if live {
                s.live.insert(device.into());
            } else {
                s.live.remove(device);
            }
        }

        fn probed(&self) -> Vec<String> {
            std::mem::take(&mut self.0.lock().unwrap().probed)
        }
    }

    #[async_trait]
    impl LivenessCheck for MockLiveness {
        async fn is_live(&self, device: &str) -> Result<bool, liveness::Error> {
            let mut s = self.0.lock().unwrap();
            s.probed.push(device.into());
            if s.failing.contains(device) {
                return Err(liveness::Error::NotFound(device.into()));
            }
            Ok(s.live.contains(device))
        }
    }

    #[derive(Clone, Default)]
    struct MockMetrics {
        calls: Arc<Mutex<Vec<(String, u32)>>>,
        failing: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl MockMetrics {
        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricOps for MockMetrics {
        async fn set_metric(&self, device: &str, metric: u32) -> Result<(), routing::Error> {
            self.calls.lock().unwrap().push((device.into(), metric));
            if let Some(count) = self.failing.lock().unwrap().get(device) {
                return Err(routing::Error::AmbiguousRoute {
                    device: device.into(),
                    count: *count,
                });
            }
            Ok(())
        }
    }

    fn controller(liveness: &MockLiveness, metrics: &MockMetrics) -> Controller<MockLiveness, MockMetrics> {
        Controller::new(
            vec!["wwan0".into(), "wlan0".into(), "eth1".into()],
            liveness.clone(),
            metrics.clone(),
        )
    }

    fn calls(expected: &[(&str, u32)]) -> Vec<(String, u32)> {
        expected.iter().map(|(d, m)| (d.to_string(), *m)).collect()
    }

    #[tokio::test]
    async fn stays_empty_while_nothing_is_live() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);

        for _ in 0..3 {
            assert_eq!(ctrl.tick().await, TickOutcome::NoneLive);
        }
        assert_eq!(ctrl.active().device(), None);
        assert!(metrics.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn highest_priority_live_interface_wins() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wwan0", true);
        liveness.set_live("wlan0", true);
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);

        assert_eq!(
            ctrl.tick().await,
            TickOutcome::Switched {
                from: None,
                to: "wwan0".into()
            }
        );
        for _ in 0..3 {
            assert_eq!(ctrl.tick().await, TickOutcome::Unchanged("wwan0".into()));
        }
        assert_eq!(ctrl.active().device().as_deref(), Some("wwan0"));
        Ok(())
    }

    #[tokio::test]
    async fn reconciles_only_on_change() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wlan0", true);
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);

        ctrl.tick().await;
        ctrl.tick().await;
        ctrl.tick().await;

        assert_eq!(
            metrics.calls(),
            calls(&[("wwan0", 101), ("wlan0", 100), ("eth1", 101)])
        );
        Ok(())
    }

    #[tokio::test]
    async fn stops_probing_at_first_live_interface() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wwan0", true);
        liveness.set_live("eth1", true);
        let ctrl = controller(&liveness, &MockMetrics::default());

        ctrl.tick().await;
        assert_eq!(liveness.probed(), vec!["wwan0".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn fails_over_once_when_active_goes_down() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wwan0", true);
        liveness.set_live("wlan0", true);
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);
        ctrl.tick().await;

        liveness.set_live("wwan0", false);
        assert_eq!(
            ctrl.tick().await,
            TickOutcome::Switched {
                from: Some("wwan0".into()),
                to: "wlan0".into()
            }
        );
        assert_eq!(ctrl.tick().await, TickOutcome::Unchanged("wlan0".into()));
        assert_eq!(
            metrics.calls(),
            calls(&[
                ("wwan0", 100),
                ("wlan0", 101),
                ("eth1", 101),
                ("wwan0", 101),
                ("wlan0", 100),
                ("eth1", 101),
            ])
        );
        Ok(())
    }

    #[tokio::test]
    async fn promotes_recovered_higher_priority_interface() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("eth1", true);
        let ctrl = controller(&liveness, &MockMetrics::default());
        ctrl.tick().await;

        liveness.set_live("wwan0", true);
        assert_eq!(
            ctrl.tick().await,
            TickOutcome::Switched {
                from: Some("eth1".into()),
                to: "wwan0".into()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn keeps_last_active_when_everything_goes_down() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wlan0", true);
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);
        ctrl.tick().await;
        let since = ctrl.active().load().expect("active").since;

        liveness.set_live("wlan0", false);
        assert_eq!(ctrl.tick().await, TickOutcome::NoneLive);

        let snapshot = ctrl.active().load().expect("active");
        assert_eq!(snapshot.device, "wlan0");
        assert_eq!(snapshot.since, since);
        assert_eq!(metrics.calls().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn probe_error_counts_as_not_live() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.0.lock().unwrap().failing.insert("wwan0".into());
        liveness.set_live("wlan0", true);
        let ctrl = controller(&liveness, &MockMetrics::default());

        assert_eq!(
            ctrl.tick().await,
            TickOutcome::Switched {
                from: None,
                to: "wlan0".into()
            }
        );
        assert_eq!(liveness.probed(), vec!["wwan0".to_string(), "wlan0".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn reconcile_error_does_not_stop_other_interfaces() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wlan0", true);
        let metrics = MockMetrics::default();
        metrics.failing.lock().unwrap().insert("wwan0".into(), 2);
        let ctrl = controller(&liveness, &metrics);

        ctrl.tick().await;

        assert_eq!(
            metrics.calls(),
            calls(&[("wwan0", 101), ("wlan0", 100), ("eth1", 101)])
        );
        assert_eq!(ctrl.active().device().as_deref(), Some("wlan0"));
        Ok(())
    }

    #[tokio::test]
    async fn steers_kernel_routes_through_reconciler() -> anyhow::Result<()> {
        let default_via = |if_index: u32, gateway: [u8; 4], metric: u32| RouteSpec {
            destination: Ipv4Addr::UNSPECIFIED,
            prefix_len: 0,
            gateway: Some(Ipv4Addr::from(gateway)),
            if_index,
            table_id: Some(MAIN_TABLE),
            metric: Some(metric),
            protocol: RouteProtocol::Dhcp,
            scope: RouteScope::Universe,
        };
        let link = |index: u32, name: &str| LinkInfo {
            index,
            name: name.into(),
            up: true,
        };
        let netlink = MockNetlinkOps::with_state(NetlinkState {
            routes: vec![
                default_via(2, [10, 64, 0, 1], 600),
                default_via(3, [192, 168, 1, 1], 700),
                default_via(4, [100, 64, 0, 1], 101),
            ],
            links: vec![link(2, "wwan0"), link(3, "wlan0"), link(4, "eth1")],
            ..Default::default()
        });
        let shell = MockShellOps::new();
        let liveness = MockLiveness::default();
        liveness.set_live("wlan0", true);

        let ctrl = Controller::new(
            vec!["wwan0".into(), "wlan0".into(), "eth1".into()],
            liveness,
            Reconciler::new(netlink.clone(), shell.clone()),
        );
        ctrl.tick().await;

        assert_eq!(netlink.default_metric(2), Some(101));
        assert_eq!(netlink.default_metric(3), Some(100));
        assert_eq!(netlink.default_metric(4), Some(101));
        // eth1 already carried the deprioritized metric
        assert_eq!(shell.state.lock().unwrap().cache_flush_count, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_until_cancelled() -> anyhow::Result<()> {
        let liveness = MockLiveness::default();
        liveness.set_live("wwan0", true);
        let metrics = MockMetrics::default();
        let ctrl = controller(&liveness, &metrics);
        let active = ctrl.active();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ctrl.run(Duration::from_secs(15), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(31)).await;
        cancel.cancel();
        handle.await?;

        assert_eq!(active.device().as_deref(), Some("wwan0"));
        // ticks at 0s, 15s and 30s
        assert_eq!(liveness.probed().len(), 3);
        assert_eq!(metrics.calls().len(), 3);
        Ok(())
    }
}
