//! Stateful mocks for routing trait abstractions.
//!
//! These mocks track actual state (routes and links that exist) rather than
//! just verifying call sequences. This lets tests assert on the system's _state_
//! after a reconciliation pass, not just which calls happened.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability in async contexts.

#![cfg(test)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::Error;
use super::netlink_ops::{LinkInfo, NetlinkOps, RouteSpec};
use super::shell_ops::ShellOps;

// ============================================================================
// MockNetlinkOps
// ============================================================================

#[derive(Debug, Default)]
pub struct NetlinkState {
    pub routes: Vec<RouteSpec>,
    pub links: Vec<LinkInfo>,
    /// Mutating operations in call order, e.g. `route_del if=2 metric=600`.
    pub mutations: Vec<String>,
    /// Map of operation name -> error message. If set, the operation will fail.
    pub fail_on: HashMap<String, String>,
}

impl NetlinkState {
    fn check_fail(&self, op: &str) -> Result<(), Error> {
        if let Some(msg) = self.fail_on.get(op) {
            Err(Error::General(msg.clone()))
        } else {
            Ok(())
        }
    }
}

fn same_route(a: &RouteSpec, b: &RouteSpec) -> bool {
    a.destination == b.destination
        && a.prefix_len == b.prefix_len
        && a.if_index == b.if_index
        && a.table_id == b.table_id
        && a.metric() == b.metric()
        && a.protocol == b.protocol
}

#[derive(Clone)]
pub struct MockNetlinkOps {
    pub state: Arc<Mutex<NetlinkState>>,
}

impl MockNetlinkOps {
    pub fn with_state(state: NetlinkState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Metric of the default route leaving through `if_index`, if exactly one exists.
    pub fn default_metric(&self, if_index: u32) -> Option<u32> {
        let s = self.state.lock().unwrap();
        let defaults: Vec<_> = s
            .routes
            .iter()
            .filter(|r| r.is_default() && r.if_index == if_index)
            .collect();
        match defaults.as_slice() {
            [route] => Some(route.metric()),
            _ => None,
        }
    }
}

#[async_trait]
impl NetlinkOps for MockNetlinkOps {
    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_add")?;

        if s.routes.iter().any(|r| same_route(r, route)) {
            return Err(Error::General(format!(
                "route already exists: {}/{}",
                route.destination, route.prefix_len
            )));
        }
        s.mutations
            .push(format!("route_add if={} metric={}", route.if_index, route.metric()));
        s.routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.check_fail("route_del")?;

        let before = s.routes.len();
        s.routes.retain(|r| !same_route(r, route));
        if s.routes.len() == before {
            return Err(Error::General("route not found".into()));
        }
        s.mutations
            .push(format!("route_del if={} metric={}", route.if_index, route.metric()));
        Ok(())
    }

    async fn route_list(&self) -> Result<Vec<RouteSpec>, Error> {
        let s = self.state.lock().unwrap();
        s.check_fail("route_list")?;
        Ok(s.routes.clone())
    }

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error> {
        let s = self.state.lock().unwrap();
        s.check_fail("link_list")?;
        Ok(s.links.clone())
    }
}

// ============================================================================
// MockShellOps
// ============================================================================

#[derive(Debug, Default)]
pub struct ShellState {
    pub cache_flush_count: u32,
    pub fail_on: HashMap<String, String>,
}

#[derive(Clone)]
pub struct MockShellOps {
    pub state: Arc<Mutex<ShellState>>,
}

impl MockShellOps {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ShellState::default())),
        }
    }
}

#[async_trait]
impl ShellOps for MockShellOps {
    async fn flush_routing_cache(&self) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        if let Some(msg) = s.fail_on.get("flush_routing_cache") {
            return Err(Error::General(msg.clone()));
        }
        s.cache_flush_count += 1;
        Ok(())
    }
}
