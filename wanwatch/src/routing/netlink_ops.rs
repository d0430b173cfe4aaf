//! Abstraction over rtnetlink operations for testability.
//!
//! Defines [`NetlinkOps`] trait and domain types ([`RouteSpec`], [`LinkInfo`])
//! that decouple routing logic from the raw netlink wire format.
//!
//! Production code uses [`RealNetlinkOps`] which wraps `rtnetlink::Handle`.
//! Tests use stateful mocks (see `mocks` module).

use async_trait::async_trait;
use futures::TryStreamExt;
use rtnetlink::packet_route::link::{LinkAttribute, LinkFlags};
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteProtocol, RouteScope};

use std::net::Ipv4Addr;

use super::Error;

/// Kernel id of the main routing table.
pub const MAIN_TABLE: u32 = 254;

// ============================================================================
// Domain Types
// ============================================================================

/// Route specification decoupled from rtnetlink wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSpec {
    pub destination: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Option<Ipv4Addr>,
    pub if_index: u32,
    pub table_id: Option<u32>,
    /// Route priority, `None` reads as 0.
    pub metric: Option<u32>,
    /// Who installed the route, e.g. `proto dhcp` or `proto kernel`.
    pub protocol: RouteProtocol,
    pub scope: RouteScope,
}

/// Network link (interface) information.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    /// Administrative up flag.
    pub up: bool,
}

impl RouteSpec {
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0 && self.destination == Ipv4Addr::UNSPECIFIED
    }

    pub fn in_main_table(&self) -> bool {
        self.table_id.unwrap_or(MAIN_TABLE) == MAIN_TABLE
    }

    pub fn metric(&self) -> u32 {
        self.metric.unwrap_or(0)
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Abstraction over netlink route and link operations.
///
/// Implementors must be cheaply cloneable (e.g. via `Arc` or because the
/// underlying handle is already reference-counted).
#[async_trait]
pub trait NetlinkOps: Send + Sync + Clone {
    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error>;
    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error>;
    /// List all IPv4 routes.
    async fn route_list(&self) -> Result<Vec<RouteSpec>, Error>;

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error>;

    /// Find a link by its device name.
    async fn link_by_name(&self, name: &str) -> Result<LinkInfo, Error> {
        self.link_list()
            .await?
            .into_iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::LinkNotFound(name.to_string()))
    }
}

// ============================================================================
// Real Implementation
// ============================================================================

/// Production [`NetlinkOps`] backed by an `rtnetlink::Handle`.
#[derive(Clone)]
pub struct RealNetlinkOps {
    handle: rtnetlink::Handle,
}

impl RealNetlinkOps {
    pub fn new(handle: rtnetlink::Handle) -> Self {
        Self { handle }
    }

    fn build_route_message(spec: &RouteSpec) -> RouteMessage {
        let mut builder = rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default()
            .destination_prefix(spec.destination, spec.prefix_len)
            .output_interface(spec.if_index);
        if let Some(gw) = spec.gateway {
            builder = builder.gateway(gw);
        }
        if let Some(id) = spec.table_id {
            builder = builder.table_id(id);
        }
        let mut msg = builder.build();
        msg.header.protocol = spec.protocol;
        msg.header.scope = spec.scope;
        if let Some(metric) = spec.metric {
            msg.attributes.push(RouteAttribute::Priority(metric));
        }
        msg
    }

    /// Delete request matching `spec` whatever its origin and scope.
    ///
    /// The kernel only treats `Unspec` protocol and `NoWhere` scope as
    /// wildcards, anything else must equal the installed route.
    fn build_delete_message(spec: &RouteSpec) -> RouteMessage {
        let mut msg = Self::build_route_message(spec);
        msg.header.protocol = RouteProtocol::Unspec;
        msg.header.scope = RouteScope::NoWhere;
        msg
    }

    fn route_message_to_spec(msg: &RouteMessage) -> Option<RouteSpec> {
        let if_index = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Oif(idx) => Some(*idx),
            _ => None,
        })?;

        let destination = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Destination(RouteAddress::Inet(ip)) => Some(*ip),
                _ => None,
            })
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let gateway = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Gateway(RouteAddress::Inet(ip)) => Some(*ip),
            _ => None,
        });

        let table_id = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Table(id) => Some(*id),
                _ => None,
            })
            .or(Some(u32::from(msg.header.table)));

        let metric = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Priority(p) => Some(*p),
            _ => None,
        });

        Some(RouteSpec {
            destination,
            prefix_len: msg.header.destination_prefix_length,
            gateway,
            if_index,
            table_id,
            metric,
            protocol: msg.header.protocol,
            scope: msg.header.scope,
        })
    }
}

#[async_trait]
impl NetlinkOps for RealNetlinkOps {
    async fn route_add(&self, route: &RouteSpec) -> Result<(), Error> {
        let msg = Self::build_route_message(route);
        self.handle.route().add(msg).execute().await?;
        Ok(())
    }

    async fn route_del(&self, route: &RouteSpec) -> Result<(), Error> {
        let msg = Self::build_delete_message(route);
        self.handle.route().del(msg).execute().await?;
        Ok(())
    }

    async fn route_list(&self) -> Result<Vec<RouteSpec>, Error> {
        let routes: Vec<_> = self
            .handle
            .route()
            .get(rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default().build())
            .execute()
            .try_collect()
            .await?;

        Ok(routes.iter().filter_map(Self::route_message_to_spec).collect())
    }

    async fn link_list(&self) -> Result<Vec<LinkInfo>, Error> {
        let links: Vec<_> = self.handle.link().get().execute().try_collect().await?;

        Ok(links
            .iter()
            .filter_map(|link| {
                let name = link.attributes.iter().find_map(|a| match a {
                    LinkAttribute::IfName(n) => Some(n.clone()),
                    _ => None,
                })?;
                Some(LinkInfo {
                    index: link.header.index,
                    name,
                    up: link.header.flags.contains(LinkFlags::Up),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_route() -> RouteSpec {
        RouteSpec {
            destination: Ipv4Addr::UNSPECIFIED,
            prefix_len: 0,
            gateway: Some(Ipv4Addr::new(192, 168, 8, 1)),
            if_index: 3,
            table_id: Some(MAIN_TABLE),
            metric: Some(600),
            protocol: RouteProtocol::Dhcp,
            scope: RouteScope::Universe,
        }
    }

    #[test]
    fn route_message_round_trips_through_spec() -> anyhow::Result<()> {
        let spec = default_route();
        let msg = RealNetlinkOps::build_route_message(&spec);
        let parsed = RealNetlinkOps::route_message_to_spec(&msg).expect("spec from message");
        assert_eq!(parsed, spec);
        Ok(())
    }

    #[test]
    fn add_request_keeps_route_origin() -> anyhow::Result<()> {
        let msg = RealNetlinkOps::build_route_message(&default_route());
        assert_eq!(msg.header.protocol, RouteProtocol::Dhcp);
        assert_eq!(msg.header.scope, RouteScope::Universe);
        assert!(msg.attributes.contains(&RouteAttribute::Priority(600)));
        Ok(())
    }

    #[test]
    fn delete_request_matches_any_origin() -> anyhow::Result<()> {
        let msg = RealNetlinkOps::build_delete_message(&default_route());
        assert_eq!(msg.header.protocol, RouteProtocol::Unspec);
        assert_eq!(msg.header.scope, RouteScope::NoWhere);
        // priority and gateway still select the one route to remove
        assert!(msg.attributes.contains(&RouteAttribute::Priority(600)));
        assert!(
            msg.attributes
                .contains(&RouteAttribute::Gateway(RouteAddress::Inet(Ipv4Addr::new(192, 168, 8, 1))))
        );
        Ok(())
    }

    #[test]
    fn classifies_default_routes() -> anyhow::Result<()> {
        let route = default_route();
        assert!(route.is_default());
        assert!(route.in_main_table());

        let host = RouteSpec {
            destination: Ipv4Addr::new(10, 0, 0, 0),
            prefix_len: 8,
            table_id: Some(100),
            metric: None,
            ..default_route()
        };
        assert!(!host.is_default());
        assert!(!host.in_main_table());
        assert_eq!(host.metric(), 0);
        Ok(())
    }
}
