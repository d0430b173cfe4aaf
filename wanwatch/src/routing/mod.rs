//! Default route steering.
//!
//! **Limitation:** All operations are IPv4-only and limited to the main
//! routing table.
use thiserror::Error;

use wanwatch_lib::shell_command_ext;

pub mod netlink_ops;
pub mod reconciler;
pub mod shell_ops;

#[cfg(test)]
pub mod mocks;

pub use reconciler::{DEPRIORITIZED_METRIC, MetricOps, PREFERRED_METRIC, Reconciler};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Interface `{0}` not found")]
    LinkNotFound(String),
    #[error("Found {count} default routes for interface `{device}` - refusing to rewrite")]
    AmbiguousRoute { device: String, count: usize },
    #[error("Netlink error: {0}")]
    Netlink(#[from] rtnetlink::Error),
    #[error(transparent)]
    ShellCommand(#[from] shell_command_ext::Error),
    #[cfg(test)]
    #[error("Routing error: {0}")]
    General(String),
}
