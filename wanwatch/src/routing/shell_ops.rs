//! Abstraction over shell command operations for testability.
//!
//! Production code uses [`RealShellOps`].
//! Tests use stateful mocks (see `mocks` module).

use async_trait::async_trait;
use tokio::process::Command;

use wanwatch_lib::shell_command_ext::ShellCommandExt;

use super::Error;

/// Abstraction over shell commands used in routing.
#[async_trait]
pub trait ShellOps: Send + Sync + Clone {
    /// Flush the kernel routing cache (`ip route flush cache`).
    async fn flush_routing_cache(&self) -> Result<(), Error>;
}

/// Production [`ShellOps`] that executes real shell commands.
#[derive(Clone)]
pub struct RealShellOps;

#[async_trait]
impl ShellOps for RealShellOps {
    async fn flush_routing_cache(&self) -> Result<(), Error> {
        Command::new("ip")
            .arg("route")
            .arg("flush")
            .arg("cache")
            .run()
            .await?;
        Ok(())
    }
}
