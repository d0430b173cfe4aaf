use regex::Regex;
use tokio::process::Command;

use std::sync::LazyLock;

use super::Error;
use crate::shell_command_ext::ShellCommandExt;
use crate::signal;

static SIGNAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"signal:\s*(-?\d+)").expect("valid signal pattern"));

pub async fn measure(device: &str) -> Result<u8, Error> {
    let output = Command::new("iw")
        .arg("dev")
        .arg(device)
        .arg("link")
        .run_stdout()
        .await?;
    let dbm = parse_signal(&output)?;
    Ok(signal::normalize(dbm))
}

/// Extracts the signal strength in dBm from `iw dev <device> link` output.
pub fn parse_signal(output: &str) -> Result<i32, Error> {
    SIGNAL_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .ok_or(Error::SignalNotFound)
}
