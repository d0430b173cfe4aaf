//! Cellular modem signal quality via the `AT+CSQ` query.
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use std::io;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use super::{Error, serial};
use crate::signal;

/// How long to wait for the modem to answer.
pub const DEADLINE: Duration = Duration::from_secs(3);

pub const QUERY: &[u8] = b"AT+CSQ\r";

/// `+CSQ: <rssi>,<ber>`
static CSQ_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+CSQ:\s*(\d+),\s*(\d+)").expect("valid CSQ pattern"));

/// Index reported when the signal is not known or not detectable.
pub const UNKNOWN_INDEX: u32 = 99;

/// Received signal strength per CSQ index 0..=31, two dBm apart.
const CSQ_DBM: [i32; 32] = [
    -113, -111, -109, -107, -105, -103, -101, -99, -97, -95, -93, -91, -89, -87, -85, -83, -81, -79, -77, -75, -73,
    -71, -69, -67, -65, -63, -61, -59, -57, -55, -53, -51,
];

const IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Looks up the signal strength for a CSQ index.
///
/// The unknown sentinel maps to the weakest defined level.
pub fn index_to_dbm(index: u32) -> Option<i32> {
    if index == UNKNOWN_INDEX {
        return Some(CSQ_DBM[0]);
    }
    usize::try_from(index).ok().and_then(|i| CSQ_DBM.get(i)).copied()
}

/// Extracts the raw signal index from a single modem output line.
pub fn parse_csq(line: &str) -> Option<&str> {
    CSQ_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Converts a raw CSQ index into a quality percentage.
///
/// Indexes outside of the table read as zero quality rather than an error.
pub fn quality_for_index(raw: &str) -> u8 {
    raw.parse::<u32>()
        .ok()
        .and_then(index_to_dbm)
        .map(signal::normalize)
        .unwrap_or(0)
}

pub async fn measure(path: &Path, deadline: Duration) -> Result<u8, Error> {
    // line is closed when it goes out of scope, on every return path
    let mut line = serial::open(path).await?;
    line.write_all(QUERY).await?;
    line.flush().await?;
    read_quality(&mut line, deadline).await
}

/// Scans modem output for a CSQ response until `deadline` expires.
///
/// On expiry the pending read is dropped, not awaited.
pub async fn read_quality<R>(reader: &mut R, deadline: Duration) -> Result<u8, Error>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(deadline, scan_index(reader)).await {
        Ok(Ok(index)) => {
            tracing::debug!(%index, "modem signal index");
            Ok(quality_for_index(&index))
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::Timeout(deadline)),
    }
}

async fn scan_index<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            // raw tty reads come back empty after the idle window
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }
        pending.extend_from_slice(&chunk[..read]);

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            if let Some(index) = parse_csq(text.trim()) {
                return Ok(index.to_string());
            }
        }
    }
}
