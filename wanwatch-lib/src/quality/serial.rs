//! Raw serial line access for AT command modems.
use nix::fcntl::OFlag;
use nix::sys::termios::{self, BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices};
use thiserror::Error;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Error)]
pub enum Error {
    #[error("error opening serial device `{path}`: {error}")]
    Open { path: PathBuf, error: io::Error },
    #[error("error configuring serial device `{path}`: {error}")]
    Termios { path: PathBuf, error: nix::Error },
    #[error("serial setup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Line settings used for every modem: 115200 baud, 8N1.
pub const BAUD_RATE: BaudRate = BaudRate::B115200;

/// Upper bound for a single blocking read in tenths of a second.
///
/// Reads return empty after this much silence so that an abandoned reader
/// releases the line shortly after its caller gave up.
const READ_IDLE_DECISECONDS: u8 = 2;

/// Opens `path` as a raw 8N1 serial line.
///
/// The returned file closes the line when dropped.
pub async fn open(path: &Path) -> Result<tokio::fs::File, Error> {
    let path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || open_blocking(&path)).await??;
    Ok(tokio::fs::File::from_std(file))
}

fn open_blocking(path: &Path) -> Result<File, Error> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NOCTTY.bits())
        .open(path)
        .map_err(|error| Error::Open {
            path: path.to_path_buf(),
            error,
        })?;

    configure(&file).map_err(|error| Error::Termios {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(file)
}

fn configure(file: &File) -> Result<(), nix::Error> {
    let mut tio = termios::tcgetattr(file)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, BAUD_RATE)?;

    tio.control_flags.remove(ControlFlags::CSIZE | ControlFlags::PARENB | ControlFlags::CSTOPB);
    tio.control_flags.insert(ControlFlags::CS8 | ControlFlags::CLOCAL | ControlFlags::CREAD);

    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = READ_IDLE_DECISECONDS;

    termios::tcsetattr(file, SetArg::TCSANOW, &tio)?;
    // drop unsolicited result codes queued before our query
    termios::tcflush(file, FlushArg::TCIFLUSH)?;
    Ok(())
}
