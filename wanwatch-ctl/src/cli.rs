use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wanwatch_lib::{command::Command as LibCommand, socket};

/// wanwatch control client - query the failover service
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify socket path
    #[arg(
        short,
        long,
        env = socket::ENV_VAR,
        default_value = socket::DEFAULT_PATH
    )]
    pub socket_path: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the active interface and a fresh quality reading per interface
    #[command()]
    Status {
        /// Format output as json
        #[arg(long)]
        json: bool,
    },

    /// Measure the link quality of a single interface
    #[command()]
    Quality {
        /// Device name as configured, e.g. wwan0
        device: String,
        /// Format output as json
        #[arg(long)]
        json: bool,
    },

    /// Check whether the service is responding
    #[command()]
    Ping,
}

impl Command {
    pub fn json(&self) -> bool {
        match self {
            Command::Status { json } | Command::Quality { json, .. } => *json,
            Command::Ping => false,
        }
    }
}

impl From<Command> for LibCommand {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Status { .. } => LibCommand::Status,
            Command::Quality { device, .. } => LibCommand::Quality(device),
            Command::Ping => LibCommand::Ping,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
