pub mod command;
pub mod config;
pub mod log_output;
pub mod logging;
pub mod quality;
pub mod shell_command_ext;
pub mod signal;
pub mod socket;
