use clap::Parser;
use std::path::PathBuf;

use crate::error_handling::types::ConfigError;

/// Command-line configuration for the relay.
///
/// Four options describe everything the relay needs: where to listen, where
/// to forward, and where to put the capture logs. The session directory
/// itself is derived from the start timestamp, not configured.
///
/// # Fields Overview
///
/// - `incoming_port`: local port the relay binds and accepts on
/// - `outgoing_host`: DNS name or address every connection is relayed to
/// - `outgoing_port`: port of the upstream destination
/// - `destination_folder`: root under which the session directory is created
#[derive(Parser, Debug, Clone)]
#[command(name = "portlogger")]
#[command(about = "Transparent TCP relay that records both directions of every connection")]
pub struct Config {
    /// Incoming port
    #[arg(long = "in")]
    pub incoming_port: u16,

    /// Outgoing host
    #[arg(long = "host")]
    pub outgoing_host: String,

    /// Outgoing port
    #[arg(long = "out")]
    pub outgoing_port: u16,

    /// Destination folder
    #[arg(long = "destination")]
    pub destination_folder: PathBuf,
}

impl Config {
    /// Creates a new `Config` instance by parsing the command line.
    ///
    /// # Panics
    /// Exits the process with a usage message when required arguments are
    /// missing or invalid, as clap does.
    pub fn from_args() -> Self {
        Config::parse()
    }

    /// Checks option values the parser accepts syntactically but that cannot
    /// work at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.incoming_port == 0 {
            return Err(ConfigError::BadPort(
                "incoming port must be non-zero".to_string(),
            ));
        }
        if self.outgoing_port == 0 {
            return Err(ConfigError::BadPort(
                "outgoing port must be non-zero".to_string(),
            ));
        }
        if self.outgoing_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(())
    }

    #[cfg(test)]
    fn from_args_under_test() -> Result<Config, clap::Error> {
        Config::try_parse_from([
            "portlogger",
            "--in",
            "8080",
            "--host",
            "example.org",
            "--out",
            "9090",
            "--destination",
            "/tmp/captures",
        ])
    }
}
