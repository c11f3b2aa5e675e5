//! Common data types used across the data_capture subsystem.

use std::fmt;

/// Direction of TCP flow for relayed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes flowing from the external client to the upstream destination.
    ClientToUpstream,
    /// Bytes flowing from the upstream destination back to the client.
    UpstreamToClient,
}

impl Direction {
    /// File name suffix for this direction's capture log. The `client` file
    /// holds client-origin bytes, the `server` file upstream-origin bytes.
    pub fn log_suffix(self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client",
            Direction::UpstreamToClient => "server",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "C->S"),
            Direction::UpstreamToClient => write!(f, "S->C"),
        }
    }
}

/// How one direction of a connection came to an end, cancellation and peer
/// closure included. Only source read failures are reported as errors; these
/// outcomes are all expected terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeeOutcome {
    /// The source reported end-of-stream.
    SourceClosed,
    /// The destination refused a write, typically because the peer closed.
    DestinationClosed,
    /// The process-wide cancellation signal fired.
    Cancelled,
}
