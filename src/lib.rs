//! Transparent TCP relay that records each direction of every accepted
//! connection to its own capture file.
//!
//! The relay sits between clients and one fixed upstream destination,
//! forwarding bytes unmodified in both directions. Every accepted connection
//! gets two append-only log files (client-origin and upstream-origin bytes)
//! under a per-run session directory.

pub mod configuration;
pub mod data_capture;
pub mod error_handling;
pub mod network;
pub mod session_management;
