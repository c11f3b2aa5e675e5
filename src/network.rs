pub mod connection_handler;
pub mod relay_server;

pub use relay_server::{RelayHandle, RelayServer};
