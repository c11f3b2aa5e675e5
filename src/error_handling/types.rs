use std::fmt;

/// Option values the command-line parser cannot reject on its own.
#[derive(Debug)]
pub enum ConfigError {
    BadPort(String),
    EmptyHost,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadPort(e) => write!(f, "Port error: {}", e),
            ConfigError::EmptyHost => write!(f, "Outgoing host must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fatal session setup failures. The process exits without serving any
/// connection when one of these occurs.
#[derive(Debug)]
pub enum SessionError {
    DirectoryCreationFailed(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DirectoryCreationFailed(e) => {
                write!(f, "Failed to create the session directory: {}", e)
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    SockError(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::SockError(e) => write!(f, "Socket error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Errors that terminate one direction of a relayed connection. They never
/// cross the connection boundary upward into the accept loop.
#[derive(Debug)]
pub enum CaptureError {
    TcpStreamError(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::TcpStreamError(e) => write!(f, "TCP stream relay error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}
