// ABOUTME: Error taxonomy for the history collector
// ABOUTME: Keeps upstream, transport and parse failures distinguishable for callers

use std::fmt;

#[derive(Debug)]
pub enum CollectorError {
    /// No bearer token could be obtained.
    Auth(String),
    /// The service answered with a non-success status.
    Upstream {
        url: String,
        status: u16,
        body: String,
    },
    /// Connect failure, timeout or a broken connection.
    Transport(String),
    /// A success response whose body was not the expected JSON.
    Parse(String),
    Config(String),
    Io(String),
}

impl CollectorError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CollectorError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CollectorError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            CollectorError::Upstream { url, status, body } => {
                write!(f, "Upstream error: GET {} returned {}: {}", url, status, body)
            }
            CollectorError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CollectorError::Parse(msg) => write!(f, "Parse error: {}", msg),
            CollectorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CollectorError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollectorError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            CollectorError::Parse(err.to_string())
        } else {
            CollectorError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        CollectorError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for CollectorError {
    fn from(err: std::io::Error) -> Self {
        CollectorError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
