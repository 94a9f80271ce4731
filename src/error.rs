use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum BrerError {
    UnknownKey(String),
    MissingValue(String),
    UnknownPair(String),
    Configuration(String),
    MissingCheckpoint(PathBuf),
    Engine(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Other(String),
}

impl fmt::Display for BrerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrerError::UnknownKey(e) => write!(f, "Unknown parameter key: {}", e),
            BrerError::MissingValue(e) => write!(f, "Missing parameter value: {}", e),
            BrerError::UnknownPair(e) => write!(f, "Unknown pair: {}", e),
            BrerError::Configuration(e) => write!(f, "Configuration error: {}", e),
            BrerError::MissingCheckpoint(p) => write!(f, "Missing checkpoint: {}", p.display()),
            BrerError::Engine(e) => write!(f, "Engine error: {}", e),
            BrerError::Io(e) => write!(f, "IO error: {}", e),
            BrerError::Json(e) => write!(f, "JSON error: {}", e),
            BrerError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for BrerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrerError::Io(e) => Some(e),
            BrerError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BrerError {
    fn from(err: std::io::Error) -> Self {
        BrerError::Io(err)
    }
}

impl From<serde_json::Error> for BrerError {
    fn from(err: serde_json::Error) -> Self {
        BrerError::Json(err)
    }
}

impl From<String> for BrerError {
    fn from(err: String) -> Self {
        BrerError::Other(err)
    }
}

impl From<&str> for BrerError {
    fn from(err: &str) -> Self {
        BrerError::Other(err.to_string())
    }
}
