//! Error type shared by the feed, atlas and propagation code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error fetching {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TLE record {name:?}: {reason}")]
    Tle { name: String, reason: String },

    #[error("No valid TLE data found")]
    NoSatellites,

    #[error("Propagation failed for {name}: {reason}")]
    Propagation { name: String, reason: String },

    #[error("Invalid topology: {0}")]
    Topology(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn http_err(url: &str, reason: impl std::fmt::Display) -> Error {
    Error::Http {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
