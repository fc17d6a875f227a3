use thiserror::Error;

/// Top-level error type for the Wayfinder system.
///
/// Subsystem crates define their own error types for their own failure
/// modes and convert into this one where the `?` operator crosses a crate
/// boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WayfinderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid location: latitude {lat}, longitude {lon} out of range")]
    InvalidLocation { lat: f64, lon: f64 },

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),
}

impl From<toml::de::Error> for WayfinderError {
    fn from(err: toml::de::Error) -> Self {
        WayfinderError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WayfinderError {
    fn from(err: toml::ser::Error) -> Self {
        WayfinderError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WayfinderError {
    fn from(err: serde_json::Error) -> Self {
        WayfinderError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Wayfinder operations.
pub type Result<T> = std::result::Result<T, WayfinderError>;
