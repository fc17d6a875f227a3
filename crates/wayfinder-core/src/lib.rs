pub mod config;
pub mod error;
pub mod types;

pub use config::WayfinderConfig;
pub use error::{Result, WayfinderError};
pub use types::*;
