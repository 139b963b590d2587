//! Podium Core - shared foundation for the Podium member-management server
//!
//! This crate holds the pieces every other Podium crate builds on: the
//! error taxonomy, configuration loading and the logging bootstrap.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{parse_duration, AuthConfig, DatabaseConfig, PodiumConfig};
pub use error::{PodiumError, PodiumResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
