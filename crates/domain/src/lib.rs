//! chaindns domain layer: records, names, zones and configuration.
pub mod config;
pub mod dnsutil;
pub mod errors;
pub mod fall;
pub mod path;
pub mod service;
pub mod zones;

pub use config::{CliOverrides, Config, ConfigError};
pub use errors::DomainError;
pub use fall::Fall;
pub use service::{HostType, Service};
pub use zones::Zones;
