//! Concrete plugins, the UDP upstream client and the server-side request
//! dispatcher.
pub mod dns;
pub mod metrics;
pub mod plugins;

pub use metrics::TracingMetrics;
