mod handler;
mod metrics;
mod refresher;
mod service_backend;
mod upstream;

pub use handler::{Handler, HandlerResult, ResponseWriter, Transport};
pub use metrics::{MetricsSink, NoopMetrics};
pub use refresher::Refresher;
pub use service_backend::{AutoPather, FederationFunc, Options, ServiceBackend};
pub use upstream::Upstream;
