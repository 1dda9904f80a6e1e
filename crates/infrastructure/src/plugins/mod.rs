//! Chain plugins. Each one is a [`Handler`](chaindns_application::ports::Handler)
//! holding the rest of the chain as its `next`.

pub mod autopath;
pub mod cloud;
pub mod etcd;
pub mod federation;
pub mod forward;
pub mod hosts;
pub mod kubernetes;
pub mod reverse;
pub mod rewrite;
pub mod template;

pub use autopath::AutoPath;
pub use cloud::{CloudDns, ZoneProvider};
pub use etcd::Etcd;
pub use federation::Federation;
pub use forward::Forward;
pub use hosts::Hosts;
pub use kubernetes::{K8sExternal, Kubernetes, WatchCache};
pub use reverse::Reverse;
pub use rewrite::Rewrite;
pub use template::Template;
