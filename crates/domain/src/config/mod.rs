pub mod errors;
pub mod logging;
pub mod plugins;
pub mod root;
pub mod server;

pub use errors::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use plugins::{
    AutopathConfig, EtcdConfig, EtcdSeed, FederationConfig, ForwardConfig, HostsConfig,
    K8sExternalConfig, KubernetesConfig, PluginConfig, PodMode, ReverseConfig, RewriteConfig,
    TemplateConfig,
};
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
