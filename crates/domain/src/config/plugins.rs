//! Per-plugin configuration. The order of `[[plugins]]` tables in the file is
//! the order of the chain.

use super::errors::ConfigError;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginConfig {
    Rewrite(RewriteConfig),
    Autopath(AutopathConfig),
    Federation(FederationConfig),
    Template(TemplateConfig),
    Hosts(HostsConfig),
    Reverse(ReverseConfig),
    Etcd(EtcdConfig),
    Kubernetes(KubernetesConfig),
    K8sExternal(K8sExternalConfig),
    Forward(ForwardConfig),
}

impl PluginConfig {
    pub fn name(&self) -> &'static str {
        match self {
            PluginConfig::Rewrite(_) => "rewrite",
            PluginConfig::Autopath(_) => "autopath",
            PluginConfig::Federation(_) => "federation",
            PluginConfig::Template(_) => "template",
            PluginConfig::Hosts(_) => "hosts",
            PluginConfig::Reverse(_) => "reverse",
            PluginConfig::Etcd(_) => "etcd",
            PluginConfig::Kubernetes(_) => "kubernetes",
            PluginConfig::K8sExternal(_) => "k8s_external",
            PluginConfig::Forward(_) => "forward",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PluginConfig::Rewrite(c) => c.validate(),
            PluginConfig::Autopath(c) => c.validate(),
            PluginConfig::Federation(c) => c.validate(),
            PluginConfig::Template(c) => require_zones("template", &c.zones),
            PluginConfig::Hosts(c) => require_zones("hosts", &c.zones),
            PluginConfig::Reverse(c) => c.validate(),
            PluginConfig::Etcd(c) => {
                require_zones("etcd", &c.zones)?;
                validate_upstreams("etcd", &c.upstreams)
            }
            PluginConfig::Kubernetes(c) => c.validate(),
            PluginConfig::K8sExternal(c) => require_zones("k8s_external", &c.zones),
            PluginConfig::Forward(c) => c.validate(),
        }
    }
}

fn require_zones(plugin: &'static str, zones: &[String]) -> Result<(), ConfigError> {
    if zones.is_empty() {
        return Err(ConfigError::MissingZones { plugin });
    }
    Ok(())
}

fn validate_upstreams(plugin: &'static str, upstreams: &[String]) -> Result<(), ConfigError> {
    for upstream in upstreams {
        upstream
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidField {
                plugin,
                field: "upstream",
                value: upstream.clone(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

fn default_root_zones() -> Vec<String> {
    vec![".".to_string()]
}

// ── rewrite ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// One rule per entry, e.g. `"stop name regex (.*)\\.old\\. {1}.new."`.
    pub rules: Vec<String>,

    /// Leave the rewritten question in the response.
    #[serde(default)]
    pub no_revert: bool,
}

impl RewriteConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rules.is_empty() {
            return Err(ConfigError::plugin("rewrite", "at least one rule is required"));
        }
        Ok(())
    }
}

// ── autopath ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutopathConfig {
    #[serde(default = "default_root_zones")]
    pub zones: Vec<String>,

    /// Static search path. Ignored when `search_from` names a plugin.
    #[serde(default)]
    pub search: Vec<String>,

    /// Plugin whose search-path callback is used, e.g. `"kubernetes"`.
    #[serde(default)]
    pub search_from: Option<String>,
}

impl AutopathConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.is_empty() && self.search_from.is_none() {
            return Err(ConfigError::plugin(
                "autopath",
                "either search or search_from is required",
            ));
        }
        Ok(())
    }
}

// ── federation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FederationConfig {
    pub zones: Vec<String>,

    /// Federation label to federated zone.
    pub federations: BTreeMap<String, String>,
}

impl FederationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_zones("federation", &self.zones)?;
        if self.federations.is_empty() {
            return Err(ConfigError::plugin(
                "federation",
                "at least one federation is required",
            ));
        }
        Ok(())
    }
}

// ── template ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TemplateConfig {
    #[serde(default = "default_root_zones")]
    pub zones: Vec<String>,

    #[serde(default = "default_template_class")]
    pub class: String,

    #[serde(default = "default_template_qtype")]
    pub qtype: String,

    #[serde(default = "default_template_regex")]
    pub regex: Vec<String>,

    #[serde(default)]
    pub answer: Vec<String>,

    #[serde(default)]
    pub additional: Vec<String>,

    #[serde(default)]
    pub authority: Vec<String>,

    #[serde(default = "default_template_rcode")]
    pub rcode: String,

    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,
}

fn default_template_class() -> String {
    "IN".to_string()
}

fn default_template_qtype() -> String {
    "A".to_string()
}

fn default_template_regex() -> Vec<String> {
    vec![".*".to_string()]
}

fn default_template_rcode() -> String {
    "NOERROR".to_string()
}

// ── hosts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostsConfig {
    #[serde(default = "default_root_zones")]
    pub zones: Vec<String>,

    /// File in `/etc/hosts` format, reloaded when it changes.
    #[serde(default)]
    pub path: Option<String>,

    /// Inline lines in the same format.
    #[serde(default)]
    pub entries: Vec<String>,

    #[serde(default = "default_hosts_ttl")]
    pub ttl: u32,

    #[serde(default = "default_hosts_reload_secs")]
    pub reload_secs: u64,

    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,
}

fn default_hosts_ttl() -> u32 {
    3600
}

fn default_hosts_reload_secs() -> u64 {
    5
}

// ── reverse ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReverseConfig {
    /// CIDR blocks answered by this instance.
    pub networks: Vec<String>,

    /// Host name template with a single `{ip}` placeholder.
    pub hostname: String,

    #[serde(default = "default_reverse_ttl")]
    pub ttl: u32,

    #[serde(default)]
    pub fallthrough: bool,
}

fn default_reverse_ttl() -> u32 {
    60
}

impl ReverseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.networks.is_empty() {
            return Err(ConfigError::plugin("reverse", "at least one network is required"));
        }
        for cidr in &self.networks {
            cidr.parse::<IpNetwork>()
                .map_err(|e| ConfigError::InvalidField {
                    plugin: "reverse",
                    field: "network",
                    value: cidr.clone(),
                    reason: e.to_string(),
                })?;
        }
        if self.hostname.matches("{ip}").count() != 1 {
            return Err(ConfigError::InvalidField {
                plugin: "reverse",
                field: "hostname",
                value: self.hostname.clone(),
                reason: "must contain {ip} exactly once".to_string(),
            });
        }
        Ok(())
    }
}

// ── etcd ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EtcdConfig {
    pub zones: Vec<String>,

    #[serde(default = "default_etcd_prefix")]
    pub prefix: String,

    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,

    /// Upstream resolvers used for CNAME targets outside the zones.
    #[serde(default)]
    pub upstreams: Vec<String>,

    /// Initial contents of the in-process key-value store.
    #[serde(default)]
    pub records: Vec<EtcdSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EtcdSeed {
    pub key: String,
    /// JSON-encoded service.
    pub value: String,
    /// Lease TTL in seconds; 0 means no lease.
    #[serde(default)]
    pub lease: u32,
}

fn default_etcd_prefix() -> String {
    "/skydns".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

// ── kubernetes ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PodMode {
    #[default]
    Disabled,
    Insecure,
    Verified,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KubernetesConfig {
    pub zones: Vec<String>,

    /// Exposed namespaces; empty exposes all.
    #[serde(default)]
    pub namespaces: Vec<String>,

    #[serde(default)]
    pub pods: PodMode,

    #[serde(default)]
    pub endpoint_pod_names: bool,

    #[serde(default)]
    pub ignore_empty_service: bool,

    #[serde(default = "default_kubernetes_ttl")]
    pub ttl: u32,

    #[serde(default)]
    pub fallthrough: Option<Vec<String>>,

    /// Node this instance runs on, used for federation answers.
    #[serde(default)]
    pub node_name: Option<String>,

    /// Search domains of the host, appended to pod search paths.
    #[serde(default)]
    pub host_search: Vec<String>,

    #[serde(default)]
    pub upstreams: Vec<String>,
}

fn default_kubernetes_ttl() -> u32 {
    5
}

impl KubernetesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_zones("kubernetes", &self.zones)?;
        validate_upstreams("kubernetes", &self.upstreams)?;
        if self.ttl > 3600 {
            return Err(ConfigError::InvalidField {
                plugin: "kubernetes",
                field: "ttl",
                value: self.ttl.to_string(),
                reason: "must be in range [0, 3600]".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8sExternalConfig {
    pub zones: Vec<String>,

    #[serde(default = "default_kubernetes_ttl")]
    pub ttl: u32,

    /// First label of the synthesized name server, `dns` by default.
    #[serde(default = "default_external_apex")]
    pub apex: String,
}

fn default_external_apex() -> String {
    "dns".to_string()
}

// ── forward ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardConfig {
    #[serde(default = "default_root_zones")]
    pub zones: Vec<String>,

    /// `ip:port` upstream servers.
    pub upstreams: Vec<String>,

    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

impl ForwardConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstreams.is_empty() {
            return Err(ConfigError::plugin("forward", "at least one upstream is required"));
        }
        validate_upstreams("forward", &self.upstreams)
    }
}
