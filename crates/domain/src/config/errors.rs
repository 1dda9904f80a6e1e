/// Problems found while loading or checking the configuration. Plugin
/// variants carry the plugin's `type` so the offending `[[plugins]]` table
/// can be found.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    FileRead { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("[server]: {0}")]
    Server(String),

    #[error("No plugins configured")]
    EmptyChain,

    #[error("{plugin}: at least one zone is required")]
    MissingZones { plugin: &'static str },

    #[error("{plugin}: invalid {field} {value}: {reason}")]
    InvalidField {
        plugin: &'static str,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{plugin}: {reason}")]
    Plugin { plugin: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn plugin(plugin: &'static str, reason: impl Into<String>) -> Self {
        Self::Plugin {
            plugin,
            reason: reason.into(),
        }
    }

    /// The plugin table the error points at, if any.
    pub fn plugin_type(&self) -> Option<&'static str> {
        match self {
            Self::MissingZones { plugin }
            | Self::InvalidField { plugin, .. }
            | Self::Plugin { plugin, .. } => Some(*plugin),
            _ => None,
        }
    }
}
