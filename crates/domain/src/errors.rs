use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR format: {0}")]
    InvalidCidr(String),

    #[error("Domain not found (NXDOMAIN)")]
    NxDomain,

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("No items found")]
    NoItems,

    #[error("Namespace not exposed: {0}")]
    NamespaceNotExposed(String),

    #[error("Invalid query name: {0}")]
    InvalidRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend call timed out after {0}ms")]
    Timeout(u64),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("{0}: no next plugin found")]
    NoNextPlugin(String),

    #[error("Invalid name after rewrite: {0}")]
    InvalidRewrite(String),

    #[error("Failed to write response: {0}")]
    WriteFailed(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for DomainError {
    fn from(e: std::io::Error) -> Self {
        DomainError::IoError(e.to_string())
    }
}
