use crate::request::Request;
use async_trait::async_trait;
use chaindns_domain::{DomainError, Service};
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;

/// Per-lookup knobs passed through to backends.
#[derive(Debug, Clone, Default)]
pub struct Options {}

/// A data source the record synthesis engine can turn into DNS answers.
///
/// Implementations only index their own zones; anything outside them is
/// reached through [`ServiceBackend::lookup`].
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Services matching the request name. `exact` disables wildcard and
    /// subtree expansion.
    async fn services(
        &self,
        state: &Request<'_>,
        exact: bool,
        opt: &Options,
    ) -> Result<Vec<Service>, DomainError>;

    /// Services for a reverse (PTR) name.
    async fn reverse(
        &self,
        state: &Request<'_>,
        exact: bool,
        opt: &Options,
    ) -> Result<Vec<Service>, DomainError>;

    /// Resolves a name outside the backend's zones.
    async fn lookup(
        &self,
        state: &Request<'_>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Message, DomainError>;

    /// Raw records for the request name.
    async fn records(&self, state: &Request<'_>, exact: bool)
        -> Result<Vec<Service>, DomainError>;

    /// Reports whether `err` is this backend's "name does not exist" sentinel.
    fn is_name_error(&self, err: &DomainError) -> bool;

    fn serial(&self, state: &Request<'_>) -> u32;

    fn min_ttl(&self, state: &Request<'_>) -> u32;
}

/// Supplies a per-client search path. `None` disables autopathing for the
/// request.
pub trait AutoPather: Send + Sync {
    fn auto_path(&self, state: &Request<'_>) -> Option<Vec<String>>;
}

/// Produces the service a federated name should point at.
pub trait FederationFunc: Send + Sync {
    fn federations(
        &self,
        state: &Request<'_>,
        fname: &str,
        fzone: &str,
    ) -> Result<Service, DomainError>;
}
