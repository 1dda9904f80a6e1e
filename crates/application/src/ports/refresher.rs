use async_trait::async_trait;
use chaindns_domain::DomainError;

/// Data source that rebuilds an in-memory snapshot when asked.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<(), DomainError>;

    fn name(&self) -> &str;
}
