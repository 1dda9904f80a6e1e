use async_trait::async_trait;
use chaindns_application::ports::{Options, ServiceBackend};
use chaindns_application::Request;
use chaindns_domain::{DomainError, Service};
use hickory_proto::op::Message;
use hickory_proto::rr::{Record, RecordType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Backend answering from name-keyed maps. Unknown names are `NxDomain`.
#[derive(Clone, Default)]
pub struct MockBackend {
    services: Arc<RwLock<HashMap<String, Vec<Service>>>>,
    reverse: Arc<RwLock<HashMap<String, Vec<Service>>>>,
    upstream: Arc<RwLock<HashMap<(String, RecordType), Vec<Record>>>>,
    failure: Arc<RwLock<Option<DomainError>>>,
    lookups: Arc<AtomicUsize>,
    min_ttl: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            min_ttl: 30,
            ..Default::default()
        }
    }

    pub async fn set_services(&self, name: &str, services: Vec<Service>) {
        self.services
            .write()
            .await
            .insert(name.to_string(), services);
    }

    pub async fn set_reverse(&self, name: &str, services: Vec<Service>) {
        self.reverse.write().await.insert(name.to_string(), services);
    }

    pub async fn set_upstream(&self, name: &str, qtype: RecordType, answers: Vec<Record>) {
        self.upstream
            .write()
            .await
            .insert((name.to_string(), qtype), answers);
    }

    pub async fn set_failure(&self, err: DomainError) {
        *self.failure.write().await = Some(err);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceBackend for MockBackend {
    async fn services(
        &self,
        state: &Request<'_>,
        _exact: bool,
        _opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        if let Some(err) = self.failure.read().await.clone() {
            return Err(err);
        }
        self.services
            .read()
            .await
            .get(state.name())
            .cloned()
            .ok_or(DomainError::NxDomain)
    }

    async fn reverse(
        &self,
        state: &Request<'_>,
        _exact: bool,
        _opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        self.reverse
            .read()
            .await
            .get(state.name())
            .cloned()
            .ok_or(DomainError::NxDomain)
    }

    async fn lookup(
        &self,
        _state: &Request<'_>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Message, DomainError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let answers = self
            .upstream
            .read()
            .await
            .get(&(name.to_string(), qtype))
            .cloned()
            .ok_or_else(|| DomainError::Backend(format!("no upstream answer for {}", name)))?;
        let mut msg = Message::new();
        msg.insert_answers(answers);
        Ok(msg)
    }

    async fn records(
        &self,
        state: &Request<'_>,
        exact: bool,
    ) -> Result<Vec<Service>, DomainError> {
        self.services(state, exact, &Options::default()).await
    }

    fn is_name_error(&self, err: &DomainError) -> bool {
        matches!(err, DomainError::NxDomain)
    }

    fn serial(&self, _state: &Request<'_>) -> u32 {
        1_700_000_000
    }

    fn min_ttl(&self, _state: &Request<'_>) -> u32 {
        self.min_ttl
    }
}
