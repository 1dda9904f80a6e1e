#![allow(dead_code)]

use async_trait::async_trait;
use chaindns_application::ports::Refresher;
use chaindns_domain::DomainError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts refreshes; fails every call when `fail` is set.
#[derive(Default)]
pub struct CountingRefresher {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingRefresher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresher for CountingRefresher {
    async fn refresh(&self) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DomainError::Backend("unreachable".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}
