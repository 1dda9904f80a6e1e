use chaindns_application::ports::MetricsSink;
use dashmap::DashMap;
use tracing::trace;

/// In-process counters, one entry per name and label set.
#[derive(Debug, Default)]
pub struct TracingMetrics {
    counters: DashMap<String, u64>,
}

impl TracingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, 0 when it was never incremented.
    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .get(&counter_key(name, labels))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Sorted copy of every counter.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut all: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort();
        all
    }
}

impl MetricsSink for TracingMetrics {
    fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let key = counter_key(name, labels);
        let mut value = self.counters.entry(key).or_insert(0);
        *value += 1;
        trace!(counter = %value.key(), value = *value, "Counter incremented");
    }
}

// name{a="1",b="2"}, labels in the order given
fn counter_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let labels: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{}{{{}}}", name, labels.join(","))
}
