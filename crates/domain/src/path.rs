//! Mapping between DNS names and hierarchical store keys.
//!
//! `a.example.org.` under prefix `skydns` lives at `/skydns/org/example/a`.

use crate::dnsutil::{join, split_labels};

fn key_for(prefix: &str, labels: &[&str]) -> String {
    let prefix = prefix.trim_matches('/');
    let mut key = format!("/{}", prefix);
    for label in labels {
        key.push('/');
        key.push_str(label);
    }
    key
}

/// Converts a domain name into a store key under `prefix`.
pub fn path(name: &str, prefix: &str) -> String {
    let mut labels = split_labels(name);
    labels.reverse();
    key_for(prefix, &labels)
}

/// Like [`path`], but stops at the first `*` or `any` label. The flag reports
/// whether a wildcard was found.
pub fn path_with_wildcard(name: &str, prefix: &str) -> (String, bool) {
    let mut labels = split_labels(name);
    labels.reverse();
    match labels.iter().position(|l| *l == "*" || *l == "any") {
        Some(i) => (key_for(prefix, &labels[..i]), true),
        None => (key_for(prefix, &labels), false),
    }
}

/// Converts a store key back into a domain name. The first path element is
/// the prefix and is dropped.
pub fn domain(key: &str) -> String {
    let mut parts: Vec<&str> = key.split('/').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    if parts.len() < 2 {
        return ".".to_string();
    }
    let mut labels: Vec<&str> = parts[2..].to_vec();
    labels.reverse();
    join(&labels)
}
