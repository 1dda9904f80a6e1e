use crate::dnsutil::{is_sub_domain, normalize};

/// Returns the longest zone in `zones` that `name` falls under.
pub fn matches<'a, S: AsRef<str>>(zones: &'a [S], name: &str) -> Option<&'a str> {
    let mut best: Option<&'a str> = None;
    for zone in zones {
        let zone = zone.as_ref();
        if !is_sub_domain(zone, name) {
            continue;
        }
        match best {
            Some(b) if b.len() >= zone.len() => {}
            _ => best = Some(zone),
        }
    }
    best
}

/// Zone suffixes a plugin instance is authoritative for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zones(Vec<String>);

impl Zones {
    pub fn new<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(zones.into_iter().map(|z| normalize(z.as_ref())).collect())
    }

    pub fn matches(&self, name: &str) -> Option<&str> {
        matches(&self.0, name)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
