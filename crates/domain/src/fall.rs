use crate::dnsutil::normalize;
use crate::zones::matches;

/// Zones for which a plugin hands a not-found answer to the next plugin
/// instead of answering NXDOMAIN itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fall {
    zones: Vec<String>,
}

impl Fall {
    /// Never falls through.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Falls through for every name.
    pub fn root() -> Self {
        Self {
            zones: vec![".".to_string()],
        }
    }

    /// Maps the `fallthrough` configuration knob: absent means never, an
    /// empty list means everything, otherwise only the listed zones.
    pub fn from_config(zones: Option<&[String]>) -> Self {
        match zones {
            None => Self::zero(),
            Some([]) => Self::root(),
            Some(list) => Self {
                zones: list.iter().map(|z| normalize(z)).collect(),
            },
        }
    }

    pub fn through(&self, name: &str) -> bool {
        matches(&self.zones, name).is_some()
    }

    pub fn is_zero(&self) -> bool {
        self.zones.is_empty()
    }
}
