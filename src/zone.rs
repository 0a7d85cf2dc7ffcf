//! The set of zones a resolver answers for.

use crate::error::ConfigError;
use crate::rr::{LowerName, Name};

/// Matches query names against the configured zones.
///
/// Zones are held sorted by label count, deepest first, so the first zone
/// containing a name is also the longest match.
#[derive(Debug, Clone)]
pub struct ZoneMatcher {
    zones: Vec<LowerName>,
}

impl ZoneMatcher {
    /// Normalize and store a set of zone names.
    ///
    /// Each zone is trimmed, lowercased and made fully qualified. Duplicates are
    /// collapsed. An empty set is a configuration error.
    pub fn new<I, S>(zones: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<LowerName> = Vec::new();
        for zone in zones {
            let zone = normalize(zone.as_ref())?;
            if !normalized.contains(&zone) {
                normalized.push(zone);
            }
        }

        if normalized.is_empty() {
            return Err(ConfigError::NoZones);
        }

        normalized.sort_by(|a, b| b.num_labels().cmp(&a.num_labels()));
        Ok(Self { zones: normalized })
    }

    /// The longest configured zone containing `name`, if any.
    pub fn matches(&self, name: &LowerName) -> Option<&LowerName> {
        self.zones.iter().find(|zone| zone.zone_of(name))
    }

    pub fn zones(&self) -> &[LowerName] {
        &self.zones
    }
}

fn normalize(zone: &str) -> Result<LowerName, ConfigError> {
    let mut text = zone.trim().to_ascii_lowercase();
    if !text.ends_with('.') {
        text.push('.');
    }

    let name = Name::from_utf8(&text).map_err(|source| ConfigError::InvalidZone {
        zone: zone.to_owned(),
        source,
    })?;
    Ok(LowerName::new(&name))
}
