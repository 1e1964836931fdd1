use std::collections::BTreeMap;
use tracing::warn;
use warboard_protocol::TeamKey;

/// User-chosen display names keyed by canonical team key. A missing entry
/// means the key itself is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamNames {
    overrides: BTreeMap<TeamKey, String>,
}

impl TeamNames {
    /// Builds overrides from stored or imported string keys. Legacy team
    /// names are folded onto their canonical key; the flag reports whether
    /// any were seen.
    pub fn from_raw(raw: BTreeMap<String, String>) -> (Self, bool) {
        let mut migrated = false;
        let mut overrides = BTreeMap::new();
        for (key, name) in raw {
            if TeamKey::is_legacy_name(&key) {
                migrated = true;
            }
            match key.parse::<TeamKey>() {
                Ok(team) => {
                    overrides.insert(team, name);
                }
                Err(err) => warn!(%err, "dropping team name override"),
            }
        }
        (TeamNames { overrides }, migrated)
    }

    pub fn to_raw(&self) -> BTreeMap<String, String> {
        self.overrides
            .iter()
            .map(|(team, name)| (team.as_str().to_string(), name.clone()))
            .collect()
    }

    pub fn display_name(&self, team: TeamKey) -> &str {
        self.overrides
            .get(&team)
            .map_or(team.as_str(), String::as_str)
    }

    /// Empty names are ignored. Renaming a team back to its key clears the
    /// override. Returns whether anything changed.
    pub fn rename(&mut self, team: TeamKey, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if name == team.as_str() {
            return self.overrides.remove(&team).is_some();
        }
        self.overrides.insert(team, name.to_string()).as_deref() != Some(name)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
