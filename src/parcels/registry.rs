use anyhow::anyhow;
use serde::Deserialize;
use std::collections::HashSet;

/// Owner keys and the attribute filters used when no config file overrides them.
const DEFAULT_OWNER_FILTERS: [(&str, &str); 5] = [
    ("harquahala", "OWNER_NAME = 'CV HARQUAHALA LLC'"),
    ("courthouse-ag", "OWNER_NAME = 'COURTHOUSE AG HOLDINGS LLC'"),
    (
        "verma",
        "OWNER_NAME LIKE '% VERMA%' or OWNER_NAME LIKE 'VERMA%'",
    ),
    ("vidler", "OWNER_NAME LIKE '%VIDLER%'"),
    ("wpi", "OWNER_NAME LIKE '%WPI%'"),
];

/// An owner key paired with the attribute filter that selects the owner's parcels.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub owner: String,
    pub predicate: String,
}

impl FilterEntry {
    pub fn new(owner: &str, predicate: &str) -> Self {
        Self {
            owner: owner.to_string(),
            predicate: predicate.to_string(),
        }
    }
}

/// Ordered, read-only list of filter entries. Predicates are passed to the feature service as-is,
/// only the owner keys are checked because they become file names.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "Vec<FilterEntry>")]
pub struct FilterRegistry {
    entries: Vec<FilterEntry>,
}

impl FilterRegistry {
    pub fn new(entries: Vec<FilterEntry>) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            validate_owner_key(&entry.owner)?;
            if !seen.insert(entry.owner.as_str()) {
                return Err(anyhow!("Owner key '{}' is listed twice", entry.owner));
            }
        }
        Ok(Self { entries })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, owner: &str) -> Option<&FilterEntry> {
        self.entries.iter().find(|entry| entry.owner == owner)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self {
            entries: DEFAULT_OWNER_FILTERS
                .iter()
                .map(|(owner, predicate)| FilterEntry::new(owner, predicate))
                .collect(),
        }
    }
}

impl TryFrom<Vec<FilterEntry>> for FilterRegistry {
    type Error = anyhow::Error;

    fn try_from(entries: Vec<FilterEntry>) -> anyhow::Result<Self> {
        Self::new(entries)
    }
}

impl<'a> IntoIterator for &'a FilterRegistry {
    type Item = &'a FilterEntry;
    type IntoIter = std::slice::Iter<'a, FilterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Check that an owner key can be used as a file stem inside the data directory.
pub fn validate_owner_key(owner: &str) -> anyhow::Result<()> {
    if owner.is_empty() {
        return Err(anyhow!("Owner key must not be empty"));
    }
    if owner.starts_with('.') {
        return Err(anyhow!("Owner key '{}' must not start with '.'", owner));
    }
    if let Some(invalid) = owner
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(anyhow!(
            "Owner key '{}' contains the character {:?}, which is not allowed in file names",
            owner,
            invalid
        ));
    }
    Ok(())
}
