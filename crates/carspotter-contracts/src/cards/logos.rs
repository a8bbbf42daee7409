use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct LogoEntry {
    name: String,
    logo: String,
}

/// Make name to logo URL, loaded from a `[{"name", "logo"}]` JSON array.
#[derive(Debug, Clone, Default)]
pub struct LogoCatalog {
    logos: IndexMap<String, String>,
}

impl LogoCatalog {
    /// A missing file yields an empty catalog; unreadable JSON is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read logo catalog {}", path.display()))?;
        let entries: Vec<LogoEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("logo catalog {} is not a list of logos", path.display()))?;
        Ok(Self::from_pairs(
            entries.into_iter().map(|entry| (entry.name, entry.logo)),
        ))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            logos: pairs.into_iter().collect(),
        }
    }

    pub fn logo_for(&self, make: &str) -> Option<&str> {
        let make = make.trim();
        self.logos
            .get(make)
            .or_else(|| {
                self.logos
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(make))
                    .map(|(_, logo)| logo)
            })
            .map(String::as_str)
    }
}
