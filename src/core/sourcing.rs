//! Manufacturer and supplier links for parts

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Kind of source a part can be linked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Manufacturer,
    Supplier,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Manufacturer => write!(f, "manufacturer"),
            SourceKind::Supplier => write!(f, "supplier"),
        }
    }
}

/// Known sources of one kind and the parts linked to each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    #[serde(default)]
    pub known: BTreeSet<String>,
    /// part id -> source names
    #[serde(default)]
    pub links: BTreeMap<String, BTreeSet<String>>,
}

/// Sourcing links for every part, persisted as `.tcc/sourcing.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcingBook {
    #[serde(default)]
    pub manufacturers: SourceTable,
    #[serde(default)]
    pub suppliers: SourceTable,
}

impl SourcingBook {
    fn table(&self, kind: SourceKind) -> &SourceTable {
        match kind {
            SourceKind::Manufacturer => &self.manufacturers,
            SourceKind::Supplier => &self.suppliers,
        }
    }

    fn table_mut(&mut self, kind: SourceKind) -> &mut SourceTable {
        match kind {
            SourceKind::Manufacturer => &mut self.manufacturers,
            SourceKind::Supplier => &mut self.suppliers,
        }
    }

    /// Every known source of this kind
    pub fn list(&self, kind: SourceKind) -> Vec<String> {
        self.table(kind).known.iter().cloned().collect()
    }

    /// Sources of this kind linked to `part_id`
    pub fn linked(&self, kind: SourceKind, part_id: &str) -> Vec<String> {
        self.table(kind)
            .links
            .get(part_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Link a source to a part; false if the link already existed
    pub fn link(&mut self, kind: SourceKind, part_id: &str, source: &str) -> bool {
        let table = self.table_mut(kind);
        table.known.insert(source.to_string());
        table
            .links
            .entry(part_id.to_string())
            .or_default()
            .insert(source.to_string())
    }

    /// Remove a link; false if there was nothing to remove
    pub fn unlink(&mut self, kind: SourceKind, part_id: &str, source: &str) -> bool {
        let table = self.table_mut(kind);
        let Some(sources) = table.links.get_mut(part_id) else {
            return false;
        };
        let removed = sources.remove(source);
        if sources.is_empty() {
            table.links.remove(part_id);
        }
        removed
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_yml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let contents = serde_yml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)
    }
}
