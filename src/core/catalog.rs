//! Part catalog - resolves part ids and supplies BOM edges
//!
//! The catalog is owned by the surrounding PLM system. The engine only reads
//! it: once when a change order is created (to snapshot affected parts) and
//! when impact analysis needs the BOM graph.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

use crate::entities::part::{BomEdge, PartRecord};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse part file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("duplicate part id '{id}' in {path}")]
    DuplicatePart { id: String, path: String },

    #[error("invalid BOM edge file: {0}")]
    Csv(#[from] csv::Error),
}

pub trait PartCatalog {
    fn part(&self, id: &str) -> Option<PartRecord>;

    /// Every edge known to the catalog
    fn edges(&self) -> Vec<BomEdge>;

    /// Edges reachable from `root` by following parent-to-child links
    fn bom_edges(&self, root: &str) -> Vec<BomEdge> {
        let all = self.edges();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([root.to_string()]);
        let mut reachable = Vec::new();

        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            for edge in all.iter().filter(|e| e.parent_id == node) {
                reachable.push(edge.clone());
                queue.push_back(edge.child_id.clone());
            }
        }
        reachable
    }
}

/// Catalog held in memory, optionally loaded from `parts/**/*.yaml`
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    parts: BTreeMap<String, PartRecord>,
    extra_edges: Vec<BomEdge>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, part: PartRecord) {
        self.parts.insert(part.id.clone(), part);
    }

    pub fn with_part(mut self, part: PartRecord) -> Self {
        self.insert(part);
        self
    }

    /// Add an edge that is not written inside a part file
    pub fn add_edge(&mut self, edge: BomEdge) {
        self.extra_edges.push(edge);
    }

    pub fn with_edge(mut self, parent: &str, child: &str) -> Self {
        self.add_edge(BomEdge::new(parent, child));
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> impl Iterator<Item = &PartRecord> {
        self.parts.values()
    }

    /// Load every `.yaml` part file below `dir`
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        if !dir.exists() {
            return Ok(catalog);
        }

        for entry in WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map_or(false, |ext| ext == "yaml" || ext == "yml")
            })
        {
            let path = entry.path().display().to_string();
            let contents = fs::read_to_string(entry.path()).map_err(|e| CatalogError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let part: PartRecord =
                serde_yml::from_str(&contents).map_err(|e| CatalogError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            if catalog.parts.contains_key(&part.id) {
                return Err(CatalogError::DuplicatePart { id: part.id, path });
            }
            catalog.insert(part);
        }

        tracing::debug!(dir = %dir.display(), parts = catalog.len(), "loaded part catalog");
        Ok(catalog)
    }

    /// Import edges from CSV with header `parent_id,child_id,quantity,unit,position`
    pub fn import_edges_csv<R: std::io::Read>(&mut self, reader: R) -> Result<usize, CatalogError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut count = 0;
        for record in rdr.deserialize() {
            let edge: BomEdge = record?;
            self.add_edge(edge);
            count += 1;
        }
        Ok(count)
    }
}

impl PartCatalog for MemoryCatalog {
    fn part(&self, id: &str) -> Option<PartRecord> {
        self.parts.get(id).cloned()
    }

    fn edges(&self) -> Vec<BomEdge> {
        self.parts
            .values()
            .flat_map(PartRecord::edges)
            .chain(self.extra_edges.iter().cloned())
            .collect()
    }
}
