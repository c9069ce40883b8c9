//! Part catalog records and BOM edges

use serde::{Deserialize, Serialize};

/// A part as known to the catalog (one YAML file under `parts/`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    /// Catalog identifier
    pub id: String,

    /// Part number as printed on drawings
    pub part_number: String,

    /// Descriptive name
    pub name: String,

    /// Classification (mechanical, electrical, ...)
    #[serde(default)]
    pub category: String,

    /// Lifecycle status reported by the catalog
    #[serde(default = "default_part_status")]
    pub status: String,

    /// Current letter revision, absent before first release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Child lines of this part's bill of materials
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bom: Vec<BomLine>,
}

fn default_part_status() -> String {
    "active".to_string()
}

impl PartRecord {
    pub fn new(id: impl Into<String>, part_number: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            part_number: part_number.into(),
            name: name.into(),
            category: String::new(),
            status: default_part_status(),
            revision: None,
            bom: Vec::new(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Directed edges from this part to each BOM child
    pub fn edges(&self) -> Vec<BomEdge> {
        self.bom
            .iter()
            .enumerate()
            .map(|(idx, line)| BomEdge {
                parent_id: self.id.clone(),
                child_id: line.child_id.clone(),
                quantity: line.quantity,
                unit: line.unit.clone(),
                position: line.position.unwrap_or(idx as u32 + 1),
            })
            .collect()
    }
}

/// One child line inside a part file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub child_id: String,

    #[serde(default = "default_quantity")]
    pub quantity: f64,

    #[serde(default = "default_unit")]
    pub unit: String,

    /// Find number; defaults to the line's order in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

fn default_quantity() -> f64 {
    1.0
}

fn default_unit() -> String {
    "ea".to_string()
}

/// "parent contains quantity of child"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomEdge {
    pub parent_id: String,
    pub child_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub position: u32,
}

impl BomEdge {
    pub fn new(parent_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            quantity: default_quantity(),
            unit: default_unit(),
            position: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_yaml_defaults() {
        let part: PartRecord = serde_yml::from_str(
            r#"
id: ASM-100
part_number: "100-0001"
name: Gearbox
revision: B
bom:
  - child_id: CMP-200
    quantity: 4
  - child_id: CMP-300
    unit: mm
    position: 20
"#,
        )
        .unwrap();

        assert_eq!(part.status, "active");
        assert_eq!(part.revision.as_deref(), Some("B"));

        let edges = part.edges();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].parent_id, "ASM-100");
        assert_eq!(edges[0].quantity, 4.0);
        assert_eq!(edges[0].unit, "ea");
        assert_eq!(edges[0].position, 1);
        assert_eq!(edges[1].position, 20);
        assert_eq!(edges[1].unit, "mm");
    }
}
