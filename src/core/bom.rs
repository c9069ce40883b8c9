//! BOM graph consistency checks used for change impact analysis

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::entities::part::BomEdge;

/// Direct parents of `part_id` (not transitive), in first-seen order
pub fn find_where_used(part_id: &str, edges: &[BomEdge]) -> Vec<String> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|e| e.child_id == part_id)
        .filter(|e| seen.insert(e.parent_id.as_str()))
        .map(|e| e.parent_id.clone())
        .collect()
}

/// A problem found while walking a BOM tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BomIssue {
    RootNotFound { id: String },
    /// Back-edge onto the current path; `path` ends with the repeated node
    Cycle { path: Vec<String> },
    MissingPart { id: String, parent: String },
    MaxDepthExceeded { id: String, max_depth: usize },
}

impl BomIssue {
    pub fn is_cycle(&self) -> bool {
        matches!(self, BomIssue::Cycle { .. })
    }
}

impl fmt::Display for BomIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BomIssue::RootNotFound { id } => write!(f, "Root part {} not found", id),
            BomIssue::Cycle { path } => write!(f, "Cycle detected: {}", path.join(" -> ")),
            BomIssue::MissingPart { id, parent } => {
                write!(f, "Part {} not found (referenced by {})", id, parent)
            }
            BomIssue::MaxDepthExceeded { id, max_depth } => {
                write!(f, "Maximum depth {} exceeded at part {}", max_depth, id)
            }
        }
    }
}

/// Result of [`validate_bom_tree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BomValidation {
    pub valid: bool,
    pub errors: Vec<BomIssue>,
}

impl BomValidation {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn first_cycle(&self) -> Option<&BomIssue> {
        self.errors.iter().find(|e| e.is_cycle())
    }
}

/// Depth-first walk from `root_id` collecting every problem found.
///
/// Only nodes on the current path count as visited, so a part reached by two
/// independent paths (a diamond) is fine while a back-edge is a cycle.
pub fn validate_bom_tree<P>(
    root_id: &str,
    parts_by_id: &HashMap<String, P>,
    edges: &[BomEdge],
    max_depth: usize,
) -> BomValidation {
    let mut children: HashMap<&str, Vec<&BomEdge>> = HashMap::new();
    for edge in edges {
        children.entry(edge.parent_id.as_str()).or_default().push(edge);
    }

    let mut walk = Walk {
        parts: parts_by_id,
        children,
        max_depth,
        path: Vec::new(),
        errors: Vec::new(),
    };

    if !parts_by_id.contains_key(root_id) {
        walk.report(BomIssue::RootNotFound {
            id: root_id.to_string(),
        });
    }
    walk.visit(root_id, 0);

    tracing::debug!(root = root_id, issues = walk.errors.len(), "validated BOM tree");
    BomValidation {
        valid: walk.errors.is_empty(),
        errors: walk.errors,
    }
}

struct Walk<'a, P> {
    parts: &'a HashMap<String, P>,
    children: HashMap<&'a str, Vec<&'a BomEdge>>,
    max_depth: usize,
    path: Vec<&'a str>,
    errors: Vec<BomIssue>,
}

impl<'a, P> Walk<'a, P> {
    fn report(&mut self, issue: BomIssue) {
        if !self.errors.contains(&issue) {
            self.errors.push(issue);
        }
    }

    fn visit(&mut self, node: &'a str, depth: usize) {
        if depth > self.max_depth {
            self.report(BomIssue::MaxDepthExceeded {
                id: node.to_string(),
                max_depth: self.max_depth,
            });
            return;
        }

        self.path.push(node);
        let edges = self.children.get(node).cloned().unwrap_or_default();
        for edge in edges {
            let child = edge.child_id.as_str();
            if !self.parts.contains_key(child) {
                self.report(BomIssue::MissingPart {
                    id: child.to_string(),
                    parent: node.to_string(),
                });
                continue;
            }
            if self.path.contains(&child) {
                let mut cycle: Vec<String> = self
                    .path
                    .iter()
                    .skip_while(|p| **p != child)
                    .map(|p| p.to_string())
                    .collect();
                cycle.push(child.to_string());
                self.report(BomIssue::Cycle { path: cycle });
                continue;
            }
            self.visit(child, depth + 1);
        }
        self.path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(ids: &[&str]) -> HashMap<String, ()> {
        ids.iter().map(|id| (id.to_string(), ())).collect()
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<BomEdge> {
        pairs.iter().map(|(p, c)| BomEdge::new(*p, *c)).collect()
    }

    #[test]
    fn test_where_used_direct_parents_only() {
        let e = edges(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("B", "D")]);
        let mut used = find_where_used("D", &e);
        used.sort();
        assert_eq!(used, vec!["B", "C"]);
        assert_eq!(find_where_used("B", &e), vec!["A"]);
        assert!(find_where_used("A", &e).is_empty());
        assert!(find_where_used("nope", &e).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let e = edges(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let result = validate_bom_tree("A", &parts(&["A", "B", "C"]), &e, 10);
        assert!(!result.valid);
        assert!(result.messages().iter().any(|m| m.contains("Cycle")));
        assert_eq!(
            result.first_cycle(),
            Some(&BomIssue::Cycle {
                path: vec!["A".into(), "B".into(), "C".into(), "A".into()]
            })
        );
    }

    #[test]
    fn test_diamond_is_valid() {
        let e = edges(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]);
        let result = validate_bom_tree("A", &parts(&["A", "B", "C", "D"]), &e, 10);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let e = edges(&[("A", "A")]);
        let result = validate_bom_tree("A", &parts(&["A"]), &e, 10);
        assert!(!result.valid);
        assert!(result.errors[0].to_string().contains("Cycle"));
    }

    #[test]
    fn test_missing_root() {
        let result = validate_bom_tree("X", &parts(&["A"]), &[], 10);
        assert!(!result.valid);
        assert_eq!(result.messages(), vec!["Root part X not found"]);
    }

    #[test]
    fn test_missing_child_reported_with_id() {
        let e = edges(&[("A", "B"), ("A", "GHOST")]);
        let result = validate_bom_tree("A", &parts(&["A", "B"]), &e, 10);
        assert!(!result.valid);
        let msg = &result.messages()[0];
        assert!(msg.contains("GHOST"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_max_depth() {
        let e = edges(&[("A", "B"), ("B", "C"), ("C", "D"), ("D", "E")]);
        let all = parts(&["A", "B", "C", "D", "E"]);

        assert!(validate_bom_tree("A", &all, &e, 4).valid);

        let shallow = validate_bom_tree("A", &all, &e, 3);
        assert!(!shallow.valid);
        assert!(shallow.messages()[0].contains("Maximum depth"));
    }

    #[test]
    fn test_errors_accumulate() {
        let e = edges(&[("A", "B"), ("B", "A"), ("A", "MISSING")]);
        let result = validate_bom_tree("A", &parts(&["A", "B"]), &e, 10);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|i| i.is_cycle()));
        assert!(result
            .errors
            .iter()
            .any(|i| matches!(i, BomIssue::MissingPart { id, .. } if id == "MISSING")));
    }
}
