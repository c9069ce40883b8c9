//! Change order entity - ECR/ECN with approvers and affected parts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{ChangeStatus, ChangeType, Entity, Priority};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::quorum::ApproverQuorum;
use crate::entities::part::PartRecord;

/// Caller-supplied fields for a new change order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOrderInput {
    pub project_id: String,

    #[serde(rename = "type")]
    pub change_type: ChangeType,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub reason: String,

    #[serde(default)]
    pub priority: Priority,

    /// User ids of the approvers, in review order
    #[serde(default)]
    pub approver_ids: Vec<String>,

    #[serde(default)]
    pub affected_part_ids: Vec<String>,

    /// A rejected change order this one replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<EntityId>,
}

impl ChangeOrderInput {
    pub fn new(
        project_id: impl Into<String>,
        change_type: ChangeType,
        title: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            change_type,
            title: title.into(),
            description: String::new(),
            reason: reason.into(),
            priority: Priority::default(),
            approver_ids: Vec::new(),
            affected_part_ids: Vec::new(),
            supersedes: None,
        }
    }

    pub fn with_approvers<I, S>(mut self, approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approver_ids = approvers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_part_ids = parts.into_iter().map(Into::into).collect();
        self
    }
}

/// Review state of one approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A reviewer's vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_status(&self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// An approver assigned to a change order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approver {
    pub id: EntityId,
    pub change_order_id: EntityId,
    pub user_id: String,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Approver {
    pub fn new(change_order_id: &EntityId, user_id: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Apr),
            change_order_id: change_order_id.clone(),
            user_id: user_id.into(),
            status: ApprovalStatus::Pending,
            comment: None,
            reviewed_at: None,
        }
    }

    /// Matches either the approver record id or the user id
    pub fn matches(&self, key: &str) -> bool {
        self.user_id == key || self.id.to_string() == key
    }
}

/// Catalog snapshot of a part, frozen when the change order is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedPart {
    pub change_order_id: EntityId,
    pub part_id: String,
    pub part_number: String,
    pub name: String,
    pub category: String,
    pub status_snapshot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_snapshot: Option<String>,
}

impl AffectedPart {
    pub fn snapshot(change_order_id: &EntityId, part: &PartRecord) -> Self {
        Self {
            change_order_id: change_order_id.clone(),
            part_id: part.id.clone(),
            part_number: part.part_number.clone(),
            name: part.name.clone(),
            category: part.category.clone(),
            status_snapshot: part.status.clone(),
            revision_snapshot: part.revision.clone(),
        }
    }
}

/// New revision allocated to one affected part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionAssignment {
    pub part_id: String,
    pub part_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_revision: Option<String>,
    pub to_revision: String,
    /// Direct parents of the part at implementation time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub where_used: Vec<String>,
}

/// Outcome of implementing a change order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationRecord {
    pub id: EntityId,
    pub implemented_by: String,
    pub implemented_at: DateTime<Utc>,
    pub assignments: Vec<RevisionAssignment>,
}

/// Engineering change request / notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeOrder {
    /// Unique identifier (ECR-... or ECN-...)
    pub id: EntityId,

    #[serde(rename = "type")]
    pub change_type: ChangeType,

    /// Sequential number within the project
    pub number: u32,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub reason: String,

    #[serde(default)]
    pub status: ChangeStatus,

    #[serde(default)]
    pub priority: Priority,

    pub project_id: String,

    pub created_by: String,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    /// Ordered approver list with their votes
    #[serde(default)]
    pub approvers: ApproverQuorum,

    #[serde(default)]
    pub affected_parts: Vec<AffectedPart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<EntityId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<ImplementationRecord>,

    /// Optimistic concurrency counter, bumped on every commit
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl ChangeOrder {
    /// Human-facing number, e.g. `ECR-0007`
    pub fn display_number(&self) -> String {
        format!("{}-{:04}", self.change_type, self.number)
    }
}

impl Entity for ChangeOrder {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn status(&self) -> &str {
        self.status.as_str()
    }

    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn author(&self) -> &str {
        &self.created_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_yaml() {
        let input: ChangeOrderInput = serde_yml::from_str(
            r#"
project_id: gearbox
type: ECN
title: Swap bearing supplier
reason: Obsolescence
priority: urgent
approver_ids: [alice, bob]
"#,
        )
        .unwrap();
        assert_eq!(input.change_type, ChangeType::Ecn);
        assert_eq!(input.priority, Priority::Urgent);
        assert_eq!(input.approver_ids, vec!["alice", "bob"]);
        assert!(input.affected_part_ids.is_empty());
    }

    #[test]
    fn test_snapshot_copies_catalog_fields() {
        let co = EntityId::new(EntityPrefix::Ecr);
        let part = PartRecord::new("CMP-1", "200-0001", "Shaft").with_revision("B");
        let snap = AffectedPart::snapshot(&co, &part);
        assert_eq!(snap.change_order_id, co);
        assert_eq!(snap.part_number, "200-0001");
        assert_eq!(snap.revision_snapshot.as_deref(), Some("B"));
        assert_eq!(snap.status_snapshot, "active");
    }

    #[test]
    fn test_approver_matches_user_or_record_id() {
        let co = EntityId::new(EntityPrefix::Ecr);
        let approver = Approver::new(&co, "alice");
        assert!(approver.matches("alice"));
        assert!(approver.matches(&approver.id.to_string()));
        assert!(!approver.matches("bob"));
    }
}
