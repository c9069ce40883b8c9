//! Entity trait and the status/priority vocabularies shared by change orders

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::core::identity::EntityId;

/// Common trait for persisted records
pub trait Entity: Serialize + DeserializeOwned {
    /// Get the record's unique ID
    fn id(&self) -> &EntityId;

    /// Get the record's title
    fn title(&self) -> &str;

    /// Get the record's status
    fn status(&self) -> &str;

    /// Get the creation timestamp
    fn created(&self) -> DateTime<Utc>;

    /// Get the author
    fn author(&self) -> &str;
}

/// Lifecycle status of a change order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ChangeStatus {
    #[default]
    Draft,
    Submitted,
    InReview,
    Approved,
    Rejected,
    Implemented,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Draft => "draft",
            ChangeStatus::Submitted => "submitted",
            ChangeStatus::InReview => "in_review",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Rejected => "rejected",
            ChangeStatus::Implemented => "implemented",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChangeStatus::Rejected | ChangeStatus::Implemented)
    }

    pub fn all() -> &'static [ChangeStatus] {
        &[
            ChangeStatus::Draft,
            ChangeStatus::Submitted,
            ChangeStatus::InReview,
            ChangeStatus::Approved,
            ChangeStatus::Rejected,
            ChangeStatus::Implemented,
        ]
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "draft" => Ok(ChangeStatus::Draft),
            "submitted" => Ok(ChangeStatus::Submitted),
            "in_review" => Ok(ChangeStatus::InReview),
            "approved" => Ok(ChangeStatus::Approved),
            "rejected" => Ok(ChangeStatus::Rejected),
            "implemented" => Ok(ChangeStatus::Implemented),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Change order kind
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    /// Engineering change request
    Ecr,
    /// Engineering change notice
    Ecn,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Ecr => "ECR",
            ChangeType::Ecn => "ECN",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ECR" => Ok(ChangeType::Ecr),
            "ECN" => Ok(ChangeType::Ecn),
            _ => Err(format!("Unknown change type: {}", s)),
        }
    }
}

/// Priority of a change order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}
