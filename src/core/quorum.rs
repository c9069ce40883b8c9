//! Approver quorum - derives one outcome from individual approver votes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::change_order::{ApprovalStatus, Approver, Decision};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not an approver on this change order")]
pub struct UnknownApprover(pub String);

/// Aggregate outcome of all votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuorumOutcome {
    Pending,
    Approved,
    Rejected,
}

/// What a single vote did to the quorum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteEffect {
    /// The approver's status before this vote
    pub previous: ApprovalStatus,
    /// Whether the stored vote changed (a repeated identical vote is a no-op)
    pub changed: bool,
    pub outcome: QuorumOutcome,
}

/// Ordered approver list of one change order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproverQuorum {
    approvers: Vec<Approver>,
}

impl ApproverQuorum {
    pub fn new(approvers: Vec<Approver>) -> Self {
        Self { approvers }
    }

    pub fn approvers(&self) -> &[Approver] {
        &self.approvers
    }

    pub fn len(&self) -> usize {
        self.approvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvers.is_empty()
    }

    pub fn find(&self, key: &str) -> Option<&Approver> {
        self.approvers.iter().find(|a| a.matches(key))
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.approvers.iter().any(|a| a.user_id == user_id)
    }

    /// Append an approver; returns false if the user is already listed
    pub fn add(&mut self, approver: Approver) -> bool {
        if self.contains_user(&approver.user_id) {
            return false;
        }
        self.approvers.push(approver);
        true
    }

    /// Remove an approver by user or record id
    pub fn remove(&mut self, key: &str) -> Option<Approver> {
        let idx = self.approvers.iter().position(|a| a.matches(key))?;
        Some(self.approvers.remove(idx))
    }

    /// Record a vote. Once the aggregate is rejected, later votes are still
    /// stored but a rejection already cast is never withdrawn.
    pub fn vote(
        &mut self,
        approver: &str,
        decision: Decision,
        comment: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<VoteEffect, UnknownApprover> {
        let locked = self.aggregate() == QuorumOutcome::Rejected;
        let entry = self
            .approvers
            .iter_mut()
            .find(|a| a.matches(approver))
            .ok_or_else(|| UnknownApprover(approver.to_string()))?;

        let previous = entry.status;
        let status = decision.as_status();
        let changed = previous != status && !(locked && previous == ApprovalStatus::Rejected);
        if changed {
            entry.status = status;
            entry.reviewed_at = Some(at);
        }
        if let Some(c) = comment {
            entry.comment = Some(c.to_string());
        }

        Ok(VoteEffect {
            previous,
            changed,
            outcome: self.aggregate(),
        })
    }

    /// `rejected` as soon as anyone rejected, `approved` when everyone
    /// approved, otherwise `pending`
    pub fn aggregate(&self) -> QuorumOutcome {
        if self
            .approvers
            .iter()
            .any(|a| a.status == ApprovalStatus::Rejected)
        {
            return QuorumOutcome::Rejected;
        }
        if !self.approvers.is_empty()
            && self
                .approvers
                .iter()
                .all(|a| a.status == ApprovalStatus::Approved)
        {
            return QuorumOutcome::Approved;
        }
        QuorumOutcome::Pending
    }

    pub fn pending(&self) -> impl Iterator<Item = &Approver> {
        self.approvers
            .iter()
            .filter(|a| a.status == ApprovalStatus::Pending)
    }
}
