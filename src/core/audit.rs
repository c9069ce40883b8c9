//! Append-only audit trail
//!
//! Every state-changing operation on a change order appends exactly one
//! [`AuditEntry`]. Entries are numbered per change order starting at 1 and
//! chained with SHA-256 digests so that edits made behind the ledger's back
//! are detectable with [`verify_chain`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;

use crate::core::entity::ChangeStatus;
use crate::core::identity::{EntityId, EntityPrefix};

/// Kind of operation recorded in the trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Created,
    ApproverAdded,
    ApproverRemoved,
    Submitted,
    AcceptedForReview,
    ApprovalRecorded,
    Approved,
    Rejected,
    Implemented,
    Deleted,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Created => "created",
            AuditEvent::ApproverAdded => "approver_added",
            AuditEvent::ApproverRemoved => "approver_removed",
            AuditEvent::Submitted => "submitted",
            AuditEvent::AcceptedForReview => "accepted_for_review",
            AuditEvent::ApprovalRecorded => "approval_recorded",
            AuditEvent::Approved => "approved",
            AuditEvent::Rejected => "rejected",
            AuditEvent::Implemented => "implemented",
            AuditEvent::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry waiting to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub change_order_id: EntityId,
    pub actor_id: String,
    pub event: AuditEvent,
    pub from_status: Option<ChangeStatus>,
    pub to_status: ChangeStatus,
    pub comment: Option<String>,
}

impl NewAuditEntry {
    pub fn new(
        change_order_id: &EntityId,
        actor_id: &str,
        event: AuditEvent,
        from_status: Option<ChangeStatus>,
        to_status: ChangeStatus,
    ) -> Self {
        Self {
            change_order_id: change_order_id.clone(),
            actor_id: actor_id.to_string(),
            event,
            from_status,
            to_status,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<impl Into<String>>) -> Self {
        self.comment = comment.map(Into::into);
        self
    }

    /// Freeze the entry at `sequence`, chaining it to the previous digest
    pub fn seal(
        self,
        sequence: u32,
        previous_digest: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> AuditEntry {
        let mut entry = AuditEntry {
            id: EntityId::new(EntityPrefix::Aud),
            change_order_id: self.change_order_id,
            actor_id: self.actor_id,
            event: self.event,
            from_status: self.from_status,
            to_status: self.to_status,
            comment: self.comment,
            sequence,
            timestamp,
            digest: String::new(),
        };
        entry.digest = entry.compute_digest(previous_digest.unwrap_or(""));
        entry
    }
}

/// Immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EntityId,
    pub change_order_id: EntityId,
    pub actor_id: String,
    pub event: AuditEvent,
    pub from_status: Option<ChangeStatus>,
    pub to_status: ChangeStatus,
    pub comment: Option<String>,
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
    /// Hex SHA-256 over the previous digest and this entry's fields
    pub digest: String,
}

impl AuditEntry {
    fn compute_digest(&self, previous: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        for field in [
            self.id.to_string(),
            self.change_order_id.to_string(),
            self.actor_id.clone(),
            self.event.to_string(),
            self.from_status.map(|s| s.to_string()).unwrap_or_default(),
            self.to_status.to_string(),
            self.comment.clone().unwrap_or_default(),
            self.sequence.to_string(),
            self.timestamp.to_rfc3339(),
        ] {
            hasher.update([0x1f]);
            hasher.update(field.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit entry {sequence} is out of order (expected {expected})")]
    OutOfOrder { sequence: u32, expected: u32 },

    #[error("audit entry {sequence} does not match its digest")]
    DigestMismatch { sequence: u32 },
}

/// Check sequence numbering and the digest chain of one change order's entries
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), AuditError> {
    let mut previous = String::new();
    for (idx, entry) in entries.iter().enumerate() {
        let expected = idx as u32 + 1;
        if entry.sequence != expected {
            return Err(AuditError::OutOfOrder {
                sequence: entry.sequence,
                expected,
            });
        }
        if entry.compute_digest(&previous) != entry.digest {
            return Err(AuditError::DigestMismatch {
                sequence: entry.sequence,
            });
        }
        previous = entry.digest.clone();
    }
    Ok(())
}

/// Write entries as CSV with a header row
pub fn write_csv<W: Write>(entries: &[AuditEntry], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for entry in entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

/// In-memory ledger keyed by change order id
#[derive(Debug, Default, Clone)]
pub struct AuditTrail {
    entries: HashMap<EntityId, Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next sequence number and a timestamp
    pub fn append(&mut self, entry: NewAuditEntry) -> &AuditEntry {
        self.append_at(entry, Utc::now())
    }

    pub fn append_at(&mut self, entry: NewAuditEntry, timestamp: DateTime<Utc>) -> &AuditEntry {
        let log = self
            .entries
            .entry(entry.change_order_id.clone())
            .or_default();
        let sequence = log.len() as u32 + 1;
        let sealed = entry.seal(sequence, log.last().map(|e| e.digest.as_str()), timestamp);
        log.push(sealed);
        &log[log.len() - 1]
    }

    /// Entries for one change order in sequence order
    pub fn list(&self, change_order_id: &EntityId) -> &[AuditEntry] {
        self.entries
            .get(change_order_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn next_sequence(&self, change_order_id: &EntityId) -> u32 {
        self.list(change_order_id).len() as u32 + 1
    }

    pub fn verify(&self, change_order_id: &EntityId) -> Result<(), AuditError> {
        verify_chain(self.list(change_order_id))
    }
}
