//! Change order engine - lifecycle transitions, approvals and implementation
//!
//! Every operation loads the change order from the store, checks its guards,
//! and hands the updated record plus its audit entry to the store as one
//! commit. Events are published only after the commit succeeded.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::core::audit::{verify_chain, AuditEntry, AuditError, AuditEvent, NewAuditEntry};
use crate::core::bom::{find_where_used, validate_bom_tree, BomIssue, BomValidation};
use crate::core::catalog::PartCatalog;
use crate::core::entity::{ChangeStatus, ChangeType};
use crate::core::events::{ChangeOrderEvent, EventBus};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::quorum::{ApproverQuorum, QuorumOutcome, UnknownApprover};
use crate::core::revision::{next_revision_code, RevisionError};
use crate::core::store::{ChangeOrderStore, Commit, StoreError, Write};
use crate::core::team::{AccessDenied, AccessPolicy, Action, OpenAccess};
use crate::entities::change_order::{
    AffectedPart, Approver, ChangeOrder, ChangeOrderInput, Decision, ImplementationRecord,
    RevisionAssignment,
};
use crate::entities::part::BomEdge;

/// Errors raised by change order operations
#[derive(Debug, Error)]
pub enum ChangeOrderError {
    #[error("invalid change order: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("access denied: {0}")]
    Access(#[from] AccessDenied),

    #[error("cannot {action} a change order that is {from}")]
    InvalidTransition { from: ChangeStatus, action: Action },

    #[error("change order {0} has no approvers; add at least one before submitting")]
    MissingApprovers(String),

    #[error(transparent)]
    UnknownApprover(#[from] UnknownApprover),

    #[error("BOM of part {part_id} contains a cycle: {path}")]
    BomCycle { part_id: String, path: String },

    #[error("impact analysis failed for part {part_id}: {}", .errors.join("; "))]
    ImpactAnalysis { part_id: String, errors: Vec<String> },

    #[error(transparent)]
    InvalidRevisionCode(#[from] RevisionError),

    #[error("change order {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        id: EntityId,
        expected: u32,
        found: u32,
    },

    #[error("audit trail of {id} is broken: {source}")]
    AuditIntegrity {
        id: EntityId,
        #[source]
        source: AuditError,
    },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ChangeOrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                id,
                expected,
                found,
            } => ChangeOrderError::Conflict {
                id,
                expected,
                found,
            },
            StoreError::NotFound(id) => ChangeOrderError::NotFound {
                kind: "change order",
                id: id.to_string(),
            },
            other => ChangeOrderError::Store(other),
        }
    }
}

type Result<T> = std::result::Result<T, ChangeOrderError>;

/// Engine settings with no built-in defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest BOM level walked during impact analysis
    pub max_depth: usize,
}

impl EngineConfig {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

/// Check if a status transition is valid
pub fn is_valid_transition(from: ChangeStatus, to: ChangeStatus) -> bool {
    matches!(
        (from, to),
        (ChangeStatus::Draft, ChangeStatus::Submitted)
            | (ChangeStatus::Submitted, ChangeStatus::InReview)
            | (ChangeStatus::InReview, ChangeStatus::Approved)
            | (ChangeStatus::InReview, ChangeStatus::Rejected)
            | (ChangeStatus::Approved, ChangeStatus::Implemented)
    )
}

/// Get allowed transitions from the current status
pub fn allowed_transitions(current: ChangeStatus) -> Vec<ChangeStatus> {
    match current {
        ChangeStatus::Draft => vec![ChangeStatus::Submitted],
        ChangeStatus::Submitted => vec![ChangeStatus::InReview],
        ChangeStatus::InReview => vec![ChangeStatus::Approved, ChangeStatus::Rejected],
        ChangeStatus::Approved => vec![ChangeStatus::Implemented],
        ChangeStatus::Rejected | ChangeStatus::Implemented => vec![],
    }
}

/// Impact of a change order on one affected part
#[derive(Debug, Clone, Serialize)]
pub struct PartImpact {
    pub part_id: String,
    pub part_number: String,
    pub current_revision: Option<String>,
    /// None when the recorded revision is not a valid code
    pub next_revision: Option<String>,
    pub where_used: Vec<String>,
    pub bom: BomValidation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub change_order_id: EntityId,
    pub number: String,
    pub parts: Vec<PartImpact>,
}

impl ImpactReport {
    /// True when every part's BOM is valid and has a next revision
    pub fn is_clear(&self) -> bool {
        self.parts
            .iter()
            .all(|p| p.bom.valid && p.next_revision.is_some())
    }
}

/// Drives change orders through their lifecycle
pub struct ChangeOrderEngine<S, C> {
    store: S,
    catalog: C,
    policy: Box<dyn AccessPolicy>,
    events: EventBus<ChangeOrderEvent>,
    config: EngineConfig,
}

impl<S: ChangeOrderStore, C: PartCatalog> ChangeOrderEngine<S, C> {
    /// Create an engine with unrestricted access and a private event bus
    pub fn new(store: S, catalog: C, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            policy: Box::new(OpenAccess),
            events: EventBus::new(),
            config,
        }
    }

    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Publish on a bus shared with other components
    pub fn with_events(mut self, events: EventBus<ChangeOrderEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus<ChangeOrderEvent> {
        &self.events
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Create a change order in `draft`
    pub fn create(&mut self, input: ChangeOrderInput, actor: &str) -> Result<ChangeOrder> {
        self.policy.authorize(actor, Action::Create)?;

        if input.title.trim().is_empty() {
            return Err(ChangeOrderError::Validation("title must not be empty".into()));
        }
        if input.reason.trim().is_empty() {
            return Err(ChangeOrderError::Validation("reason must not be empty".into()));
        }
        if input.project_id.trim().is_empty() {
            return Err(ChangeOrderError::Validation(
                "project id must not be empty".into(),
            ));
        }

        if let Some(ref old) = input.supersedes {
            let previous = self.load(old)?;
            if previous.status != ChangeStatus::Rejected {
                return Err(ChangeOrderError::Validation(format!(
                    "{} is {}; only rejected change orders can be superseded",
                    previous.display_number(),
                    previous.status
                )));
            }
        }

        let prefix = match input.change_type {
            ChangeType::Ecr => EntityPrefix::Ecr,
            ChangeType::Ecn => EntityPrefix::Ecn,
        };
        let id = EntityId::new(prefix);

        let mut quorum = ApproverQuorum::default();
        for user in &input.approver_ids {
            self.policy.admits_approver(user)?;
            if !quorum.add(Approver::new(&id, user.as_str())) {
                return Err(ChangeOrderError::Validation(format!(
                    "approver '{}' is listed twice",
                    user
                )));
            }
        }

        let mut seen = HashSet::new();
        let mut affected_parts = Vec::with_capacity(input.affected_part_ids.len());
        for part_id in &input.affected_part_ids {
            if !seen.insert(part_id.as_str()) {
                return Err(ChangeOrderError::Validation(format!(
                    "part '{}' is listed twice",
                    part_id
                )));
            }
            let part = self
                .catalog
                .part(part_id)
                .ok_or_else(|| ChangeOrderError::NotFound {
                    kind: "part",
                    id: part_id.clone(),
                })?;
            affected_parts.push(AffectedPart::snapshot(&id, &part));
        }

        let now = Utc::now();
        let co = ChangeOrder {
            id,
            change_type: input.change_type,
            number: self.store.next_number(&input.project_id)?,
            title: input.title,
            description: input.description,
            reason: input.reason,
            status: ChangeStatus::Draft,
            priority: input.priority,
            project_id: input.project_id,
            created_by: actor.to_string(),
            created: now,
            updated: now,
            approvers: quorum,
            affected_parts,
            supersedes: input.supersedes,
            implementation: None,
            version: 1,
        };

        self.store.commit(Commit {
            write: Write::Insert(co.clone()),
            expected_version: 0,
            audit: vec![NewAuditEntry::new(
                &co.id,
                actor,
                AuditEvent::Created,
                None,
                ChangeStatus::Draft,
            )],
        })?;
        tracing::info!(id = %co.id, number = %co.display_number(), actor, "created change order");

        self.publish(&[ChangeOrderEvent::Created {
            change_order_id: co.id.clone(),
            project_id: co.project_id.clone(),
            change_type: co.change_type,
            number: co.number,
            title: co.title.clone(),
            requester_id: actor.to_string(),
            approver_ids: co
                .approvers
                .approvers()
                .iter()
                .map(|a| a.user_id.clone())
                .collect(),
            affected_part_ids: co
                .affected_parts
                .iter()
                .map(|p| p.part_id.clone())
                .collect(),
        }]);
        Ok(co)
    }

    /// `draft` -> `submitted`; requires at least one approver
    pub fn submit(&mut self, id: &EntityId, actor: &str) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        self.policy.authorize(actor, Action::Submit)?;
        guard(&co, ChangeStatus::Submitted, Action::Submit)?;
        if co.approvers.is_empty() {
            return Err(ChangeOrderError::MissingApprovers(co.display_number()));
        }

        co.status = ChangeStatus::Submitted;
        let co = self.update(
            co,
            NewAuditEntry::new(
                id,
                actor,
                AuditEvent::Submitted,
                Some(ChangeStatus::Draft),
                ChangeStatus::Submitted,
            ),
        )?;

        self.publish(&[
            status_changed(&co, ChangeStatus::Draft, actor, None),
            ChangeOrderEvent::Submitted {
                change_order_id: co.id.clone(),
                project_id: co.project_id.clone(),
                number: co.number,
                title: co.title.clone(),
                submitted_by: actor.to_string(),
                submitted_at: co.updated,
            },
        ]);
        Ok(co)
    }

    /// `submitted` -> `in_review`
    pub fn accept_for_review(&mut self, id: &EntityId, actor: &str) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        self.policy.authorize(actor, Action::AcceptForReview)?;
        guard(&co, ChangeStatus::InReview, Action::AcceptForReview)?;

        co.status = ChangeStatus::InReview;
        let co = self.update(
            co,
            NewAuditEntry::new(
                id,
                actor,
                AuditEvent::AcceptedForReview,
                Some(ChangeStatus::Submitted),
                ChangeStatus::InReview,
            ),
        )?;

        self.publish(&[status_changed(&co, ChangeStatus::Submitted, actor, None)]);
        Ok(co)
    }

    /// Record one approver's decision, cast by `actor`.
    ///
    /// `approver` is the approver's user id or record id. The policy decides
    /// whether `actor` may vote for someone else; such a proxy vote names the
    /// approver in the audit comment. A rejection ends the review at once; the
    /// last outstanding approval moves the order to `approved`. Repeating a
    /// vote already on record changes nothing, and a different comment on a
    /// repeated vote is refused rather than dropped.
    pub fn review(
        &mut self,
        id: &EntityId,
        approver: &str,
        decision: Decision,
        comment: Option<&str>,
        actor: &str,
    ) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        if co.status != ChangeStatus::InReview {
            return Err(ChangeOrderError::InvalidTransition {
                from: co.status,
                action: Action::Review,
            });
        }

        let (user_id, recorded_comment) = co
            .approvers
            .find(approver)
            .map(|a| (a.user_id.clone(), a.comment.clone()))
            .ok_or_else(|| UnknownApprover(approver.to_string()))?;
        self.policy.authorize(actor, Action::Review)?;
        self.policy.may_vote_for(actor, &user_id)?;

        let now = Utc::now();
        let effect = co.approvers.vote(approver, decision, comment, now)?;
        if !effect.changed {
            if comment.is_some() && comment != recorded_comment.as_deref() {
                return Err(ChangeOrderError::Validation(format!(
                    "{} already voted {}; a repeated vote cannot change the comment",
                    user_id, effect.previous
                )));
            }
            tracing::debug!(id = %co.id, approver = %user_id, "vote already recorded");
            return self.load(id);
        }

        let (event, to) = match effect.outcome {
            QuorumOutcome::Pending => (AuditEvent::ApprovalRecorded, ChangeStatus::InReview),
            QuorumOutcome::Approved => (AuditEvent::Approved, ChangeStatus::Approved),
            QuorumOutcome::Rejected => (AuditEvent::Rejected, ChangeStatus::Rejected),
        };
        let audit_comment = if actor == user_id {
            comment.map(str::to_string)
        } else {
            tracing::info!(id = %co.id, actor, approver = %user_id, "proxy vote");
            Some(match comment {
                Some(c) => format!("on behalf of {}: {}", user_id, c),
                None => format!("on behalf of {}", user_id),
            })
        };
        co.status = to;
        let co = self.update(
            co,
            NewAuditEntry::new(id, actor, event, Some(ChangeStatus::InReview), to)
                .with_comment(audit_comment),
        )?;

        match effect.outcome {
            QuorumOutcome::Pending => {}
            QuorumOutcome::Approved => self.publish(&[
                status_changed(&co, ChangeStatus::InReview, actor, comment),
                ChangeOrderEvent::Approved {
                    change_order_id: co.id.clone(),
                    project_id: co.project_id.clone(),
                    number: co.number,
                    title: co.title.clone(),
                    approver_id: user_id.clone(),
                    approver_comment: comment.map(str::to_string),
                    approved_at: co.updated,
                },
            ]),
            QuorumOutcome::Rejected => self.publish(&[
                status_changed(&co, ChangeStatus::InReview, actor, comment),
                ChangeOrderEvent::Rejected {
                    change_order_id: co.id.clone(),
                    project_id: co.project_id.clone(),
                    number: co.number,
                    title: co.title.clone(),
                    rejecter_id: user_id.clone(),
                    rejection_reason: comment.unwrap_or_default().to_string(),
                    rejected_at: co.updated,
                },
            ]),
        }
        Ok(co)
    }

    /// `approved` -> `implemented`, allocating the next revision of every
    /// affected part after its BOM passes impact analysis
    pub fn implement(&mut self, id: &EntityId, actor: &str) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        self.policy.authorize(actor, Action::Implement)?;
        guard(&co, ChangeStatus::Implemented, Action::Implement)?;

        let report = self.analyze(&co);
        let mut assignments = Vec::with_capacity(report.parts.len());
        for part in report.parts {
            if let Some(BomIssue::Cycle { path }) = part.bom.first_cycle() {
                tracing::warn!(id = %co.id, part = %part.part_id, "BOM cycle blocks implementation");
                return Err(ChangeOrderError::BomCycle {
                    part_id: part.part_id,
                    path: path.join(" -> "),
                });
            }
            if !part.bom.valid {
                tracing::warn!(id = %co.id, part = %part.part_id, "BOM validation failed");
                return Err(ChangeOrderError::ImpactAnalysis {
                    errors: part.bom.messages(),
                    part_id: part.part_id,
                });
            }
            let to_revision = next_revision_code(part.current_revision.as_deref())?;
            assignments.push(RevisionAssignment {
                part_id: part.part_id,
                part_number: part.part_number,
                from_revision: part.current_revision,
                to_revision,
                where_used: part.where_used,
            });
        }

        let summary = assignments
            .iter()
            .map(|a| {
                format!(
                    "{}: {} -> {}",
                    a.part_number,
                    a.from_revision.as_deref().unwrap_or("-"),
                    a.to_revision
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let record = ImplementationRecord {
            id: EntityId::new(EntityPrefix::Rev),
            implemented_by: actor.to_string(),
            implemented_at: Utc::now(),
            assignments,
        };
        co.status = ChangeStatus::Implemented;
        co.implementation = Some(record.clone());
        let co = self.update(
            co,
            NewAuditEntry::new(
                id,
                actor,
                AuditEvent::Implemented,
                Some(ChangeStatus::Approved),
                ChangeStatus::Implemented,
            )
            .with_comment((!summary.is_empty()).then_some(summary)),
        )?;

        self.publish(&[
            status_changed(&co, ChangeStatus::Approved, actor, None),
            ChangeOrderEvent::Implemented {
                change_order_id: co.id.clone(),
                project_id: co.project_id.clone(),
                number: co.number,
                title: co.title.clone(),
                implemented_by: actor.to_string(),
                implemented_revision_id: record.id,
                revisions: record.assignments,
                implemented_at: record.implemented_at,
            },
        ]);
        Ok(co)
    }

    /// Delete a draft; its audit trail stays behind
    pub fn delete(&mut self, id: &EntityId, actor: &str) -> Result<()> {
        let co = self.load(id)?;
        self.policy.authorize(actor, Action::Delete)?;
        require_draft(&co, Action::Delete)?;

        self.store.commit(Commit {
            write: Write::Delete(co.id.clone()),
            expected_version: co.version,
            audit: vec![NewAuditEntry::new(
                id,
                actor,
                AuditEvent::Deleted,
                Some(ChangeStatus::Draft),
                ChangeStatus::Draft,
            )],
        })?;
        tracing::info!(id = %co.id, actor, "deleted draft change order");
        Ok(())
    }

    pub fn add_approver(&mut self, id: &EntityId, user_id: &str, actor: &str) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        self.policy.authorize(actor, Action::EditApprovers)?;
        require_draft(&co, Action::EditApprovers)?;
        self.policy.admits_approver(user_id)?;

        if !co.approvers.add(Approver::new(id, user_id)) {
            return Err(ChangeOrderError::Validation(format!(
                "'{}' is already an approver",
                user_id
            )));
        }
        self.update(
            co,
            NewAuditEntry::new(
                id,
                actor,
                AuditEvent::ApproverAdded,
                Some(ChangeStatus::Draft),
                ChangeStatus::Draft,
            )
            .with_comment(Some(user_id)),
        )
    }

    pub fn remove_approver(&mut self, id: &EntityId, approver: &str, actor: &str) -> Result<ChangeOrder> {
        let mut co = self.load(id)?;
        self.policy.authorize(actor, Action::EditApprovers)?;
        require_draft(&co, Action::EditApprovers)?;

        let removed = co
            .approvers
            .remove(approver)
            .ok_or_else(|| UnknownApprover(approver.to_string()))?;
        self.update(
            co,
            NewAuditEntry::new(
                id,
                actor,
                AuditEvent::ApproverRemoved,
                Some(ChangeStatus::Draft),
                ChangeStatus::Draft,
            )
            .with_comment(Some(removed.user_id)),
        )
    }

    pub fn get(&self, id: &EntityId) -> Result<ChangeOrder> {
        self.load(id)
    }

    pub fn list(&self, project_id: Option<&str>) -> Result<Vec<ChangeOrder>> {
        Ok(self.store.list(project_id)?)
    }

    /// Audit entries in sequence order; available after deletion too
    pub fn audit(&self, id: &EntityId) -> Result<Vec<AuditEntry>> {
        Ok(self.store.audit(id)?)
    }

    /// Recompute the hash chain; returns the number of entries checked
    pub fn verify_audit(&self, id: &EntityId) -> Result<usize> {
        let entries = self.store.audit(id)?;
        verify_chain(&entries).map_err(|source| ChangeOrderError::AuditIntegrity {
            id: id.clone(),
            source,
        })?;
        Ok(entries.len())
    }

    /// Resolve a full id (`ECR-01H...`) or a human number (`ECR-0003`)
    pub fn resolve(&self, key: &str) -> Result<EntityId> {
        if let Ok(id) = EntityId::parse(key) {
            if id.prefix().is_change_order() {
                return Ok(id);
            }
        }

        let mut matches: Vec<ChangeOrder> = self
            .store
            .list(None)?
            .into_iter()
            .filter(|co| co.display_number().eq_ignore_ascii_case(key))
            .collect();
        match matches.len() {
            0 => Err(ChangeOrderError::NotFound {
                kind: "change order",
                id: key.to_string(),
            }),
            1 => Ok(matches.remove(0).id),
            n => Err(ChangeOrderError::Validation(format!(
                "'{}' matches {} change orders in different projects; use the full id",
                key, n
            ))),
        }
    }

    /// Read-only impact analysis of a change order's affected parts
    pub fn impact(&self, id: &EntityId) -> Result<ImpactReport> {
        let co = self.load(id)?;
        Ok(self.analyze(&co))
    }

    fn analyze(&self, co: &ChangeOrder) -> ImpactReport {
        let all_edges = self.catalog.edges();
        let parts = co
            .affected_parts
            .iter()
            .map(|part| self.part_impact(part, &all_edges))
            .collect();
        ImpactReport {
            change_order_id: co.id.clone(),
            number: co.display_number(),
            parts,
        }
    }

    fn part_impact(&self, part: &AffectedPart, all_edges: &[BomEdge]) -> PartImpact {
        let edges = self.catalog.bom_edges(&part.part_id);

        let mut known = HashMap::new();
        let ids = std::iter::once(part.part_id.as_str()).chain(
            edges
                .iter()
                .flat_map(|e| [e.parent_id.as_str(), e.child_id.as_str()]),
        );
        for part_id in ids {
            if known.contains_key(part_id) {
                continue;
            }
            if let Some(record) = self.catalog.part(part_id) {
                known.insert(part_id.to_string(), record);
            }
        }

        PartImpact {
            part_id: part.part_id.clone(),
            part_number: part.part_number.clone(),
            current_revision: part.revision_snapshot.clone(),
            next_revision: next_revision_code(part.revision_snapshot.as_deref()).ok(),
            where_used: find_where_used(&part.part_id, all_edges),
            bom: validate_bom_tree(&part.part_id, &known, &edges, self.config.max_depth),
        }
    }

    fn load(&self, id: &EntityId) -> Result<ChangeOrder> {
        self.store
            .get(id)?
            .ok_or_else(|| ChangeOrderError::NotFound {
                kind: "change order",
                id: id.to_string(),
            })
    }

    /// Commit `co` with its audit entry, bumping the version
    fn update(&mut self, mut co: ChangeOrder, entry: NewAuditEntry) -> Result<ChangeOrder> {
        let expected = co.version;
        let from = entry.from_status;
        co.version += 1;
        co.updated = Utc::now();

        self.store.commit(Commit {
            write: Write::Update(co.clone()),
            expected_version: expected,
            audit: vec![entry],
        })?;
        tracing::info!(
            id = %co.id,
            from = from.map(|s| s.as_str()).unwrap_or("-"),
            to = %co.status,
            version = co.version,
            "committed change order"
        );
        Ok(co)
    }

    fn publish(&self, events: &[ChangeOrderEvent]) {
        for event in events {
            let report = self.events.publish(event.name(), event);
            tracing::debug!(
                event = event.name(),
                delivered = report.delivered,
                failed = report.failed,
                "published event"
            );
        }
    }
}

fn guard(co: &ChangeOrder, to: ChangeStatus, action: Action) -> Result<()> {
    if is_valid_transition(co.status, to) {
        Ok(())
    } else {
        tracing::debug!(id = %co.id, from = %co.status, to = %to, "rejected transition");
        Err(ChangeOrderError::InvalidTransition {
            from: co.status,
            action,
        })
    }
}

fn require_draft(co: &ChangeOrder, action: Action) -> Result<()> {
    if co.status == ChangeStatus::Draft {
        Ok(())
    } else {
        Err(ChangeOrderError::InvalidTransition {
            from: co.status,
            action,
        })
    }
}

fn status_changed(
    co: &ChangeOrder,
    from: ChangeStatus,
    actor: &str,
    comment: Option<&str>,
) -> ChangeOrderEvent {
    ChangeOrderEvent::StatusChanged {
        change_order_id: co.id.clone(),
        from_status: from,
        to_status: co.status,
        changed_by: actor.to_string(),
        comment: comment.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::MemoryCatalog;
    use crate::core::events::{CHANGE_ORDER_APPROVED, WILDCARD};
    use crate::core::store::MemoryStore;
    use crate::core::team::{Role, TeamMember, TeamRoster};
    use crate::entities::part::PartRecord;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestEngine = ChangeOrderEngine<MemoryStore, MemoryCatalog>;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .with_part(PartRecord::new("ASM-1", "100-001", "Gearbox").with_revision("A"))
            .with_part(PartRecord::new("CMP-1", "200-001", "Output shaft").with_revision("B"))
            .with_part(PartRecord::new("CMP-2", "200-002", "Bearing"))
            .with_edge("ASM-1", "CMP-1")
            .with_edge("CMP-1", "CMP-2")
    }

    fn engine_with(catalog: MemoryCatalog) -> TestEngine {
        ChangeOrderEngine::new(MemoryStore::new(), catalog, EngineConfig::new(10))
    }

    fn engine() -> TestEngine {
        engine_with(catalog())
    }

    fn input() -> ChangeOrderInput {
        ChangeOrderInput::new(
            "gearbox",
            ChangeType::Ecr,
            "Harden output shaft",
            "Spline wear found in endurance test",
        )
        .with_approvers(["u1", "u2"])
        .with_parts(["CMP-1"])
    }

    /// Created, submitted and accepted for review
    fn in_review(engine: &mut TestEngine) -> EntityId {
        let co = engine.create(input(), "alice").unwrap();
        engine.submit(&co.id, "alice").unwrap();
        engine.accept_for_review(&co.id, "quinn").unwrap();
        co.id
    }

    fn approved(engine: &mut TestEngine) -> EntityId {
        let id = in_review(engine);
        engine.review(&id, "u1", Decision::Approve, None, "u1").unwrap();
        engine.review(&id, "u2", Decision::Approve, None, "u2").unwrap();
        id
    }

    #[test]
    fn test_transition_table() {
        assert!(is_valid_transition(ChangeStatus::Draft, ChangeStatus::Submitted));
        assert!(is_valid_transition(ChangeStatus::InReview, ChangeStatus::Rejected));
        assert!(!is_valid_transition(ChangeStatus::Draft, ChangeStatus::Approved));
        assert!(!is_valid_transition(ChangeStatus::Rejected, ChangeStatus::Submitted));
        for status in ChangeStatus::all() {
            for to in allowed_transitions(*status) {
                assert!(is_valid_transition(*status, to));
            }
        }
        assert!(allowed_transitions(ChangeStatus::Implemented).is_empty());
        assert!(allowed_transitions(ChangeStatus::Rejected).is_empty());
    }

    #[test]
    fn test_end_to_end_lifecycle() {
        let mut engine = engine();
        let id = in_review(&mut engine);

        let co = engine.review(&id, "u1", Decision::Approve, Some("ok"), "u1").unwrap();
        assert_eq!(co.status, ChangeStatus::InReview);

        let co = engine.review(&id, "u2", Decision::Approve, None, "u2").unwrap();
        assert_eq!(co.status, ChangeStatus::Approved);

        let co = engine.implement(&id, "mgr").unwrap();
        assert_eq!(co.status, ChangeStatus::Implemented);
        let record = co.implementation.unwrap();
        assert_eq!(record.id.prefix(), EntityPrefix::Rev);
        assert_eq!(record.assignments.len(), 1);
        assert_eq!(record.assignments[0].from_revision.as_deref(), Some("B"));
        assert_eq!(record.assignments[0].to_revision, "C");
        assert_eq!(record.assignments[0].where_used, vec!["ASM-1"]);

        // create, submit, accept, two votes, implement
        let trail = engine.audit(&id).unwrap();
        assert_eq!(trail.len(), 6);
        let sequences: Vec<u32> = trail.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(engine.verify_audit(&id).unwrap(), 6);
    }

    #[test]
    fn test_numbers_are_sequential_per_project() {
        let mut engine = engine();
        let a = engine.create(input(), "alice").unwrap();
        let b = engine.create(input(), "alice").unwrap();
        let mut other = input();
        other.project_id = "pump".into();
        let c = engine.create(other, "alice").unwrap();
        assert_eq!((a.number, b.number, c.number), (1, 2, 1));
        assert_eq!(b.display_number(), "ECR-0002");
    }

    #[test]
    fn test_types_share_one_sequence() {
        let mut engine = engine();
        engine.create(input(), "alice").unwrap();
        let mut notice = input();
        notice.change_type = ChangeType::Ecn;
        let ecn = engine.create(notice, "alice").unwrap();
        assert_eq!(ecn.display_number(), "ECN-0002");
        assert!(matches!(
            engine.resolve("ECN-0001"),
            Err(ChangeOrderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_deleted_draft_keeps_its_number() {
        let mut engine = engine();
        engine.create(input(), "alice").unwrap();
        let doomed = engine.create(input(), "alice").unwrap();
        engine.delete(&doomed.id, "alice").unwrap();

        let next = engine.create(input(), "alice").unwrap();
        assert_eq!(next.display_number(), "ECR-0003");
        assert!(matches!(
            engine.resolve("ECR-0002"),
            Err(ChangeOrderError::NotFound { .. })
        ));
        assert_eq!(engine.audit(&doomed.id).unwrap().len(), 2);
    }

    #[test]
    fn test_create_validates_input() {
        let mut engine = engine();
        let mut blank = input();
        blank.title = "  ".into();
        assert!(matches!(
            engine.create(blank, "alice"),
            Err(ChangeOrderError::Validation(_))
        ));

        let mut no_reason = input();
        no_reason.reason = String::new();
        assert!(matches!(
            engine.create(no_reason, "alice"),
            Err(ChangeOrderError::Validation(_))
        ));

        let unknown = input().with_parts(["CMP-404"]);
        assert!(matches!(
            engine.create(unknown, "alice"),
            Err(ChangeOrderError::NotFound { kind: "part", .. })
        ));

        let twice = input().with_approvers(["u1", "u1"]);
        assert!(matches!(
            engine.create(twice, "alice"),
            Err(ChangeOrderError::Validation(_))
        ));
        assert!(engine.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_affected_parts_are_snapshots() {
        let mut engine = engine();
        let co = engine.create(input(), "alice").unwrap();
        let part = &co.affected_parts[0];
        assert_eq!(part.part_number, "200-001");
        assert_eq!(part.status_snapshot, "active");
        assert_eq!(part.revision_snapshot.as_deref(), Some("B"));
    }

    #[test]
    fn test_submit_requires_approvers() {
        let mut engine = engine();
        let co = engine.create(input().with_approvers(Vec::<String>::new()), "alice").unwrap();
        let err = engine.submit(&co.id, "alice").unwrap_err();
        assert!(matches!(err, ChangeOrderError::MissingApprovers(_)));

        let stored = engine.get(&co.id).unwrap();
        assert_eq!(stored.status, ChangeStatus::Draft);
        assert_eq!(engine.audit(&co.id).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_operations_are_rejected() {
        let mut engine = engine();
        let co = engine.create(input(), "alice").unwrap();

        let err = engine.accept_for_review(&co.id, "quinn").unwrap_err();
        assert!(matches!(
            err,
            ChangeOrderError::InvalidTransition {
                from: ChangeStatus::Draft,
                action: Action::AcceptForReview
            }
        ));
        assert!(matches!(
            engine.implement(&co.id, "mgr"),
            Err(ChangeOrderError::InvalidTransition { .. })
        ));

        engine.submit(&co.id, "alice").unwrap();
        assert!(matches!(
            engine.submit(&co.id, "alice"),
            Err(ChangeOrderError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.review(&co.id, "u1", Decision::Approve, None, "u1"),
            Err(ChangeOrderError::InvalidTransition { .. })
        ));
        assert_eq!(engine.audit(&co.id).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_change_order() {
        let mut engine = engine();
        let missing = EntityId::new(EntityPrefix::Ecr);
        assert!(matches!(
            engine.submit(&missing, "alice"),
            Err(ChangeOrderError::NotFound { kind: "change order", .. })
        ));
    }

    #[test]
    fn test_rejection_is_terminal() {
        let mut engine = engine();
        let id = in_review(&mut engine);

        let co = engine
            .review(&id, "u1", Decision::Reject, Some("needs FEA"), "u1")
            .unwrap();
        assert_eq!(co.status, ChangeStatus::Rejected);
        assert_eq!(co.approvers.pending().count(), 1);

        let err = engine.review(&id, "u2", Decision::Approve, None, "u2").unwrap_err();
        assert!(matches!(
            err,
            ChangeOrderError::InvalidTransition {
                from: ChangeStatus::Rejected,
                ..
            }
        ));
        assert!(matches!(
            engine.implement(&id, "mgr"),
            Err(ChangeOrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_rejection_after_partial_approval() {
        let mut engine = engine();
        let id = in_review(&mut engine);
        engine.review(&id, "u1", Decision::Approve, None, "u1").unwrap();
        let co = engine.review(&id, "u2", Decision::Reject, None, "u2").unwrap();
        assert_eq!(co.status, ChangeStatus::Rejected);
    }

    #[test]
    fn test_unknown_approver_leaves_state_unchanged() {
        let mut engine = engine();
        let id = in_review(&mut engine);
        let err = engine.review(&id, "mallory", Decision::Approve, None, "mallory").unwrap_err();
        assert!(matches!(err, ChangeOrderError::UnknownApprover(_)));
        assert_eq!(engine.audit(&id).unwrap().len(), 3);
        assert_eq!(engine.get(&id).unwrap().version, 3);
    }

    #[test]
    fn test_repeated_vote_is_idempotent() {
        let mut engine = engine();
        let id = in_review(&mut engine);
        engine.review(&id, "u1", Decision::Approve, None, "u1").unwrap();
        let co = engine.review(&id, "u1", Decision::Approve, None, "u1").unwrap();
        assert_eq!(co.status, ChangeStatus::InReview);
        assert_eq!(engine.audit(&id).unwrap().len(), 4);
    }

    #[test]
    fn test_repeated_vote_with_new_comment_is_refused() {
        let mut engine = engine();
        let id = in_review(&mut engine);
        engine
            .review(&id, "u1", Decision::Approve, Some("looks fine"), "u1")
            .unwrap();
        engine
            .review(&id, "u1", Decision::Approve, Some("looks fine"), "u1")
            .unwrap();
        assert!(matches!(
            engine.review(&id, "u1", Decision::Approve, Some("second thoughts"), "u1"),
            Err(ChangeOrderError::Validation(_))
        ));

        let co = engine.get(&id).unwrap();
        assert_eq!(co.approvers.approvers()[0].comment.as_deref(), Some("looks fine"));
        assert_eq!(engine.audit(&id).unwrap().len(), 4);
    }

    #[test]
    fn test_review_by_approver_record_id() {
        let mut engine = engine();
        let id = in_review(&mut engine);
        let record_id = engine.get(&id).unwrap().approvers.approvers()[0].id.to_string();
        engine.review(&id, &record_id, Decision::Approve, None, "u1").unwrap();
        let trail = engine.audit(&id).unwrap();
        assert_eq!(trail.last().unwrap().actor_id, "u1");
    }

    #[test]
    fn test_implement_blocked_by_cycle() {
        let catalog = catalog().with_edge("CMP-2", "CMP-1");
        let mut engine = engine_with(catalog);
        let id = approved(&mut engine);

        let err = engine.implement(&id, "mgr").unwrap_err();
        match err {
            ChangeOrderError::BomCycle { part_id, path } => {
                assert_eq!(part_id, "CMP-1");
                assert!(path.contains("CMP-2"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(engine.get(&id).unwrap().status, ChangeStatus::Approved);
        assert_eq!(engine.audit(&id).unwrap().len(), 5);
    }

    #[test]
    fn test_implement_blocked_by_missing_child() {
        let catalog = catalog().with_edge("CMP-1", "CMP-404");
        let mut engine = engine_with(catalog);
        let id = approved(&mut engine);

        let err = engine.implement(&id, "mgr").unwrap_err();
        match err {
            ChangeOrderError::ImpactAnalysis { errors, .. } => {
                assert!(errors[0].contains("CMP-404"));
                assert!(errors[0].contains("not found"));
            }
            other => panic!("expected impact failure, got {other:?}"),
        }
    }

    #[test]
    fn test_implement_respects_max_depth() {
        let catalog = catalog()
            .with_part(PartRecord::new("CMP-3", "200-003", "Race"))
            .with_edge("CMP-2", "CMP-3");
        let mut engine =
            ChangeOrderEngine::new(MemoryStore::new(), catalog, EngineConfig::new(1));
        let id = approved(&mut engine);
        let err = engine.implement(&id, "mgr").unwrap_err();
        assert!(err.to_string().contains("Maximum depth"));
    }

    #[test]
    fn test_implement_rejects_bad_revision() {
        let catalog = MemoryCatalog::new()
            .with_part(PartRecord::new("CMP-1", "200-001", "Shaft").with_revision("b2"));
        let mut engine = engine_with(catalog);
        let id = approved(&mut engine);
        assert!(matches!(
            engine.implement(&id, "mgr"),
            Err(ChangeOrderError::InvalidRevisionCode(_))
        ));
    }

    #[test]
    fn test_first_release_gets_revision_a() {
        let mut engine = engine();
        let co = engine
            .create(input().with_parts(["CMP-2"]), "alice")
            .unwrap();
        engine.submit(&co.id, "alice").unwrap();
        engine.accept_for_review(&co.id, "quinn").unwrap();
        engine.review(&co.id, "u1", Decision::Approve, None, "u1").unwrap();
        engine.review(&co.id, "u2", Decision::Approve, None, "u2").unwrap();
        let done = engine.implement(&co.id, "mgr").unwrap();
        let assignment = &done.implementation.unwrap().assignments[0];
        assert_eq!(assignment.from_revision, None);
        assert_eq!(assignment.to_revision, "A");
        assert_eq!(assignment.where_used, vec!["CMP-1"]);
    }

    #[test]
    fn test_impact_query() {
        let mut engine = engine_with(catalog().with_edge("CMP-2", "CMP-1"));
        let co = engine.create(input(), "alice").unwrap();
        let report = engine.impact(&co.id).unwrap();
        assert!(!report.is_clear());
        assert_eq!(report.parts[0].next_revision.as_deref(), Some("C"));
        assert!(report.parts[0].bom.first_cycle().is_some());
        // query only
        assert_eq!(engine.audit(&co.id).unwrap().len(), 1);
    }

    #[test]
    fn test_events_follow_commits() {
        let mut engine = engine();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = engine.events().subscribe(WILDCARD, move |_, name| {
            sink.borrow_mut().push(name.to_string());
            Ok(())
        });

        let id = approved(&mut engine);
        engine.implement(&id, "mgr").unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                "CHANGE_ORDER_CREATED",
                "CHANGE_ORDER_STATUS_CHANGED",
                "CHANGE_ORDER_SUBMITTED",
                "CHANGE_ORDER_STATUS_CHANGED",
                "CHANGE_ORDER_STATUS_CHANGED",
                "CHANGE_ORDER_APPROVED",
                "CHANGE_ORDER_STATUS_CHANGED",
                "CHANGE_ORDER_IMPLEMENTED",
            ]
        );
    }

    #[test]
    fn test_failed_guard_publishes_nothing() {
        let mut engine = engine();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let _sub = engine.events().subscribe(WILDCARD, move |_, _| {
            *sink.borrow_mut() += 1;
            Ok(())
        });
        let co = engine.create(input(), "alice").unwrap();
        let _ = engine.implement(&co.id, "mgr");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_failing_listener_does_not_abort_operation() {
        let mut engine = engine();
        let _sub = engine
            .events()
            .subscribe(CHANGE_ORDER_APPROVED, |_, _| Err("mail server down".into()));
        let id = approved(&mut engine);
        assert_eq!(engine.get(&id).unwrap().status, ChangeStatus::Approved);
    }

    #[test]
    fn test_delete_only_drafts() {
        let mut engine = engine();
        let draft = engine.create(input(), "alice").unwrap();
        engine.delete(&draft.id, "alice").unwrap();
        assert!(matches!(
            engine.get(&draft.id),
            Err(ChangeOrderError::NotFound { .. })
        ));
        let trail = engine.audit(&draft.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].event, AuditEvent::Deleted);

        let co = engine.create(input(), "alice").unwrap();
        engine.submit(&co.id, "alice").unwrap();
        assert!(matches!(
            engine.delete(&co.id, "alice"),
            Err(ChangeOrderError::InvalidTransition {
                action: Action::Delete,
                ..
            })
        ));
    }

    #[test]
    fn test_edit_approvers_while_draft() {
        let mut engine = engine();
        let co = engine.create(input(), "alice").unwrap();

        let co = engine.add_approver(&co.id, "u3", "alice").unwrap();
        assert_eq!(co.approvers.len(), 3);
        assert!(matches!(
            engine.add_approver(&co.id, "u3", "alice"),
            Err(ChangeOrderError::Validation(_))
        ));

        let co = engine.remove_approver(&co.id, "u1", "alice").unwrap();
        assert_eq!(co.approvers.len(), 2);
        assert!(matches!(
            engine.remove_approver(&co.id, "u1", "alice"),
            Err(ChangeOrderError::UnknownApprover(_))
        ));

        let trail = engine.audit(&co.id).unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[1].event, AuditEvent::ApproverAdded);
        assert_eq!(trail[2].comment.as_deref(), Some("u1"));

        engine.submit(&co.id, "alice").unwrap();
        assert!(matches!(
            engine.add_approver(&co.id, "u4", "alice"),
            Err(ChangeOrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_supersede_rejected_order() {
        let mut engine = engine();
        let draft = engine.create(input(), "alice").unwrap();
        let mut early = input();
        early.supersedes = Some(draft.id.clone());
        assert!(matches!(
            engine.create(early, "alice"),
            Err(ChangeOrderError::Validation(_))
        ));

        let id = in_review(&mut engine);
        engine.review(&id, "u2", Decision::Reject, Some("scope"), "u2").unwrap();
        let mut retry = input();
        retry.supersedes = Some(id.clone());
        let co = engine.create(retry, "alice").unwrap();
        assert_eq!(co.supersedes, Some(id));
        assert_eq!(co.status, ChangeStatus::Draft);
    }

    #[test]
    fn test_resolve_by_number() {
        let mut engine = engine();
        let co = engine.create(input(), "alice").unwrap();
        assert_eq!(engine.resolve("ECR-0001").unwrap(), co.id);
        assert_eq!(engine.resolve("ecr-0001").unwrap(), co.id);
        assert_eq!(engine.resolve(&co.id.to_string()).unwrap(), co.id);
        assert!(matches!(
            engine.resolve("ECR-0099"),
            Err(ChangeOrderError::NotFound { .. })
        ));
    }

    fn member(username: &str, roles: Vec<Role>) -> TeamMember {
        TeamMember {
            name: username.to_uppercase(),
            email: format!("{username}@example.com"),
            username: username.to_string(),
            roles,
            active: true,
        }
    }

    #[test]
    fn test_roster_policy_enforced() {
        let mut roster = TeamRoster::default();
        for name in ["alice", "quinn", "u1", "u2"] {
            roster.add_member(member(name, vec![Role::Engineering]));
        }
        roster.add_member(member("mgr", vec![Role::Management]));

        let mut engine = engine().with_policy(roster);
        assert!(matches!(
            engine.create(input(), "stranger"),
            Err(ChangeOrderError::Access(AccessDenied::NotAMember(_)))
        ));
        assert!(matches!(
            engine.create(input().with_approvers(["u1", "ghost"]), "alice"),
            Err(ChangeOrderError::Access(_))
        ));

        let id = approved(&mut engine);
        assert!(matches!(
            engine.implement(&id, "alice"),
            Err(ChangeOrderError::Access(AccessDenied::MissingRole { .. }))
        ));
        engine.implement(&id, "mgr").unwrap();
    }

    #[test]
    fn test_votes_are_cast_by_the_approver() {
        let mut roster = TeamRoster::default();
        for name in ["alice", "quinn", "u1", "u2", "mallory"] {
            roster.add_member(member(name, vec![Role::Engineering]));
        }
        roster.add_member(member("root", vec![Role::Admin]));

        let mut engine = engine().with_policy(roster);
        let id = in_review(&mut engine);

        assert!(matches!(
            engine.review(&id, "u1", Decision::Approve, None, "mallory"),
            Err(ChangeOrderError::Access(AccessDenied::NotTheApprover { .. }))
        ));
        assert!(matches!(
            engine.review(&id, "u1", Decision::Approve, None, "outsider"),
            Err(ChangeOrderError::Access(AccessDenied::NotAMember(_)))
        ));
        assert_eq!(engine.audit(&id).unwrap().len(), 3);
        assert_eq!(engine.get(&id).unwrap().approvers.pending().count(), 2);

        engine.review(&id, "u1", Decision::Approve, None, "u1").unwrap();
        let co = engine
            .review(&id, "u2", Decision::Approve, Some("per phone call"), "root")
            .unwrap();
        assert_eq!(co.status, ChangeStatus::Approved);

        let trail = engine.audit(&id).unwrap();
        assert_eq!(trail[3].actor_id, "u1");
        assert_eq!(trail[4].actor_id, "root");
        assert_eq!(
            trail[4].comment.as_deref(),
            Some("on behalf of u2: per phone call")
        );
    }
}
