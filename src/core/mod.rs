//! Core module - change control engine and its collaborators

pub mod audit;
pub mod bom;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod events;
pub mod identity;
pub mod project;
pub mod quorum;
pub mod revision;
pub mod sourcing;
pub mod store;
pub mod team;
pub mod workflow;

pub use audit::{AuditEntry, AuditError, AuditEvent, AuditTrail};
pub use bom::{find_where_used, validate_bom_tree, BomIssue, BomValidation};
pub use catalog::{CatalogError, MemoryCatalog, PartCatalog};
pub use config::Config;
pub use entity::{ChangeStatus, ChangeType, Entity, Priority};
pub use events::{ChangeOrderEvent, EventBus, PublishReport, Subscription};
pub use identity::{EntityId, EntityPrefix, IdParseError};
pub use project::{Project, ProjectError};
pub use quorum::{ApproverQuorum, QuorumOutcome};
pub use revision::{RevisionCode, RevisionError};
pub use sourcing::{SourceKind, SourcingBook};
pub use store::{ChangeOrderStore, MemoryStore, SqliteStore, StoreError};
pub use team::{AccessPolicy, Action, IdentityProvider, Role, TeamMember, TeamRoster};
pub use workflow::{ChangeOrderEngine, ChangeOrderError, EngineConfig, ImpactReport};
