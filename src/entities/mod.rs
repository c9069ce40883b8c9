//! Entity type definitions
//!
//! - [`ChangeOrder`] - engineering change request or notice with its
//!   approvers, affected parts and implementation record
//! - [`PartRecord`] - a part as supplied by the catalog, with BOM child lines

pub mod change_order;
pub mod part;

pub use change_order::{ChangeOrder, ChangeOrderInput, Decision};
pub use part::{BomEdge, PartRecord};
