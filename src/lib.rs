//! TCC: Tessera Change Control
//!
//! Engineering change requests and notices through a gated approval
//! lifecycle, with an append-only audit trail, BOM impact analysis and
//! letter revision allocation.

pub mod cli;
pub mod core;
pub mod entities;
