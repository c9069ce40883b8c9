//! CLI command implementations

pub mod audit;
pub mod bom;
pub mod completions;
pub mod eco;
pub mod init;
pub mod rev;
pub mod source;
pub mod team;
