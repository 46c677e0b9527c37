//! CLI command implementations

pub mod accounts;
pub mod inventory;
pub mod series;
