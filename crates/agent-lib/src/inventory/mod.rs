//! Inventory discovery
//!
//! Turns provider listings into an [`InventoryGraph`](crate::models::InventoryGraph):
//! - regions are discovered concurrently, one region client each
//! - identifiers are normalized and references resolved per region
//! - results are handed to an [`InventorySink`]

mod builder;
mod sink;
mod transform;

#[cfg(test)]
mod tests;

pub use builder::{InventoryBuilder, DEFAULT_REGION_CONCURRENCY};
pub use sink::{InventoryCache, InventorySink, JsonFileSink};
pub use transform::{name_or, region_inventory, size_to_gib, to_boolean, RegionListing};
