//! Shared services for intent resolution
//!
//! This module contains the inventory cache, the tiered entity matcher and
//! the per-device capability fetcher used by the resolvers and composer.

pub mod capabilities;
pub mod inventory_cache;
pub mod matcher;

pub use capabilities::CapabilityFetcher;
pub use inventory_cache::{CacheInfo, InventoryCache, InventorySnapshot};
pub use matcher::{find, find_all, find_with_tier, MatchTier, Matchable};
