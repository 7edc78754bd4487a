//! leasesync Core Library
//!
//! Reconciles dealer lease price lists against existing inventory:
//! - Database access and migrations
//! - Offer normalization, matching keys and inventory indexing
//! - Tiered matching (exact, composite, algorithmic) and field diffs
//! - Change classification into reviewable extraction sessions
//! - Applying operator-selected changes with per-change isolation

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod reconcile;

/// Record builders shared by tests across the workspace
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{PowertrainPolicy, ReconcileConfig, ScoringWeights};
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use reconcile::{batch_hash, reconcile, InventoryIndex, Matcher, Reconciler};
