//! Extraction reconciliation
//!
//! Pipeline, leaves first:
//! - `offers` - offer normalization and multiset comparison
//! - `keys` - exact and composite matching keys
//! - `index` - folds the inventory view into unique records
//! - `matcher` - exact, composite, then algorithmic matching
//! - `diff` - field-by-field change sets
//! - `classify` - typed create/update/delete/unchanged changes
//!
//! [`reconcile`] is a pure function of the batch and an inventory snapshot;
//! [`Reconciler`] loads the snapshot and persists the result as a session.

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::config::ReconcileConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    ChangeCounts, InventoryRow, MatchMethod, ProposedChange, ReconciliationSummary, VehicleRecord,
};

pub mod classify;
pub mod diff;
pub mod index;
pub mod keys;
pub mod matcher;
pub mod offers;

pub use index::InventoryIndex;
pub use matcher::Matcher;

/// Output of one reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Extracted-record changes in input order, then deletes in inventory order
    pub changes: Vec<ProposedChange>,
    pub total_existing: usize,
}

impl Reconciliation {
    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts::tally(self.changes.iter().map(|c| &c.kind))
    }

    pub fn matches_by(&self, method: MatchMethod) -> usize {
        self.changes
            .iter()
            .filter(|c| c.match_result.method == method)
            .count()
    }
}

/// Reconcile an extracted batch against denormalized inventory rows
pub fn reconcile(
    extracted: &[VehicleRecord],
    inventory: &[InventoryRow],
    config: &ReconcileConfig,
) -> Reconciliation {
    let index = InventoryIndex::build(inventory);
    reconcile_indexed(extracted, &index, config)
}

/// Reconcile against an already built index
pub fn reconcile_indexed(
    extracted: &[VehicleRecord],
    index: &InventoryIndex,
    config: &ReconcileConfig,
) -> Reconciliation {
    let matches = Matcher::new(index, config).match_all(extracted);
    Reconciliation {
        changes: classify::classify(extracted, matches, index),
        total_existing: index.len(),
    }
}

/// SHA-256 over the normalized batch, independent of record and offer order
pub fn batch_hash(extracted: &[VehicleRecord]) -> String {
    let mut lines: Vec<String> = extracted
        .iter()
        .map(|record| {
            let mut normalized = record.clone();
            normalized.listing_id = None;
            normalized.make = keys::normalize_text(&record.make);
            normalized.model = keys::normalize_text(&record.model);
            normalized.variant = keys::normalize_text(&record.variant);
            normalized.offers = record.offers.as_deref().map(offers::canonical_offers);
            serde_json::to_string(&normalized).unwrap_or_default()
        })
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Runs reconciliation for a seller and stores the result as a session
pub struct Reconciler<'a> {
    db: &'a Database,
    config: ReconcileConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            config: ReconcileConfig::default(),
        }
    }

    pub fn with_config(db: &'a Database, config: ReconcileConfig) -> Self {
        Self { db, config }
    }

    /// Reconcile `extracted` against the seller's inventory and persist the changes
    pub fn run(
        &self,
        seller_id: Uuid,
        extracted: &[VehicleRecord],
        actor: &str,
    ) -> Result<ReconciliationSummary> {
        if self.db.get_seller(seller_id)?.is_none() {
            return Err(Error::NotFound(format!("seller {}", seller_id)));
        }

        let rows = self.db.inventory_rows(seller_id)?;
        let result = reconcile(extracted, &rows, &self.config);
        let hash = batch_hash(extracted);

        let session =
            self.db
                .create_session(seller_id, &hash, extracted.len() as i64, &result.changes)?;

        let counts = result.counts();
        info!(
            "Session {} for seller {}: {} extracted, {} existing -> {} create, {} update, {} delete, {} unchanged",
            session.id,
            seller_id,
            extracted.len(),
            result.total_existing,
            counts.creates,
            counts.updates,
            counts.deletes,
            counts.unchanged
        );

        let summary = ReconciliationSummary {
            session_id: session.id,
            seller_id,
            total_extracted: extracted.len() as i64,
            total_existing: result.total_existing as i64,
            counts,
            exact_matches: result.matches_by(MatchMethod::Exact) as i64,
            composite_matches: result.matches_by(MatchMethod::Composite) as i64,
            algorithmic_matches: result.matches_by(MatchMethod::Algorithmic) as i64,
            batch_hash: hash,
        };

        let details = serde_json::to_string(&summary.counts).ok();
        self.db.log_audit(
            actor,
            "create_session",
            Some("extraction_session"),
            Some(session.id.to_string().as_str()),
            details.as_deref(),
        )?;

        Ok(summary)
    }
}
