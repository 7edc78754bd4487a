//! Turns match results and diffs into typed changes

use std::collections::HashSet;

use crate::models::{ChangeKind, MatchResult, ProposedChange, VehicleRecord};
use crate::reconcile::diff::diff_records;
use crate::reconcile::index::InventoryIndex;

/// One change per extracted record, then a delete for every unclaimed listing.
///
/// `matches` must be parallel to `extracted`.
pub fn classify(
    extracted: &[VehicleRecord],
    matches: Vec<MatchResult>,
    index: &InventoryIndex,
) -> Vec<ProposedChange> {
    let mut changes = Vec::with_capacity(extracted.len() + index.len());
    let mut claimed = HashSet::new();

    for (record, match_result) in extracted.iter().zip(matches) {
        let existing = match_result
            .matched_listing_id
            .and_then(|id| index.get(id).map(|r| (id, r)));

        let kind = match existing {
            Some((existing_listing_id, existing)) => {
                claimed.insert(existing_listing_id);
                let field_changes = diff_records(existing, record);
                if field_changes.is_empty() {
                    ChangeKind::Unchanged {
                        existing_listing_id,
                        extracted: record.clone(),
                    }
                } else {
                    ChangeKind::Update {
                        existing_listing_id,
                        extracted: record.clone(),
                        field_changes,
                    }
                }
            }
            None => ChangeKind::Create {
                extracted: record.clone(),
            },
        };
        changes.push(ProposedChange { kind, match_result });
    }

    let matched = claimed.len();
    let mut deletes = 0;
    for existing in index.records() {
        let Some(existing_listing_id) = existing.listing_id else {
            continue;
        };
        if !claimed.contains(&existing_listing_id) {
            deletes += 1;
            changes.push(ProposedChange {
                kind: ChangeKind::Delete {
                    existing_listing_id,
                },
                match_result: MatchResult::unmatched(),
            });
        }
    }

    if deletes > matched {
        tracing::warn!(
            "{} listings missing from the batch will be proposed for deletion ({} matched); \
             uploads are treated as the seller's full inventory",
            deletes,
            matched
        );
    }

    changes
}
