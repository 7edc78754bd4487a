//! Applying operator-selected changes to inventory
//!
//! Each change is claimed (`pending -> selected`), applied and marked applied
//! in one transaction, so an interrupted apply leaves an applied prefix and
//! the remainder `pending`. A failing change is marked `failed` and
//! processing continues.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::inventory::{insert_listing, listing_exists, replace_offers};
use super::Database;
use crate::error::{Error, Result};
use crate::models::{
    ApplyErrorEntry, ApplyRequest, ApplyResult, ChangeKind, ChangeStatus, ChangeType,
    ExtractionChange, FieldChanges, Offer,
};
use crate::reconcile::diff;

/// Holds a session's slot in the in-process apply set until dropped
pub(crate) struct ApplyGuard {
    applying: Arc<Mutex<HashSet<Uuid>>>,
    session_id: Uuid,
}

impl Drop for ApplyGuard {
    fn drop(&mut self) {
        if let Ok(mut applying) = self.applying.lock() {
            applying.remove(&self.session_id);
        }
    }
}

fn apply_order(change_type: ChangeType) -> u8 {
    match change_type {
        ChangeType::Create => 0,
        ChangeType::Update => 1,
        ChangeType::Delete => 2,
        ChangeType::Unchanged => 3,
    }
}

/// Listing column for a diff field name
fn column_for(field: &str) -> Option<&'static str> {
    Some(match field {
        diff::FIELD_VARIANT => "variant",
        diff::FIELD_YEAR => "year",
        diff::FIELD_HORSEPOWER => "horsepower",
        diff::FIELD_TRANSMISSION => "transmission",
        diff::FIELD_DRIVETRAIN => "drivetrain",
        diff::FIELD_FUEL_TYPE => "fuel_type",
        diff::FIELD_BODY_TYPE => "body_type",
        diff::FIELD_CO2_EMISSION => "co2_emission",
        diff::FIELD_WLTP_RANGE => "wltp_range",
        diff::FIELD_CONSUMPTION => "consumption_l_100km",
        _ => return None,
    })
}

fn sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => n.as_f64().map(Sql::Real).unwrap_or(Sql::Null),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

/// Write only the changed fields of a listing
fn apply_field_changes(conn: &Connection, listing_id: Uuid, changes: &FieldChanges) -> Result<()> {
    for (field, change) in changes {
        if field == diff::FIELD_OFFERS {
            let offers: Option<Vec<Offer>> = serde_json::from_value(change.new.clone())?;
            replace_offers(conn, listing_id, offers.as_deref().unwrap_or(&[]))?;
            continue;
        }
        let column = column_for(field)
            .ok_or_else(|| Error::Apply(format!("Unknown field '{}'", field)))?;
        conn.execute(
            &format!(
                "UPDATE listings SET {} = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                column
            ),
            params![sql_value(&change.new), listing_id.to_string()],
        )?;
    }
    Ok(())
}

/// Delete a listing: detach change references, then pricing, then the listing
fn delete_listing(conn: &Connection, listing_id: Uuid) -> Result<()> {
    let id = listing_id.to_string();
    conn.execute(
        r#"
        UPDATE extraction_changes
        SET detached_listing_id = existing_listing_id, existing_listing_id = NULL
        WHERE existing_listing_id = ?
        "#,
        params![id],
    )?;
    conn.execute("DELETE FROM lease_pricing WHERE listing_id = ?", params![id])?;
    conn.execute("DELETE FROM listings WHERE id = ?", params![id])?;
    Ok(())
}

fn require_listing(conn: &Connection, listing_id: Uuid) -> Result<()> {
    if listing_exists(conn, listing_id)? {
        Ok(())
    } else {
        Err(Error::Apply(format!(
            "Listing {} no longer exists",
            listing_id
        )))
    }
}

/// Claim, apply and mark one change applied in a single transaction.
///
/// Returns `Ok(false)` without side effects when the change is no longer
/// pending. On error the transaction rolls back and the change stays pending.
fn apply_one(
    conn: &mut Connection,
    seller_id: Uuid,
    change: &ExtractionChange,
    applied_by: &str,
    applied_at: &str,
) -> Result<bool> {
    let tx = conn.transaction()?;

    let claimed = tx.execute(
        "UPDATE extraction_changes SET change_status = 'selected' WHERE id = ? AND change_status = 'pending'",
        params![change.id.to_string()],
    )?;
    if claimed != 1 {
        return Ok(false);
    }

    let applied_listing_id = match &change.kind {
        ChangeKind::Create { extracted } => Some(insert_listing(&tx, seller_id, extracted)?),
        ChangeKind::Update {
            existing_listing_id,
            field_changes,
            ..
        } => {
            require_listing(&tx, *existing_listing_id)?;
            apply_field_changes(&tx, *existing_listing_id, field_changes)?;
            None
        }
        ChangeKind::Delete {
            existing_listing_id,
        } => {
            require_listing(&tx, *existing_listing_id)?;
            delete_listing(&tx, *existing_listing_id)?;
            None
        }
        ChangeKind::Unchanged { .. } => None,
    };

    tx.execute(
        r#"
        UPDATE extraction_changes
        SET change_status = 'applied', applied_listing_id = ?, applied_at = ?, applied_by = ?,
            error_message = NULL
        WHERE id = ?
        "#,
        params![
            applied_listing_id.map(|id| id.to_string()),
            applied_at,
            applied_by,
            change.id.to_string()
        ],
    )?;

    tx.commit()?;
    Ok(true)
}

fn error_entry(change_id: Uuid, change_type: Option<ChangeType>, error: String) -> ApplyErrorEntry {
    ApplyErrorEntry {
        change_id: change_id.to_string(),
        change_type,
        error,
    }
}

impl Database {
    pub(crate) fn begin_apply(&self, session_id: Uuid) -> Result<ApplyGuard> {
        let mut applying = self
            .applying
            .lock()
            .map_err(|_| Error::Apply("apply guard lock poisoned".into()))?;
        if !applying.insert(session_id) {
            return Err(Error::ApplyInProgress(session_id));
        }
        Ok(ApplyGuard {
            applying: Arc::clone(&self.applying),
            session_id,
        })
    }

    /// Return changes left `selected` by an interrupted apply to `pending`.
    ///
    /// Only safe while the session's apply guard is held.
    fn release_stranded_claims(&self, session_id: Uuid) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE extraction_changes SET change_status = 'pending' WHERE session_id = ? AND change_status = 'selected'",
            params![session_id.to_string()],
        )?;
        Ok(count as i64)
    }

    /// Discard the pending changes of a session that were not selected
    fn discard_unselected(&self, pending: &[Uuid]) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut discarded = 0i64;
        for id in pending {
            discarded += tx.execute(
                "UPDATE extraction_changes SET change_status = 'discarded' WHERE id = ? AND change_status = 'pending'",
                params![id.to_string()],
            )? as i64;
        }
        tx.commit()?;
        Ok(discarded)
    }

    /// Apply the selected changes of a session.
    ///
    /// Creates run first, then updates, then deletes. Per-change failures are
    /// reported in the result rather than returned as errors. Pending changes
    /// that were not selected are discarded before processing starts; once it
    /// starts, bookkeeping failures are logged and the result is still returned.
    pub fn apply_changes(&self, request: &ApplyRequest) -> Result<ApplyResult> {
        let _guard = self.begin_apply(request.session_id)?;

        let session = self
            .get_session(request.session_id)?
            .ok_or(Error::SessionNotFound(request.session_id))?;

        let released = self.release_stranded_claims(session.id)?;
        if released > 0 {
            warn!(
                "Released {} changes left selected by an interrupted apply of session {}",
                released, session.id
            );
        }

        let changes = self.session_changes(session.id)?;
        let by_id: HashMap<Uuid, &ExtractionChange> = changes.iter().map(|c| (c.id, c)).collect();

        let mut errors = Vec::new();
        let mut selected: Vec<&ExtractionChange> = Vec::new();
        let mut seen = HashSet::new();
        for change_id in &request.change_ids {
            let Some(change) = by_id.get(change_id).copied() else {
                errors.push(error_entry(
                    *change_id,
                    None,
                    "Change not found in session".to_string(),
                ));
                continue;
            };
            if change.change_status != ChangeStatus::Pending {
                errors.push(error_entry(
                    *change_id,
                    Some(change.kind.change_type()),
                    format!("Change is already {}", change.change_status),
                ));
                continue;
            }
            if seen.insert(change.id) {
                selected.push(change);
            }
        }

        let unselected: Vec<Uuid> = changes
            .iter()
            .filter(|c| c.change_status == ChangeStatus::Pending && !seen.contains(&c.id))
            .map(|c| c.id)
            .collect();
        let discarded_count = self.discard_unselected(&unselected)?;

        // Stable sort keeps computed order within each type
        selected.sort_by_key(|c| apply_order(c.kind.change_type()));

        let applied_at = Utc::now();
        let stamp = applied_at.to_rfc3339();
        let (mut creates, mut updates, mut deletes) = (0i64, 0i64, 0i64);
        let mut processed = 0i64;
        let mut conn = self.conn()?;

        for change in &selected {
            let change_type = change.kind.change_type();
            match apply_one(&mut conn, session.seller_id, change, &request.applied_by, &stamp) {
                Ok(true) => {
                    processed += 1;
                    match change_type {
                        ChangeType::Create => creates += 1,
                        ChangeType::Update => updates += 1,
                        ChangeType::Delete => deletes += 1,
                        ChangeType::Unchanged => {}
                    }
                }
                Ok(false) => {
                    errors.push(error_entry(
                        change.id,
                        Some(change_type),
                        "Change is no longer pending".to_string(),
                    ));
                }
                Err(e) => {
                    processed += 1;
                    let message = e.to_string();
                    warn!("Failed to apply {} change {}: {}", change_type, change.id, message);
                    if let Err(mark_err) = conn.execute(
                        r#"
                        UPDATE extraction_changes
                        SET change_status = 'failed', error_message = ?, applied_at = ?, applied_by = ?
                        WHERE id = ? AND change_status = 'pending'
                        "#,
                        params![message, stamp, request.applied_by, change.id.to_string()],
                    ) {
                        warn!("Could not mark change {} failed: {}", change.id, mark_err);
                    }
                    errors.push(error_entry(change.id, Some(change_type), message));
                }
            }
        }

        let error_count = errors.len() as i64;
        if let Err(e) = conn.execute(
            r#"
            UPDATE extraction_sessions
            SET applied_creates = applied_creates + ?,
                applied_updates = applied_updates + ?,
                applied_deletes = applied_deletes + ?,
                discarded_count = discarded_count + ?,
                error_count = error_count + ?,
                applied_at = ?,
                applied_by = ?
            WHERE id = ?
            "#,
            params![
                creates,
                updates,
                deletes,
                discarded_count,
                error_count,
                stamp,
                request.applied_by,
                session.id.to_string()
            ],
        ) {
            warn!("Could not update counters of session {}: {}", session.id, e);
        }

        let result = ApplyResult {
            applied_creates: creates,
            applied_updates: updates,
            applied_deletes: deletes,
            discarded_count,
            total_processed: processed,
            error_count,
            errors,
            session_id: session.id,
            applied_by: request.applied_by.clone(),
            applied_at,
        };

        info!(
            "Applied session {}: {} created, {} updated, {} deleted, {} discarded, {} errors",
            session.id, creates, updates, deletes, discarded_count, error_count
        );

        let details = serde_json::json!({
            "applied_creates": creates,
            "applied_updates": updates,
            "applied_deletes": deletes,
            "discarded_count": discarded_count,
            "error_count": error_count,
        })
        .to_string();
        if let Err(e) = self.log_audit(
            &request.applied_by,
            "apply_changes",
            Some("extraction_session"),
            Some(session.id.to_string().as_str()),
            Some(details.as_str()),
        ) {
            warn!("Could not write audit entry for session {}: {}", session.id, e);
        }

        Ok(result)
    }
}
