//! Extraction sessions and change rows
//!
//! `ChangeKind` is flattened into nullable columns here and rebuilt on load.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{opt_uuid_column, parse_datetime, uuid_column, Database};
use crate::error::{Error, Result};
use crate::models::{
    ChangeCounts, ChangeFilter, ChangeKind, ChangeStatus, ChangeType, ExtractionChange,
    ExtractionSession, FieldChanges, MatchFactors, MatchMethod, ProposedChange, SessionStatus,
    VehicleRecord,
};

const SESSION_COLUMNS: &str = r#"
    id, seller_id, status, batch_hash, total_extracted,
    total_creates, total_updates, total_deletes, total_unchanged,
    applied_creates, applied_updates, applied_deletes, discarded_count, error_count,
    applied_at, applied_by, created_at
"#;

const CHANGE_COLUMNS: &str = r#"
    id, session_id, change_type, change_status, existing_listing_id, detached_listing_id,
    extracted_payload, field_changes, match_method, confidence, match_factors,
    applied_listing_id, error_message, applied_at, applied_by, created_at
"#;

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(Error::InvalidData(message)),
    )
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn parse_column<T: std::str::FromStr<Err = String>>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractionSession> {
    let applied_at: Option<String> = row.get(14)?;
    let created_at: String = row.get(16)?;
    Ok(ExtractionSession {
        id: uuid_column(row, 0)?,
        seller_id: uuid_column(row, 1)?,
        status: parse_column::<SessionStatus>(row, 2)?,
        batch_hash: row.get(3)?,
        total_extracted: row.get(4)?,
        counts: ChangeCounts {
            creates: row.get(5)?,
            updates: row.get(6)?,
            deletes: row.get(7)?,
            unchanged: row.get(8)?,
        },
        applied_creates: row.get(9)?,
        applied_updates: row.get(10)?,
        applied_deletes: row.get(11)?,
        discarded_count: row.get(12)?,
        error_count: row.get(13)?,
        applied_at: applied_at.as_deref().map(parse_datetime),
        applied_by: row.get(15)?,
        created_at: parse_datetime(&created_at),
    })
}

pub(crate) fn row_to_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractionChange> {
    let change_type = parse_column::<ChangeType>(row, 2)?;
    // A listing deleted after this change was computed leaves only the detached id
    let existing = opt_uuid_column(row, 4)?.or(opt_uuid_column(row, 5)?);
    let extracted: Option<VehicleRecord> = json_column(row, 6)?;
    let field_changes: Option<FieldChanges> = json_column(row, 7)?;
    let kind = ChangeKind::from_parts(change_type, existing, extracted, field_changes)
        .map_err(|e| conversion_error(2, e.to_string()))?;

    let applied_at: Option<String> = row.get(13)?;
    let created_at: String = row.get(15)?;
    Ok(ExtractionChange {
        id: uuid_column(row, 0)?,
        session_id: uuid_column(row, 1)?,
        kind,
        change_status: parse_column::<ChangeStatus>(row, 3)?,
        match_method: parse_column::<MatchMethod>(row, 8)?,
        confidence: row.get(9)?,
        match_factors: json_column::<MatchFactors>(row, 10)?,
        applied_listing_id: opt_uuid_column(row, 11)?,
        error_message: row.get(12)?,
        applied_at: applied_at.as_deref().map(parse_datetime),
        applied_by: row.get(14)?,
        created_at: parse_datetime(&created_at),
    })
}

/// Appends the optional change filter to a WHERE clause
fn filter_clause(filter: &ChangeFilter, params: &mut Vec<String>) -> String {
    let mut clause = String::new();
    if let Some(change_type) = filter.change_type {
        clause.push_str(" AND change_type = ?");
        params.push(change_type.as_str().to_string());
    }
    if let Some(status) = filter.status {
        clause.push_str(" AND change_status = ?");
        params.push(status.as_str().to_string());
    }
    clause
}

pub(crate) fn load_change(conn: &Connection, change_id: Uuid) -> Result<Option<ExtractionChange>> {
    let sql = format!("SELECT {} FROM extraction_changes WHERE id = ?", CHANGE_COLUMNS);
    Ok(conn
        .query_row(&sql, params![change_id.to_string()], row_to_change)
        .optional()?)
}

impl Database {
    /// Persist a session and its computed changes in one transaction
    pub fn create_session(
        &self,
        seller_id: Uuid,
        batch_hash: &str,
        total_extracted: i64,
        changes: &[ProposedChange],
    ) -> Result<ExtractionSession> {
        let session_id = Uuid::new_v4();
        let counts = ChangeCounts::tally(changes.iter().map(|c| &c.kind));
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO extraction_sessions (
                id, seller_id, status, batch_hash, total_extracted,
                total_creates, total_updates, total_deletes, total_unchanged, created_at
            ) VALUES (?, ?, 'created', ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                session_id.to_string(),
                seller_id.to_string(),
                batch_hash,
                total_extracted,
                counts.creates,
                counts.updates,
                counts.deletes,
                counts.unchanged,
                created_at
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO extraction_changes (
                    id, session_id, position, change_type, change_status, existing_listing_id,
                    extracted_payload, field_changes, match_method, confidence, match_factors,
                    created_at
                ) VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;

            for (position, change) in changes.iter().enumerate() {
                let extracted = change
                    .kind
                    .extracted()
                    .map(serde_json::to_string)
                    .transpose()?;
                let field_changes = change
                    .kind
                    .field_changes()
                    .map(serde_json::to_string)
                    .transpose()?;
                let factors = change
                    .match_result
                    .factors
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;

                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    position as i64,
                    change.kind.change_type().as_str(),
                    change.kind.existing_listing_id().map(|id| id.to_string()),
                    extracted,
                    field_changes,
                    change.match_result.method.as_str(),
                    change.match_result.confidence,
                    factors,
                    created_at
                ])?;
            }
        }

        tx.execute(
            "UPDATE extraction_sessions SET status = 'changes_computed' WHERE id = ?",
            params![session_id.to_string()],
        )?;
        tx.commit()?;

        self.get_session(session_id)?
            .ok_or(Error::SessionNotFound(session_id))
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<ExtractionSession>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM extraction_sessions WHERE id = ?", SESSION_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.to_string()], row_to_session)
            .optional()?)
    }

    /// Newest first, optionally restricted to one seller
    pub fn list_sessions(
        &self,
        seller_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExtractionSession>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM extraction_sessions
            WHERE (?1 IS NULL OR seller_id = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
            SESSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(
                params![seller_id.map(|id| id.to_string()), limit, offset],
                row_to_session,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn count_sessions(&self, seller_id: Option<Uuid>) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM extraction_sessions WHERE (?1 IS NULL OR seller_id = ?1)",
            params![seller_id.map(|id| id.to_string())],
            |row| row.get(0),
        )?)
    }

    /// A page of a session's changes in computed order
    pub fn list_changes(
        &self,
        session_id: Uuid,
        filter: &ChangeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ExtractionChange>> {
        let conn = self.conn()?;
        let mut values = vec![session_id.to_string()];
        let clause = filter_clause(filter, &mut values);
        let sql = format!(
            "SELECT {} FROM extraction_changes WHERE session_id = ?{} ORDER BY position LIMIT {} OFFSET {}",
            CHANGE_COLUMNS,
            clause,
            limit.max(0),
            offset.max(0)
        );
        let mut stmt = conn.prepare(&sql)?;
        let changes = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), row_to_change)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(changes)
    }

    pub fn count_changes(&self, session_id: Uuid, filter: &ChangeFilter) -> Result<i64> {
        let conn = self.conn()?;
        let mut values = vec![session_id.to_string()];
        let clause = filter_clause(filter, &mut values);
        let sql = format!(
            "SELECT COUNT(*) FROM extraction_changes WHERE session_id = ?{}",
            clause
        );
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(values.iter()), |row| {
            row.get(0)
        })?)
    }

    /// Every change of a session in computed order
    pub fn session_changes(&self, session_id: Uuid) -> Result<Vec<ExtractionChange>> {
        self.list_changes(session_id, &ChangeFilter::default(), i64::MAX, 0)
    }

    pub fn get_change(&self, change_id: Uuid) -> Result<Option<ExtractionChange>> {
        let conn = self.conn()?;
        load_change(&conn, change_id)
    }
}
