//! Reconcile, review and apply commands

use std::path::Path;

use anyhow::{Context, Result};

use leasesync_core::db::Database;
use leasesync_core::models::{
    ApplyRequest, ChangeFilter, ChangeStatus, ChangeType, ExtractionChange,
};
use leasesync_core::{ReconcileConfig, Reconciler};

use super::{parse_id, read_records, resolve_seller, truncate};

/// Page size used when selecting every pending change
const ALL_CHANGES: i64 = i64::MAX;

fn change_label(change: &ExtractionChange) -> String {
    change
        .kind
        .extracted()
        .map(|r| r.label())
        .or_else(|| change.kind.existing_listing_id().map(|id| id.to_string()))
        .unwrap_or_default()
}

fn print_changes(changes: &[ExtractionChange]) {
    println!(
        "   {:<36}  {:<9}  {:<9}  {:<11}  {:>5}  {:<36}  {}",
        "ID", "Type", "Status", "Match", "Conf", "Vehicle", "Fields"
    );
    for change in changes {
        let fields = change
            .kind
            .field_changes()
            .map(|f| f.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        println!(
            "   {:<36}  {:<9}  {:<9}  {:<11}  {:>5.2}  {:<36}  {}",
            change.id,
            change.kind.change_type().as_str(),
            change.change_status.as_str(),
            change.match_method.as_str(),
            change.confidence,
            truncate(&change_label(change), 36),
            fields
        );
    }
}

pub fn cmd_reconcile(
    db: &Database,
    config: &ReconcileConfig,
    seller: &str,
    file: &Path,
    actor: &str,
) -> Result<()> {
    let seller = resolve_seller(db, seller)?;
    let records = read_records(file)?;

    println!(
        "🔍 Reconciling {} extracted records for {}...",
        records.len(),
        seller.name
    );

    let summary = Reconciler::with_config(db, config.clone())
        .run(seller.id, &records, actor)
        .context("Reconciliation failed")?;

    println!();
    println!("📊 Session {}", summary.session_id);
    println!("   ─────────────────────────────");
    println!("   Extracted: {}", summary.total_extracted);
    println!("   Existing:  {}", summary.total_existing);
    println!(
        "   Matches:   {} exact, {} composite, {} algorithmic",
        summary.exact_matches, summary.composite_matches, summary.algorithmic_matches
    );
    println!("   ➕ Creates:   {}", summary.counts.creates);
    println!("   ✏️  Updates:   {}", summary.counts.updates);
    println!("   ➖ Deletes:   {}", summary.counts.deletes);
    println!("   ＝ Unchanged: {}", summary.counts.unchanged);

    let filter = ChangeFilter::default();
    let changes = db.list_changes(summary.session_id, &filter, 50, 0)?;
    if !changes.is_empty() {
        println!();
        print_changes(&changes);
        if summary.counts.total() > changes.len() as i64 {
            println!(
                "   ... {} more (leasesync changes --session {})",
                summary.counts.total() - changes.len() as i64,
                summary.session_id
            );
        }
    }

    println!();
    println!(
        "Apply with: leasesync apply --session {} --all --by <name>",
        summary.session_id
    );

    Ok(())
}

pub fn cmd_sessions_list(db: &Database, seller: Option<&str>, limit: i64) -> Result<()> {
    let seller_id = match seller {
        Some(s) => Some(resolve_seller(db, s)?.id),
        None => None,
    };
    let sessions = db.list_sessions(seller_id, limit.max(1), 0)?;

    if sessions.is_empty() {
        println!("No sessions found. Create one with:");
        println!("  leasesync reconcile --seller <seller> --file extracted.json");
        return Ok(());
    }

    println!();
    println!("🗂  Sessions");
    println!("   ─────────────────────────────────────────────────────────────────────────");
    println!(
        "   {:<36}  {:<19}  {:>5}  {:>5}  {:>5}  {:>5}  {}",
        "ID", "Created", "New", "Upd", "Del", "Same", "Applied"
    );

    for session in sessions {
        let applied = match (&session.applied_at, &session.applied_by) {
            (Some(at), Some(by)) => format!("{} by {}", at.format("%Y-%m-%d %H:%M"), by),
            _ => "-".to_string(),
        };
        println!(
            "   {:<36}  {:<19}  {:>5}  {:>5}  {:>5}  {:>5}  {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
            session.counts.creates,
            session.counts.updates,
            session.counts.deletes,
            session.counts.unchanged,
            applied
        );
    }

    Ok(())
}

pub fn cmd_sessions_show(db: &Database, id: &str) -> Result<()> {
    let id = parse_id(id, "session")?;
    let session = db
        .get_session(id)?
        .with_context(|| format!("Session {} not found", id))?;
    let seller = db.get_seller(session.seller_id)?;

    println!();
    println!("📊 Session {}", session.id);
    println!("   ─────────────────────────────");
    println!(
        "   Seller:     {}",
        seller
            .map(|s| s.name)
            .unwrap_or_else(|| session.seller_id.to_string())
    );
    println!("   Status:     {}", session.status.as_str());
    println!("   Created:    {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("   Batch hash: {}", session.batch_hash);
    println!("   Extracted:  {}", session.total_extracted);
    println!(
        "   Computed:   {} create, {} update, {} delete, {} unchanged",
        session.counts.creates,
        session.counts.updates,
        session.counts.deletes,
        session.counts.unchanged
    );
    println!(
        "   Applied:    {} create, {} update, {} delete",
        session.applied_creates, session.applied_updates, session.applied_deletes
    );
    println!("   Discarded:  {}", session.discarded_count);
    println!("   Errors:     {}", session.error_count);
    if let (Some(at), Some(by)) = (&session.applied_at, &session.applied_by) {
        println!("   Last apply: {} by {}", at.format("%Y-%m-%d %H:%M:%S"), by);
    }

    Ok(())
}

pub fn cmd_changes(
    db: &Database,
    session: &str,
    change_type: Option<&str>,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let session_id = parse_id(session, "session")?;
    db.get_session(session_id)?
        .with_context(|| format!("Session {} not found", session_id))?;

    let filter = ChangeFilter {
        change_type: change_type
            .map(|t| t.parse::<ChangeType>())
            .transpose()
            .map_err(anyhow::Error::msg)?,
        status: status
            .map(|s| s.parse::<ChangeStatus>())
            .transpose()
            .map_err(anyhow::Error::msg)?,
    };

    let changes = db.list_changes(session_id, &filter, limit.max(1), 0)?;
    let total = db.count_changes(session_id, &filter)?;

    if changes.is_empty() {
        println!("No matching changes.");
        return Ok(());
    }

    println!();
    println!("📝 Changes ({} of {})", changes.len(), total);
    println!("   ─────────────────────────────────────────────────────────────────────────");
    print_changes(&changes);

    for change in changes.iter().filter(|c| c.error_message.is_some()) {
        println!(
            "   ❌ {}: {}",
            change.id,
            change.error_message.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}

pub fn cmd_apply(db: &Database, session: &str, all: bool, ids: &[String], by: &str) -> Result<()> {
    let selected: Vec<String> = if all {
        let session_id = parse_id(session, "session")?;
        db.get_session(session_id)?
            .with_context(|| format!("Session {} not found", session_id))?;
        // Selected rows were stranded by an interrupted apply and are retried
        db.list_changes(session_id, &ChangeFilter::default(), ALL_CHANGES, 0)?
            .iter()
            .filter(|c| {
                matches!(
                    c.change_status,
                    ChangeStatus::Pending | ChangeStatus::Selected
                )
            })
            .map(|c| c.id.to_string())
            .collect()
    } else {
        ids.to_vec()
    };

    if selected.is_empty() {
        println!("Nothing to apply: the session has no pending changes.");
        return Ok(());
    }

    let request = ApplyRequest::parse(session, &selected, by).context("Invalid apply request")?;

    println!(
        "⚙️  Applying {} changes from session {}...",
        request.change_ids.len(),
        request.session_id
    );

    let result = db.apply_changes(&request).context("Apply failed")?;

    println!();
    println!("📊 Apply Results");
    println!("   ─────────────────────────────");
    println!("   ➕ Created:   {}", result.applied_creates);
    println!("   ✏️  Updated:   {}", result.applied_updates);
    println!("   ➖ Deleted:   {}", result.applied_deletes);
    println!("   🗑  Discarded: {}", result.discarded_count);
    println!("   Processed:   {}", result.total_processed);

    if result.error_count > 0 {
        println!();
        println!("⚠️  {} changes could not be applied:", result.error_count);
        for error in &result.errors {
            let change_type = error
                .change_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("   {} ({}): {}", error.change_id, change_type, error.error);
        }
    } else {
        println!();
        println!("✅ All selected changes applied by {}", result.applied_by);
    }

    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit.max(1))?;

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────────────────");

    for entry in entries {
        println!(
            "   {}  {:<12}  {:<14}  {:<20}  {}",
            entry.timestamp,
            truncate(&entry.actor, 12),
            entry.action,
            entry.entity_type.as_deref().unwrap_or("-"),
            entry.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
