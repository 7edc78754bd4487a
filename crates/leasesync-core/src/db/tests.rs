//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::Reconciler;
    use rusqlite::params;
    use crate::test_utils::{seed_inventory, RecordBuilder};

    fn aygo() -> RecordBuilder {
        RecordBuilder::new("Toyota", "Aygo X", "Active")
            .horsepower(72)
            .transmission(Transmission::Automatic)
            .fuel_type("Benzin")
            .offer(2899, 36, 15000)
            .offer(3199, 36, 20000)
    }

    fn yaris() -> RecordBuilder {
        RecordBuilder::new("Toyota", "Yaris Cross", "Style")
            .horsepower(116)
            .fuel_type("Hybrid")
            .offer(3999, 36, 15000)
    }

    fn bz4x() -> RecordBuilder {
        RecordBuilder::new("Toyota", "bZ4X", "Active")
            .horsepower(204)
            .fuel_type("El")
            .offer(4999, 36, 15000)
    }

    fn seeded() -> (Database, Uuid, Vec<Uuid>) {
        let db = Database::in_memory().unwrap();
        let (seller, ids) = seed_inventory(
            &db,
            "Toyota Danmark",
            &[aygo().build(), yaris().build(), bz4x().build()],
        )
        .unwrap();
        (db, seller, ids)
    }

    /// Aygo unchanged (offers reordered), Yaris repriced, Corolla new, bZ4X missing
    fn mixed_batch() -> Vec<VehicleRecord> {
        let mut aygo = aygo().build();
        if let Some(offers) = aygo.offers.as_mut() {
            offers.reverse();
        }
        vec![
            aygo,
            RecordBuilder::new("Toyota", "Yaris Cross", "Style")
                .horsepower(116)
                .offer(4199, 36, 15000)
                .build(),
            RecordBuilder::new("Toyota", "Corolla", "Touring Sports 140 hk")
                .fuel_type("Hybrid")
                .offer(4599, 36, 15000)
                .build(),
        ]
    }

    fn apply_all(db: &Database, session_id: Uuid) -> ApplyResult {
        let ids: Vec<String> = db
            .session_changes(session_id)
            .unwrap()
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        let request = ApplyRequest::parse(&session_id.to_string(), &ids, "tester").unwrap();
        db.apply_changes(&request).unwrap()
    }

    fn change_of_type(db: &Database, session_id: Uuid, change_type: ChangeType) -> ExtractionChange {
        let filter = ChangeFilter {
            change_type: Some(change_type),
            status: None,
        };
        db.list_changes(session_id, &filter, 10, 0)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_sellers().unwrap().is_empty());
        assert!(db.list_audit_log(10).unwrap().is_empty());
    }

    #[test]
    fn test_full_listing_view_schema() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let result: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('full_listing_view') WHERE name IN ('listing_id', 'seller_id', 'make', 'model', 'variant', 'monthly_price', 'first_payment', 'period_months', 'mileage_per_year')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(result, 9, "view should expose listing and pricing columns");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_make_upsert_is_case_insensitive() {
        let db = Database::in_memory().unwrap();
        let first = db.create_make("Toyota").unwrap();
        let second = db.create_make(" toyota ").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.list_makes().unwrap().len(), 1);
        assert!(db.create_make("  ").is_err());
    }

    #[test]
    fn test_seller_crud() {
        let db = Database::in_memory().unwrap();
        let seller = db.create_seller("Bilhuset Vest").unwrap();
        let loaded = db.get_seller(seller.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Bilhuset Vest");
        assert!(db.get_seller(Uuid::new_v4()).unwrap().is_none());
        // Names are unique
        assert!(db.create_seller("Bilhuset Vest").is_err());
    }

    #[test]
    fn test_inventory_rows_one_per_price_row() {
        let (db, seller, ids) = seeded();
        assert_eq!(ids.len(), 3);

        let rows = db.inventory_rows(seller).unwrap();
        assert_eq!(rows.len(), 4); // aygo has two offers

        let listings = db.list_listings(seller).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].listing_id, Some(ids[0]));
        assert_eq!(listings[0].offers.as_ref().unwrap().len(), 2);
        assert_eq!(listings[0].transmission, Some(Transmission::Automatic));
    }

    #[test]
    fn test_listing_without_offers_is_still_listed() {
        let db = Database::in_memory().unwrap();
        let record = RecordBuilder::new("Mazda", "MX-30", "Makoto").without_offers().build();
        let (seller, ids) = seed_inventory(&db, "Mazda Nord", &[record]).unwrap();
        let listing = db.get_listing(ids[0]).unwrap().unwrap();
        assert_eq!(listing.offers, Some(vec![]));
        assert_eq!(db.count_listings(seller).unwrap(), 1);
    }

    #[test]
    fn test_import_requires_existing_make() {
        let db = Database::in_memory().unwrap();
        let seller = db.create_seller("Ukendt").unwrap();
        let result = db.import_listings(seller.id, &[aygo().build()]);
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(db.count_listings(seller.id).unwrap(), 0);
    }

    #[test]
    fn test_create_session_persists_typed_changes() {
        let (db, seller, ids) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();

        assert_eq!(summary.counts.creates, 1);
        assert_eq!(summary.counts.updates, 1);
        assert_eq!(summary.counts.deletes, 1);
        assert_eq!(summary.counts.unchanged, 1);
        assert_eq!(summary.exact_matches, 2);

        let session = db.get_session(summary.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::ChangesComputed);
        assert_eq!(session.total_extracted, 3);
        assert_eq!(session.batch_hash, summary.batch_hash);

        let changes = db.session_changes(session.id).unwrap();
        assert_eq!(changes.len(), 4);
        assert!(changes.iter().all(|c| c.change_status == ChangeStatus::Pending));

        let update = change_of_type(&db, session.id, ChangeType::Update);
        assert_eq!(update.kind.existing_listing_id(), Some(ids[1]));
        let field_changes = update.kind.field_changes().unwrap();
        assert!(field_changes.contains_key("offers"));
        assert!(!field_changes.contains_key("fuel_type"));

        let delete = change_of_type(&db, session.id, ChangeType::Delete);
        assert_eq!(delete.kind.existing_listing_id(), Some(ids[2]));
        assert!(delete.kind.extracted().is_none());

        let create = change_of_type(&db, session.id, ChangeType::Create);
        assert!(create.kind.existing_listing_id().is_none());
        assert_eq!(create.match_method, MatchMethod::Unmatched);
    }

    #[test]
    fn test_list_changes_pagination_and_counts() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();

        let all = ChangeFilter::default();
        assert_eq!(db.count_changes(summary.session_id, &all).unwrap(), 4);

        let page = db.list_changes(summary.session_id, &all, 2, 2).unwrap();
        assert_eq!(page.len(), 2);
        let full = db.session_changes(summary.session_id).unwrap();
        assert_eq!(page[0].id, full[2].id);

        let deletes = ChangeFilter {
            change_type: Some(ChangeType::Delete),
            status: Some(ChangeStatus::Pending),
        };
        assert_eq!(db.count_changes(summary.session_id, &deletes).unwrap(), 1);
    }

    #[test]
    fn test_list_sessions_by_seller() {
        let (db, seller, _) = seeded();
        let other = db.create_seller("Anden").unwrap();
        Reconciler::new(&db).run(seller, &mixed_batch(), "t").unwrap();
        Reconciler::new(&db).run(seller, &[], "t").unwrap();
        Reconciler::new(&db).run(other.id, &[], "t").unwrap();

        assert_eq!(db.list_sessions(Some(seller), 10, 0).unwrap().len(), 2);
        assert_eq!(db.list_sessions(None, 10, 0).unwrap().len(), 3);
        assert_eq!(db.list_sessions(None, 1, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_all_changes() {
        let (db, seller, ids) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();

        let result = apply_all(&db, summary.session_id);
        assert_eq!(result.applied_creates, 1);
        assert_eq!(result.applied_updates, 1);
        assert_eq!(result.applied_deletes, 1);
        assert_eq!(result.total_processed, 4);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.discarded_count, 0);

        // Yaris repriced, bZ4X gone, Corolla created under an auto-created model
        let yaris = db.get_listing(ids[1]).unwrap().unwrap();
        assert_eq!(yaris.lowest_monthly_price(), Some(4199));
        assert_eq!(yaris.fuel_type.as_deref(), Some("Hybrid"));
        assert!(db.get_listing(ids[2]).unwrap().is_none());
        assert_eq!(db.count_listings(seller).unwrap(), 3);

        let create = change_of_type(&db, summary.session_id, ChangeType::Create);
        assert_eq!(create.change_status, ChangeStatus::Applied);
        let created = db.get_listing(create.applied_listing_id.unwrap()).unwrap().unwrap();
        assert_eq!(created.model, "Corolla");

        let session = db.get_session(summary.session_id).unwrap().unwrap();
        assert_eq!(session.applied_creates, 1);
        assert_eq!(session.applied_by.as_deref(), Some("tester"));
        assert!(session.applied_at.is_some());
        // Apply never changes the session lifecycle status
        assert_eq!(session.status, SessionStatus::ChangesComputed);
    }

    #[test]
    fn test_apply_discards_unselected_pending_changes() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        let update = change_of_type(&db, summary.session_id, ChangeType::Update);

        let request = ApplyRequest::parse(
            &summary.session_id.to_string(),
            &[update.id.to_string()],
            "tester",
        )
        .unwrap();
        let result = db.apply_changes(&request).unwrap();
        assert_eq!(result.applied_updates, 1);
        assert_eq!(result.total_processed, 1);
        assert_eq!(result.discarded_count, 3);

        let discarded = ChangeFilter {
            change_type: None,
            status: Some(ChangeStatus::Discarded),
        };
        assert_eq!(db.count_changes(summary.session_id, &discarded).unwrap(), 3);
        // The delete candidate was discarded, so bZ4X survives
        assert_eq!(db.count_listings(seller).unwrap(), 3);
    }

    #[test]
    fn test_apply_reports_unknown_and_already_applied_ids() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        let update = change_of_type(&db, summary.session_id, ChangeType::Update);
        let session = summary.session_id.to_string();

        let first = ApplyRequest::parse(&session, &[update.id.to_string()], "a").unwrap();
        db.apply_changes(&first).unwrap();

        let unknown = Uuid::new_v4();
        let again = ApplyRequest::parse(
            &session,
            &[update.id.to_string(), unknown.to_string()],
            "b",
        )
        .unwrap();
        let result = db.apply_changes(&again).unwrap();
        assert_eq!(result.total_processed, 0);
        assert_eq!(result.error_count, 2);
        assert_eq!(result.errors[0].change_type, Some(ChangeType::Update));
        assert!(result.errors[0].error.contains("already applied"));
        assert_eq!(result.errors[1].change_id, unknown.to_string());
        assert_eq!(result.errors[1].change_type, None);
    }

    #[test]
    fn test_apply_unknown_session() {
        let db = Database::in_memory().unwrap();
        let request = ApplyRequest::parse(
            &Uuid::new_v4().to_string(),
            &[Uuid::new_v4().to_string()],
            "tester",
        )
        .unwrap();
        assert!(matches!(
            db.apply_changes(&request),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_apply_in_progress_is_rejected() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        let update = change_of_type(&db, summary.session_id, ChangeType::Update);
        let request = ApplyRequest::parse(
            &summary.session_id.to_string(),
            &[update.id.to_string()],
            "tester",
        )
        .unwrap();

        let guard = db.clone().begin_apply(summary.session_id).unwrap();
        assert!(matches!(
            db.apply_changes(&request),
            Err(Error::ApplyInProgress(_))
        ));
        drop(guard);

        assert_eq!(db.apply_changes(&request).unwrap().applied_updates, 1);
    }

    #[test]
    fn test_retry_after_interrupted_apply() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        let changes = db.session_changes(summary.session_id).unwrap();

        // A process that died mid-apply leaves its claims behind
        db.conn()
            .unwrap()
            .execute(
                "UPDATE extraction_changes SET change_status = 'selected' WHERE session_id = ?",
                params![summary.session_id.to_string()],
            )
            .unwrap();

        let result = apply_all(&db, summary.session_id);
        assert_eq!(result.error_count, 0);
        assert_eq!(result.total_processed, changes.len() as i64);
        assert_eq!(result.applied_creates, 1);
        assert_eq!(result.applied_updates, 1);
        assert_eq!(result.applied_deletes, 1);

        let statuses: Vec<ChangeStatus> = db
            .session_changes(summary.session_id)
            .unwrap()
            .iter()
            .map(|c| c.change_status)
            .collect();
        assert!(statuses.iter().all(|s| *s == ChangeStatus::Applied));
    }

    #[test]
    fn test_apply_result_survives_bookkeeping_failure() {
        let (db, seller, ids) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        db.conn()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TRIGGER fail_counters BEFORE UPDATE ON extraction_sessions
                BEGIN SELECT RAISE(ABORT, 'counters unavailable'); END;
                CREATE TRIGGER fail_audit BEFORE INSERT ON audit_log
                BEGIN SELECT RAISE(ABORT, 'audit unavailable'); END;
                "#,
            )
            .unwrap();

        let result = apply_all(&db, summary.session_id);
        assert_eq!(result.applied_updates, 1);
        assert_eq!(result.applied_deletes, 1);
        assert_eq!(result.error_count, 0);

        // The committed changes are in place even though the counters are not
        assert!(db.get_listing(ids[2]).unwrap().is_none());
        let session = db.get_session(summary.session_id).unwrap().unwrap();
        assert_eq!(session.applied_updates, 0);
    }

    #[test]
    fn test_create_with_unknown_make_fails_in_isolation() {
        let (db, seller, _) = seeded();
        let mut batch = mixed_batch();
        batch.push(
            RecordBuilder::new("Lexus", "UX", "300e")
                .offer(5999, 36, 15000)
                .build(),
        );
        let summary = Reconciler::new(&db).run(seller, &batch, "tester").unwrap();

        let result = apply_all(&db, summary.session_id);
        assert_eq!(result.error_count, 1);
        assert!(result.errors[0].error.contains("Lexus"));
        assert_eq!(result.errors[0].change_type, Some(ChangeType::Create));
        assert_eq!(result.applied_creates, 1);
        assert_eq!(result.applied_updates, 1);
        assert_eq!(result.applied_deletes, 1);

        let failed = ChangeFilter {
            change_type: None,
            status: Some(ChangeStatus::Failed),
        };
        let failed = db.list_changes(summary.session_id, &failed, 10, 0).unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error_message.is_some());
    }

    #[test]
    fn test_delete_detaches_references_from_other_sessions() {
        let (db, seller, ids) = seeded();
        let first = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "tester")
            .unwrap();
        // Second session sees the full inventory, including bZ4X
        let second = Reconciler::new(&db)
            .run(seller, &[bz4x().offer(5199, 48, 10000).build()], "tester")
            .unwrap();

        let delete = change_of_type(&db, first.session_id, ChangeType::Delete);
        let request = ApplyRequest::parse(
            &first.session_id.to_string(),
            &[delete.id.to_string()],
            "tester",
        )
        .unwrap();
        assert_eq!(db.apply_changes(&request).unwrap().applied_deletes, 1);

        let conn = db.conn().unwrap();
        let attached: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM extraction_changes WHERE existing_listing_id = ?",
                [ids[2].to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(attached, 0);
        let pricing: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM lease_pricing WHERE listing_id = ?",
                [ids[2].to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(pricing, 0);

        // The detached change still knows which listing it was about
        let update = change_of_type(&db, second.session_id, ChangeType::Update);
        assert_eq!(update.kind.existing_listing_id(), Some(ids[2]));
    }

    #[test]
    fn test_audit_log_records_sessions_and_applies() {
        let (db, seller, _) = seeded();
        let summary = Reconciler::new(&db)
            .run(seller, &mixed_batch(), "ops@dealer")
            .unwrap();
        apply_all(&db, summary.session_id);

        let entries = db.list_audit_log(10).unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert!(actions.contains(&"create_session"));
        assert!(actions.contains(&"apply_changes"));
        assert!(entries
            .iter()
            .all(|e| e.entity_id.as_deref() == Some(summary.session_id.to_string().as_str())));
    }
}
