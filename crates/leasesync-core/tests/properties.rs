// Property-based tests for the reconciliation engine.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use leasesync_core::config::ReconcileConfig;
use leasesync_core::models::{InventoryRow, Offer, VehicleRecord};
use leasesync_core::reconcile::keys::{composite_key, exact_key, round_horsepower};
use leasesync_core::reconcile::offers::offers_equal;
use leasesync_core::reconcile::reconcile;
use proptest::prelude::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_offer() -> impl Strategy<Value = Offer> {
    (
        (20..80i64).prop_map(|p| p * 100 - 1),
        prop_oneof![Just(0i64), Just(4999i64), Just(9999i64)],
        prop_oneof![Just(24i64), Just(36i64), Just(48i64)],
        prop_oneof![Just(10000i64), Just(15000i64), Just(20000i64)],
    )
        .prop_map(|(monthly_price, first_payment, period_months, mileage_per_year)| Offer {
            monthly_price,
            first_payment,
            period_months,
            mileage_per_year,
        })
}

/// Records drawn from small pools so keys collide often
fn arb_record() -> impl Strategy<Value = VehicleRecord> {
    (
        prop_oneof![Just("Toyota"), Just("Kia")],
        prop_oneof![Just("Aygo X"), Just("EV3"), Just("Niro")],
        prop_oneof![
            Just("Active"),
            Just("Pulse"),
            Just("GT-Line"),
            Just("Active 72 HK Automatik"),
        ],
        prop_oneof![Just(None), Just(Some(72i64)), Just(Some(116)), Just(Some(204))],
        prop::collection::vec(arb_offer(), 0..3),
    )
        .prop_map(|(make, model, variant, horsepower, mut offers)| {
            // Inventory collapses duplicate price rows
            offers.sort();
            offers.dedup();
            VehicleRecord {
                make: make.to_string(),
                model: model.to_string(),
                variant: variant.to_string(),
                horsepower,
                offers: Some(offers),
                ..Default::default()
            }
        })
}

/// Denormalized view rows for the records, one per offer
fn to_rows(records: &[VehicleRecord]) -> Vec<InventoryRow> {
    let mut rows = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let base = InventoryRow {
            listing_id: Uuid::from_u128(i as u128 + 1),
            seller_id: Uuid::nil(),
            make: record.make.clone(),
            model: record.model.clone(),
            variant: record.variant.clone(),
            horsepower: record.horsepower,
            ..Default::default()
        };
        let offers = record.offers.clone().unwrap_or_default();
        if offers.is_empty() {
            rows.push(base);
        } else {
            for offer in offers {
                rows.push(InventoryRow {
                    offer: Some(offer),
                    ..base.clone()
                });
            }
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn offer_comparison_is_order_independent(
        (offers, shuffled) in prop::collection::vec(arb_offer(), 0..6)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
    ) {
        prop_assert!(offers_equal(Some(&offers), Some(&shuffled)));
    }

    #[test]
    fn horsepower_only_changes_composite_key(
        variant in "[A-Z][a-z]{2,7}",
        a in 50..400i64,
        b in 50..400i64,
    ) {
        // Figures in the same 5 hp bucket share a composite key
        prop_assume!(round_horsepower(a) != round_horsepower(b));
        let base = VehicleRecord {
            make: "Toyota".into(),
            model: "Aygo X".into(),
            variant,
            ..Default::default()
        };
        let left = VehicleRecord { horsepower: Some(a), ..base.clone() };
        let right = VehicleRecord { horsepower: Some(b), ..base };

        prop_assert_eq!(exact_key(&left), exact_key(&right));
        prop_assert_ne!(composite_key(&left), composite_key(&right));
    }

    #[test]
    fn matching_is_injective(
        inventory in prop::collection::vec(arb_record(), 0..8),
        extracted in prop::collection::vec(arb_record(), 0..8),
    ) {
        let result = reconcile(&extracted, &to_rows(&inventory), &ReconcileConfig::default());

        let mut seen = HashSet::new();
        for change in &result.changes {
            if let Some(id) = change.kind.existing_listing_id() {
                prop_assert!(seen.insert(id), "listing {} referenced twice", id);
            }
        }
        // Every listing is either matched or proposed for deletion
        prop_assert_eq!(seen.len(), inventory.len());
        prop_assert_eq!(result.changes.len() - result.counts().deletes as usize, extracted.len());
    }

    #[test]
    fn reconciliation_is_idempotent(
        inventory in prop::collection::vec(arb_record(), 0..8),
        extracted in prop::collection::vec(arb_record(), 0..8),
    ) {
        let rows = to_rows(&inventory);
        let config = ReconcileConfig::default();
        let first = reconcile(&extracted, &rows, &config);
        let second = reconcile(&extracted, &rows, &config);
        prop_assert_eq!(first.changes, second.changes);
    }

    #[test]
    fn reconciling_inventory_against_itself_is_unchanged(
        inventory in prop::collection::vec(arb_record(), 0..8),
    ) {
        // Distinct exact keys only; duplicates legitimately fall through to other tiers
        let mut keys = HashSet::new();
        let inventory: Vec<VehicleRecord> = inventory
            .into_iter()
            .filter(|r| keys.insert(exact_key(r)))
            .collect();

        let result = reconcile(&inventory, &to_rows(&inventory), &ReconcileConfig::default());
        let counts = result.counts();
        prop_assert_eq!(counts.unchanged as usize, inventory.len());
        prop_assert_eq!(counts.total() as usize, inventory.len());
    }
}
