//! Existing-inventory index
//!
//! Folds the denormalized inventory view (one row per price row) into unique
//! vehicle records and builds the key lookups the matcher uses.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{InventoryRow, VehicleRecord};
use crate::reconcile::keys::{composite_key, exact_key};

/// Read-only snapshot of a seller's inventory
#[derive(Debug, Clone, Default)]
pub struct InventoryIndex {
    /// Unique records in first-seen order
    records: Vec<VehicleRecord>,
    positions: HashMap<Uuid, usize>,
    exact: HashMap<String, usize>,
    composite: HashMap<String, usize>,
}

impl InventoryIndex {
    /// Fold view rows into records, one per listing id
    pub fn build(rows: &[InventoryRow]) -> Self {
        let mut records: Vec<VehicleRecord> = Vec::new();
        let mut positions: HashMap<Uuid, usize> = HashMap::new();

        for row in rows {
            let pos = *positions.entry(row.listing_id).or_insert_with(|| {
                records.push(record_from_row(row));
                records.len() - 1
            });
            if let (Some(offer), Some(offers)) = (row.offer, records[pos].offers.as_mut()) {
                if !offers.contains(&offer) {
                    offers.push(offer);
                }
            }
        }

        Self::with_records(records, positions)
    }

    /// Index records that already carry listing ids; records without one are skipped
    pub fn from_records(records: impl IntoIterator<Item = VehicleRecord>) -> Self {
        let mut unique = Vec::new();
        let mut positions = HashMap::new();
        for record in records {
            let Some(id) = record.listing_id else {
                tracing::warn!("Skipping inventory record without listing id: {}", record.label());
                continue;
            };
            if positions.contains_key(&id) {
                continue;
            }
            positions.insert(id, unique.len());
            unique.push(record);
        }
        Self::with_records(unique, positions)
    }

    fn with_records(records: Vec<VehicleRecord>, positions: HashMap<Uuid, usize>) -> Self {
        let mut exact = HashMap::new();
        let mut composite = HashMap::new();
        for (pos, record) in records.iter().enumerate() {
            // First listing wins a colliding key
            exact.entry(exact_key(record)).or_insert(pos);
            composite.entry(composite_key(record)).or_insert(pos);
        }
        Self {
            records,
            positions,
            exact,
            composite,
        }
    }

    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, pos: usize) -> Option<&VehicleRecord> {
        self.records.get(pos)
    }

    pub fn get(&self, listing_id: Uuid) -> Option<&VehicleRecord> {
        self.positions.get(&listing_id).map(|&pos| &self.records[pos])
    }

    pub fn position_of(&self, listing_id: Uuid) -> Option<usize> {
        self.positions.get(&listing_id).copied()
    }

    pub fn lookup_exact(&self, key: &str) -> Option<usize> {
        self.exact.get(key).copied()
    }

    pub fn lookup_composite(&self, key: &str) -> Option<usize> {
        self.composite.get(key).copied()
    }
}

fn record_from_row(row: &InventoryRow) -> VehicleRecord {
    VehicleRecord {
        listing_id: Some(row.listing_id),
        make: row.make.clone(),
        model: row.model.clone(),
        variant: row.variant.clone(),
        horsepower: row.horsepower,
        transmission: row.transmission,
        drivetrain: row.drivetrain,
        fuel_type: row.fuel_type.clone(),
        body_type: row.body_type.clone(),
        year: row.year,
        co2_emission: row.co2_emission,
        wltp_range: row.wltp_range,
        consumption_l_100km: row.consumption_l_100km,
        offers: Some(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Offer;

    fn row(listing_id: Uuid, variant: &str, price: Option<i64>) -> InventoryRow {
        InventoryRow {
            listing_id,
            seller_id: Uuid::nil(),
            make: "Toyota".into(),
            model: "Aygo X".into(),
            variant: variant.into(),
            offer: price.map(|p| Offer {
                monthly_price: p,
                period_months: 36,
                mileage_per_year: 15000,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_folds_price_rows_into_one_record() {
        let id = Uuid::new_v4();
        let index = InventoryIndex::build(&[
            row(id, "Active", Some(2899)),
            row(id, "Active", Some(3199)),
            row(id, "Active", Some(2899)),
        ]);
        assert_eq!(index.len(), 1);
        let record = index.get(id).unwrap();
        let prices: Vec<i64> = record
            .offers
            .as_ref()
            .unwrap()
            .iter()
            .map(|o| o.monthly_price)
            .collect();
        assert_eq!(prices, vec![2899, 3199]);
    }

    #[test]
    fn test_listing_without_pricing_has_empty_offers() {
        let id = Uuid::new_v4();
        let index = InventoryIndex::build(&[row(id, "Active", None)]);
        assert_eq!(index.get(id).unwrap().offers, Some(vec![]));
    }

    #[test]
    fn test_first_seen_order_is_stable() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let index = InventoryIndex::build(&[
            row(b, "Pulse", Some(1)),
            row(a, "Active", Some(1)),
            row(b, "Pulse", Some(2)),
            row(c, "Style", Some(1)),
        ]);
        let ids: Vec<Uuid> = index.records().iter().filter_map(|r| r.listing_id).collect();
        assert_eq!(ids, vec![b, a, c]);
        assert_eq!(index.position_of(c), Some(2));
    }

    #[test]
    fn test_key_collision_keeps_first_listing() {
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let index = InventoryIndex::build(&[
            row(first, "Active", Some(2899)),
            row(second, "active", Some(2999)),
        ]);
        assert_eq!(index.len(), 2);
        let pos = index.lookup_exact("toyota|aygo x|active").unwrap();
        assert_eq!(index.record(pos).unwrap().listing_id, Some(first));
        assert!(index.get(second).is_some());
    }
}
