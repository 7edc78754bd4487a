//! Test utilities for leasesync-core
//!
//! Builders for vehicle records and a helper that seeds a seller with
//! inventory in a throwaway database.

use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Drivetrain, Offer, Transmission, VehicleRecord};

/// Offer with no upfront payment
pub fn offer(monthly_price: i64, period_months: i64, mileage_per_year: i64) -> Offer {
    Offer {
        monthly_price,
        first_payment: 0,
        period_months,
        mileage_per_year,
    }
}

/// Fluent builder for [`VehicleRecord`]
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: VehicleRecord,
}

impl RecordBuilder {
    pub fn new(make: &str, model: &str, variant: &str) -> Self {
        Self {
            record: VehicleRecord {
                make: make.to_string(),
                model: model.to_string(),
                variant: variant.to_string(),
                offers: Some(Vec::new()),
                ..Default::default()
            },
        }
    }

    pub fn horsepower(mut self, hp: i64) -> Self {
        self.record.horsepower = Some(hp);
        self
    }

    pub fn transmission(mut self, transmission: Transmission) -> Self {
        self.record.transmission = Some(transmission);
        self
    }

    pub fn drivetrain(mut self, drivetrain: Drivetrain) -> Self {
        self.record.drivetrain = Some(drivetrain);
        self
    }

    pub fn fuel_type(mut self, fuel_type: &str) -> Self {
        self.record.fuel_type = Some(fuel_type.to_string());
        self
    }

    pub fn body_type(mut self, body_type: &str) -> Self {
        self.record.body_type = Some(body_type.to_string());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.record.year = Some(year);
        self
    }

    /// Append an offer
    pub fn offer(mut self, monthly_price: i64, period_months: i64, mileage_per_year: i64) -> Self {
        self.record
            .offers
            .get_or_insert_with(Vec::new)
            .push(offer(monthly_price, period_months, mileage_per_year));
        self
    }

    /// Drop the offer collection entirely (extraction produced none)
    pub fn without_offers(mut self) -> Self {
        self.record.offers = None;
        self
    }

    pub fn listing_id(mut self, id: Uuid) -> Self {
        self.record.listing_id = Some(id);
        self
    }

    pub fn build(self) -> VehicleRecord {
        self.record
    }
}

/// Create a seller, register every make used and import the records as listings
pub fn seed_inventory(
    db: &Database,
    seller_name: &str,
    records: &[VehicleRecord],
) -> Result<(Uuid, Vec<Uuid>)> {
    let seller = db.create_seller(seller_name)?;
    for record in records {
        db.create_make(&record.make)?;
    }
    let ids = db.import_listings(seller.id, records)?;
    Ok((seller.id, ids))
}
