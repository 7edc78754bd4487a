//! Seller inventory: sellers, makes, models, listings and lease pricing

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_datetime, uuid_column, Database};
use crate::error::{Error, Result};
use crate::models::{Drivetrain, InventoryRow, Make, Offer, Seller, Transmission, VehicleRecord};
use crate::reconcile::InventoryIndex;

const VIEW_COLUMNS: &str = r#"
    listing_id, seller_id, make, model, variant, horsepower, transmission, drivetrain,
    fuel_type, body_type, year, co2_emission, wltp_range, consumption_l_100km,
    monthly_price, first_payment, period_months, mileage_per_year
"#;

fn row_to_inventory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InventoryRow> {
    let transmission: Option<String> = row.get(6)?;
    let drivetrain: Option<String> = row.get(7)?;
    let monthly_price: Option<i64> = row.get(14)?;

    let offer = match monthly_price {
        Some(monthly_price) => Some(Offer {
            monthly_price,
            first_payment: row.get(15)?,
            period_months: row.get(16)?,
            mileage_per_year: row.get(17)?,
        }),
        None => None,
    };

    Ok(InventoryRow {
        listing_id: uuid_column(row, 0)?,
        seller_id: uuid_column(row, 1)?,
        make: row.get(2)?,
        model: row.get(3)?,
        variant: row.get(4)?,
        horsepower: row.get(5)?,
        transmission: transmission.map(|s| Transmission::parse_lenient(&s)),
        drivetrain: drivetrain.map(|s| Drivetrain::parse_lenient(&s)),
        fuel_type: row.get(8)?,
        body_type: row.get(9)?,
        year: row.get(10)?,
        co2_emission: row.get(11)?,
        wltp_range: row.get(12)?,
        consumption_l_100km: row.get(13)?,
        offer,
    })
}

/// Resolve a make by name; it must already exist
pub(crate) fn resolve_make(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM makes WHERE name = ? COLLATE NOCASE",
        params![name.trim()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("make '{}'", name.trim())))
}

/// Resolve a model under a make, creating it when missing
pub(crate) fn ensure_model(conn: &Connection, make_id: i64, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidData("model name is empty".into()));
    }
    conn.execute(
        "INSERT OR IGNORE INTO models (make_id, name) VALUES (?, ?)",
        params![make_id, name],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM models WHERE make_id = ? AND name = ? COLLATE NOCASE",
        params![make_id, name],
        |row| row.get(0),
    )?)
}

/// Replace a listing's offers
pub(crate) fn replace_offers(conn: &Connection, listing_id: Uuid, offers: &[Offer]) -> Result<()> {
    conn.execute(
        "DELETE FROM lease_pricing WHERE listing_id = ?",
        params![listing_id.to_string()],
    )?;
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO lease_pricing (listing_id, monthly_price, first_payment, period_months, mileage_per_year)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )?;
    for offer in offers {
        stmt.execute(params![
            listing_id.to_string(),
            offer.monthly_price,
            offer.first_payment,
            offer.period_months,
            offer.mileage_per_year
        ])?;
    }
    Ok(())
}

/// Insert a listing with its offers; returns the new listing id
pub(crate) fn insert_listing(
    conn: &Connection,
    seller_id: Uuid,
    record: &VehicleRecord,
) -> Result<Uuid> {
    let make_id = resolve_make(conn, &record.make)?;
    let model_id = ensure_model(conn, make_id, &record.model)?;
    let id = Uuid::new_v4();

    conn.execute(
        r#"
        INSERT INTO listings (
            id, seller_id, make_id, model_id, variant, horsepower, transmission, drivetrain,
            fuel_type, body_type, year, co2_emission, wltp_range, consumption_l_100km
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id.to_string(),
            seller_id.to_string(),
            make_id,
            model_id,
            record.variant.trim(),
            record.horsepower,
            record.transmission.map(|t| t.as_str()),
            record.drivetrain.map(|d| d.as_str()),
            record.fuel_type,
            record.body_type,
            record.year,
            record.co2_emission,
            record.wltp_range,
            record.consumption_l_100km,
        ],
    )?;

    if let Some(offers) = &record.offers {
        replace_offers(conn, id, offers)?;
    }

    Ok(id)
}

pub(crate) fn listing_exists(conn: &Connection, listing_id: Uuid) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM listings WHERE id = ?",
        params![listing_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl Database {
    // ========== Sellers ==========

    pub fn create_seller(&self, name: &str) -> Result<Seller> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("seller name is empty".into()));
        }
        let conn = self.conn()?;
        let seller = Seller {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO sellers (id, name, created_at) VALUES (?, ?, ?)",
            params![
                seller.id.to_string(),
                seller.name,
                seller.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
            ],
        )?;
        Ok(seller)
    }

    pub fn get_seller(&self, id: Uuid) -> Result<Option<Seller>> {
        let conn = self.conn()?;
        let seller = conn
            .query_row(
                "SELECT id, name, created_at FROM sellers WHERE id = ?",
                params![id.to_string()],
                |row| {
                    let created_at: String = row.get(2)?;
                    Ok(Seller {
                        id: uuid_column(row, 0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .optional()?;
        Ok(seller)
    }

    pub fn list_sellers(&self) -> Result<Vec<Seller>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM sellers ORDER BY name")?;
        let sellers = stmt
            .query_map([], |row| {
                let created_at: String = row.get(2)?;
                Ok(Seller {
                    id: uuid_column(row, 0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sellers)
    }

    // ========== Makes ==========

    /// Create a make, or return the existing one with the same name
    pub fn create_make(&self, name: &str) -> Result<Make> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("make name is empty".into()));
        }
        let conn = self.conn()?;
        conn.execute("INSERT OR IGNORE INTO makes (name) VALUES (?)", params![name])?;
        let make = conn.query_row(
            "SELECT id, name FROM makes WHERE name = ? COLLATE NOCASE",
            params![name],
            |row| {
                Ok(Make {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(make)
    }

    pub fn list_makes(&self) -> Result<Vec<Make>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM makes ORDER BY name")?;
        let makes = stmt
            .query_map([], |row| {
                Ok(Make {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(makes)
    }

    // ========== Listings ==========

    /// Insert listings directly, bypassing reconciliation (initial load)
    pub fn import_listings(&self, seller_id: Uuid, records: &[VehicleRecord]) -> Result<Vec<Uuid>> {
        if self.get_seller(seller_id)?.is_none() {
            return Err(Error::NotFound(format!("seller {}", seller_id)));
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ids = records
            .iter()
            .map(|record| insert_listing(&tx, seller_id, record))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    /// Denormalized inventory rows for a seller, in listing insertion order
    pub fn inventory_rows(&self, seller_id: Uuid) -> Result<Vec<InventoryRow>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM full_listing_view WHERE seller_id = ? ORDER BY listing_seq, pricing_id",
            VIEW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![seller_id.to_string()], row_to_inventory_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A seller's listings as vehicle records
    pub fn list_listings(&self, seller_id: Uuid) -> Result<Vec<VehicleRecord>> {
        let rows = self.inventory_rows(seller_id)?;
        Ok(InventoryIndex::build(&rows).records().to_vec())
    }

    pub fn get_listing(&self, listing_id: Uuid) -> Result<Option<VehicleRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM full_listing_view WHERE listing_id = ? ORDER BY pricing_id",
            VIEW_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![listing_id.to_string()], row_to_inventory_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(InventoryIndex::build(&rows).get(listing_id).cloned())
    }

    pub fn count_listings(&self, seller_id: Uuid) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM listings WHERE seller_id = ?",
            params![seller_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
