//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Reconciliation tuning with `--config` override
//! - `resolve_seller` / `read_records` - Argument helpers
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use leasesync_core::models::{Seller, VehicleRecord};
use leasesync_core::{Database, ReconcileConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Explicit file wins, then the user override, then built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    match path {
        Some(path) => ReconcileConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ReconcileConfig::load().context("Failed to load reconciliation config"),
    }
}

/// Look a seller up by id, falling back to a case-insensitive name match
pub fn resolve_seller(db: &Database, seller: &str) -> Result<Seller> {
    if let Ok(id) = Uuid::parse_str(seller.trim()) {
        return db
            .get_seller(id)?
            .with_context(|| format!("Seller {} not found", id));
    }

    let mut matches: Vec<Seller> = db
        .list_sellers()?
        .into_iter()
        .filter(|s| s.name.eq_ignore_ascii_case(seller.trim()))
        .collect();
    match matches.len() {
        0 => bail!("Seller '{}' not found", seller),
        1 => Ok(matches.remove(0)),
        n => bail!("{} sellers are named '{}'; use the seller id", n, seller),
    }
}

pub fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid {} id: {}", what, value))
}

/// A bare array of records or an object wrapping one
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<VehicleRecord>),
    Wrapped { records: Vec<VehicleRecord> },
}

/// Read extracted or inventory records from a JSON file
pub fn read_records(file: &Path) -> Result<Vec<VehicleRecord>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: RecordFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records in {}", file.display()))?;
    Ok(match parsed {
        RecordFile::List(records) | RecordFile::Wrapped { records } => records,
    })
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }
    println!("   Sellers: {}", db.list_sellers()?.len());

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register a dealer: leasesync sellers add \"Toyota Roskilde\"");
    println!("  2. Load its inventory: leasesync inventory import --seller \"Toyota Roskilde\" --file listings.json");
    println!("  3. Reconcile a new price list: leasesync reconcile --seller \"Toyota Roskilde\" --file extracted.json");

    Ok(())
}
