//! Seller, make and inventory commands

use std::path::Path;

use anyhow::{Context, Result};

use leasesync_core::db::Database;

use super::{read_records, resolve_seller, truncate};

pub fn cmd_sellers_list(db: &Database) -> Result<()> {
    let sellers = db.list_sellers()?;

    if sellers.is_empty() {
        println!("No sellers found. Add one with:");
        println!("  leasesync sellers add \"Toyota Roskilde\"");
        return Ok(());
    }

    println!();
    println!("🏢 Sellers");
    println!("   ─────────────────────────────────────────────────────────────");

    for seller in sellers {
        let listings = db.count_listings(seller.id)?;
        println!("   {}  {} ({} listings)", seller.id, seller.name, listings);
    }

    Ok(())
}

pub fn cmd_sellers_add(db: &Database, name: &str) -> Result<()> {
    let seller = db.create_seller(name).context("Failed to create seller")?;
    db.log_audit(
        "cli",
        "create",
        Some("seller"),
        Some(seller.id.to_string().as_str()),
        Some(&format!("name={}", seller.name)),
    )?;

    println!("✅ Created seller '{}' ({})", seller.name, seller.id);
    Ok(())
}

pub fn cmd_makes_list(db: &Database) -> Result<()> {
    let makes = db.list_makes()?;

    if makes.is_empty() {
        println!("No makes registered. Add one with:");
        println!("  leasesync makes add Toyota");
        return Ok(());
    }

    println!();
    println!("🚗 Makes");
    println!("   ─────────────────────────────");
    for make in makes {
        println!("   {}", make.name);
    }

    Ok(())
}

pub fn cmd_makes_add(db: &Database, name: &str) -> Result<()> {
    let make = db.create_make(name).context("Failed to create make")?;
    db.log_audit(
        "cli",
        "create",
        Some("make"),
        Some(make.id.to_string().as_str()),
        Some(&format!("name={}", make.name)),
    )?;

    println!("✅ Make '{}' is registered", make.name);
    Ok(())
}

/// Create listings straight from a record file, bypassing reconciliation
pub fn cmd_inventory_import(db: &Database, seller: &str, file: &Path) -> Result<()> {
    let seller = resolve_seller(db, seller)?;
    let records = read_records(file)?;

    println!(
        "📥 Importing {} listings for {}...",
        records.len(),
        seller.name
    );

    let ids = db
        .import_listings(seller.id, &records)
        .context("Import failed (is every make registered? see `leasesync makes add`)")?;

    db.log_audit(
        "cli",
        "import",
        Some("seller"),
        Some(seller.id.to_string().as_str()),
        Some(&format!("listings={}, file={}", ids.len(), file.display())),
    )?;

    println!("✅ Imported {} listings", ids.len());
    Ok(())
}

pub fn cmd_inventory_list(db: &Database, seller: &str) -> Result<()> {
    let seller = resolve_seller(db, seller)?;
    let listings = db.list_listings(seller.id)?;

    if listings.is_empty() {
        println!("{} has no listings.", seller.name);
        return Ok(());
    }

    println!();
    println!("📋 Inventory for {} ({} listings)", seller.name, listings.len());
    println!("   ─────────────────────────────────────────────────────────────────────────");
    println!(
        "   {:<36}  {:<40}  {:>6}  {:>10}",
        "ID", "Vehicle", "Offers", "From/mo"
    );

    for listing in &listings {
        let id = listing
            .listing_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let offers = listing.offers.as_ref().map(|o| o.len()).unwrap_or(0);
        let price = listing
            .lowest_monthly_price()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:<36}  {:<40}  {:>6}  {:>10}",
            id,
            truncate(&listing.label(), 40),
            offers,
            price
        );
    }

    Ok(())
}
