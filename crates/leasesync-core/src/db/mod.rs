//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `inventory` - Sellers, makes, models, listings and lease pricing
//! - `sessions` - Extraction sessions and their change rows
//! - `apply` - Applying selected changes to inventory
//! - `audit` - Audit log

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

mod apply;
mod audit;
mod inventory;
mod sessions;

pub use audit::AuditEntry;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "LEASESYNC_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"leasesync-salt-1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a stored timestamp (RFC 3339 or SQLite's "YYYY-MM-DD HH:MM:SS")
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

/// Read a TEXT column holding a UUID
pub(crate) fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_uuid_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Sessions with an apply currently running in this process
    applying: Arc<Mutex<HashSet<Uuid>>>,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `LEASESYNC_DB_KEY` to be set. Use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = passphrase
            .map(derive_key)
            .transpose()?
            .map(|key| format!("PRAGMA key = 'x\"{}\"';", key));

        // Key and foreign keys are per-connection settings
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            applying: Arc::new(Mutex::new(HashSet::new())),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "leasesync_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the applier
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Dealers
            CREATE TABLE IF NOT EXISTS sellers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Reference data
            CREATE TABLE IF NOT EXISTS makes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE
            );

            CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY,
                make_id INTEGER NOT NULL REFERENCES makes(id),
                name TEXT NOT NULL COLLATE NOCASE,
                UNIQUE(make_id, name)
            );

            -- One row per vehicle
            CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL REFERENCES sellers(id),
                make_id INTEGER NOT NULL REFERENCES makes(id),
                model_id INTEGER NOT NULL REFERENCES models(id),
                variant TEXT NOT NULL DEFAULT '',
                horsepower INTEGER,
                transmission TEXT,
                drivetrain TEXT,
                fuel_type TEXT,
                body_type TEXT,
                year INTEGER,
                co2_emission INTEGER,
                wltp_range INTEGER,
                consumption_l_100km REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_listings_seller ON listings(seller_id);

            -- One row per lease offer
            CREATE TABLE IF NOT EXISTS lease_pricing (
                id INTEGER PRIMARY KEY,
                listing_id TEXT NOT NULL REFERENCES listings(id),
                monthly_price INTEGER NOT NULL,
                first_payment INTEGER NOT NULL DEFAULT 0,
                period_months INTEGER NOT NULL DEFAULT 0,
                mileage_per_year INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_lease_pricing_listing ON lease_pricing(listing_id);

            -- Denormalized inventory: one row per price row, listings without pricing included
            CREATE VIEW IF NOT EXISTS full_listing_view AS
            SELECT
                l.id AS listing_id,
                l.seller_id,
                mk.name AS make,
                md.name AS model,
                l.variant,
                l.horsepower,
                l.transmission,
                l.drivetrain,
                l.fuel_type,
                l.body_type,
                l.year,
                l.co2_emission,
                l.wltp_range,
                l.consumption_l_100km,
                p.monthly_price,
                p.first_payment,
                p.period_months,
                p.mileage_per_year,
                l.rowid AS listing_seq,
                p.id AS pricing_id
            FROM listings l
            JOIN makes mk ON mk.id = l.make_id
            JOIN models md ON md.id = l.model_id
            LEFT JOIN lease_pricing p ON p.listing_id = l.id;

            -- One reconciliation run per uploaded batch
            CREATE TABLE IF NOT EXISTS extraction_sessions (
                id TEXT PRIMARY KEY,
                seller_id TEXT NOT NULL REFERENCES sellers(id),
                status TEXT NOT NULL DEFAULT 'created'
                    CHECK (status IN ('created', 'changes_computed')),
                batch_hash TEXT NOT NULL,
                total_extracted INTEGER NOT NULL DEFAULT 0,
                total_creates INTEGER NOT NULL DEFAULT 0,
                total_updates INTEGER NOT NULL DEFAULT 0,
                total_deletes INTEGER NOT NULL DEFAULT 0,
                total_unchanged INTEGER NOT NULL DEFAULT 0,
                applied_creates INTEGER NOT NULL DEFAULT 0,
                applied_updates INTEGER NOT NULL DEFAULT 0,
                applied_deletes INTEGER NOT NULL DEFAULT 0,
                discarded_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                applied_at TEXT,
                applied_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_seller ON extraction_sessions(seller_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_hash ON extraction_sessions(batch_hash);

            -- Proposed changes. A deleted listing's references move to detached_listing_id.
            CREATE TABLE IF NOT EXISTS extraction_changes (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES extraction_sessions(id),
                position INTEGER NOT NULL,
                change_type TEXT NOT NULL
                    CHECK (change_type IN ('create', 'update', 'delete', 'unchanged')),
                change_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (change_status IN ('pending', 'selected', 'applied', 'discarded', 'failed')),
                existing_listing_id TEXT REFERENCES listings(id),
                detached_listing_id TEXT,
                extracted_payload TEXT,
                field_changes TEXT,
                match_method TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                match_factors TEXT,
                applied_listing_id TEXT,
                error_message TEXT,
                applied_at TEXT,
                applied_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK (change_type != 'delete' OR extracted_payload IS NULL),
                CHECK (change_type != 'create'
                    OR (existing_listing_id IS NULL AND detached_listing_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_changes_session ON extraction_changes(session_id, position);
            CREATE INDEX IF NOT EXISTS idx_changes_listing ON extraction_changes(existing_listing_id);
            CREATE INDEX IF NOT EXISTS idx_changes_status ON extraction_changes(session_id, change_status);

            -- Audit log (mutating API and CLI calls)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id TEXT,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
