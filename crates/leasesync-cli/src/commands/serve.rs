//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};

use leasesync_core::ReconcileConfig;
use leasesync_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    static_dir: Option<&Path>,
    allowed_origins: Vec<String>,
    reconcile: ReconcileConfig,
) -> Result<()> {
    println!("🚀 Starting leasesync web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }
    if !allowed_origins.is_empty() {
        println!("   CORS origins: {}", allowed_origins.join(", "));
    }
    println!(
        "   Matching: min confidence {:.2}, powertrain policy {}",
        reconcile.min_confidence,
        reconcile.powertrain_policy.as_str()
    );
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }
    println!();

    let db = open_db(db_path, no_encrypt)?;

    let config = ServerConfig {
        allowed_origins,
        reconcile,
        ..Default::default()
    };

    let static_dir = match static_dir {
        Some(dir) => Some(
            dir.to_str()
                .context("Static directory path is not valid UTF-8")?,
        ),
        None => None,
    };

    leasesync_server::serve(db, host, port, static_dir, config).await
}
