//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

/// leasesync - Reconcile dealer lease price lists against inventory
#[derive(Parser)]
#[command(name = "leasesync")]
#[command(about = "Review and apply extracted lease price-list changes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "leasesync.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set LEASESYNC_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Reconciliation tuning file (defaults to the user config, then built-in values)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage sellers (dealers)
    Sellers {
        #[command(subcommand)]
        action: Option<SellersAction>,
    },

    /// Manage reference makes
    Makes {
        #[command(subcommand)]
        action: Option<MakesAction>,
    },

    /// Load or inspect a seller's current inventory
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },

    /// Reconcile an extracted batch against a seller's inventory
    Reconcile {
        /// Seller id or name
        #[arg(short, long)]
        seller: String,

        /// JSON file with the extracted records
        #[arg(short, long)]
        file: PathBuf,

        /// Name recorded in the audit log
        #[arg(long, default_value = "cli")]
        by: String,
    },

    /// List or inspect extraction sessions
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsAction>,
    },

    /// List the changes of a session
    Changes {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Only show one change type: create, update, delete, unchanged
        #[arg(short = 't', long = "type")]
        change_type: Option<String>,

        /// Only show one status: pending, selected, applied, discarded, failed
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of changes to show
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },

    /// Apply selected changes of a session; unselected pending changes are discarded
    #[command(group(ArgGroup::new("selection").required(true).args(["all", "ids"])))]
    Apply {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Select every pending change
        #[arg(long)]
        all: bool,

        /// Comma-separated change ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,

        /// Operator name recorded on applied changes
        #[arg(long)]
        by: String,
    },

    /// Show the audit log
    Audit {
        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Allowed CORS origins (comma-separated)
        #[arg(long, value_delimiter = ',')]
        allowed_origins: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SellersAction {
    /// List sellers
    List,
    /// Add a seller
    Add {
        /// Seller name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum MakesAction {
    /// List makes
    List,
    /// Add a make (no-op if it already exists)
    Add {
        /// Make name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum InventoryAction {
    /// Create listings directly from a JSON array of records
    Import {
        /// Seller id or name
        #[arg(short, long)]
        seller: String,

        /// JSON file with the records
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List a seller's listings
    List {
        /// Seller id or name
        #[arg(short, long)]
        seller: String,
    },
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List sessions, newest first
    List {
        /// Seller id or name
        #[arg(short, long)]
        seller: Option<String>,

        /// Maximum number of sessions
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show one session with its counters
    Show {
        /// Session id
        id: String,
    },
}
