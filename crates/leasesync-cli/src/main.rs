//! leasesync CLI - Dealer lease price-list reconciliation
//!
//! Usage:
//!   leasesync init                                  Initialize database
//!   leasesync reconcile --seller S --file batch.json Compute a session
//!   leasesync changes --session ID                  Review proposed changes
//!   leasesync apply --session ID --all --by NAME    Apply the selection
//!   leasesync serve --port 3000                     Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Sellers { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(SellersAction::List) => commands::cmd_sellers_list(&db),
                Some(SellersAction::Add { name }) => commands::cmd_sellers_add(&db, &name),
            }
        }
        Commands::Makes { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(MakesAction::List) => commands::cmd_makes_list(&db),
                Some(MakesAction::Add { name }) => commands::cmd_makes_add(&db, &name),
            }
        }
        Commands::Inventory { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                InventoryAction::Import { seller, file } => {
                    commands::cmd_inventory_import(&db, &seller, &file)
                }
                InventoryAction::List { seller } => commands::cmd_inventory_list(&db, &seller),
            }
        }
        Commands::Reconcile { seller, file, by } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_reconcile(&db, &config, &seller, &file, &by)
        }
        Commands::Sessions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_sessions_list(&db, None, 20),
                Some(SessionsAction::List { seller, limit }) => {
                    commands::cmd_sessions_list(&db, seller.as_deref(), limit)
                }
                Some(SessionsAction::Show { id }) => commands::cmd_sessions_show(&db, &id),
            }
        }
        Commands::Changes {
            session,
            change_type,
            status,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_changes(
                &db,
                &session,
                change_type.as_deref(),
                status.as_deref(),
                limit,
            )
        }
        Commands::Apply {
            session,
            all,
            ids,
            by,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_apply(&db, &session, all, &ids, &by)
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
        Commands::Serve {
            port,
            host,
            static_dir,
            allowed_origins,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                cli.no_encrypt,
                static_dir.as_deref(),
                allowed_origins,
                config,
            )
            .await
        }
    }
}
