//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, seller lookup)
//! - `inventory` - Sellers, makes and listing import
//! - `sessions` - Reconcile, review and apply
//! - `serve` - Web server command

pub mod core;
pub mod inventory;
pub mod serve;
pub mod sessions;

// Re-export command functions for main.rs
pub use core::*;
pub use inventory::*;
pub use serve::*;
pub use sessions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
