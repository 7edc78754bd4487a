//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod apply;
pub mod audit;
pub mod health;
pub mod inventory;
pub mod sessions;

// Re-export all handlers for use in router
pub use apply::*;
pub use audit::*;
pub use health::*;
pub use inventory::*;
pub use sessions::*;
