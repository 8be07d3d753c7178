//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, config loading, notifier delivery and shared utilities (open_db)
//! - `ingest` - Transaction ingestion through the engine
//! - `goals` - Goal management commands (add, list, contribute)
//! - `alerts` - Alert listing and user feedback (ignore, resolve)
//! - `sweep` - One-shot and scheduled resolution sweeps
//! - `config` - Configuration inspection

pub mod alerts;
pub mod config;
pub mod core;
pub mod goals;
pub mod ingest;
pub mod sweep;

// Re-export command functions for main.rs
pub use alerts::*;
pub use config::*;
pub use core::*;
pub use goals::*;
pub use ingest::*;
pub use sweep::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
