//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Resolve the engine configuration
//! - `deliver` - Drain the outbox into the configured notifiers
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use fincoach_core::notify::{notifiers_from_env, DeliveryReport, OutboxWorker};
use fincoach_core::{db::Database, EngineConfig};

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

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    EngineConfig::load(path).context("Failed to load engine config")
}

/// Deliver every queued event once all outbox handles are dropped
pub async fn deliver(worker: OutboxWorker, config: &EngineConfig) -> DeliveryReport {
    let report = worker
        .run(notifiers_from_env(), config.notify.timeout())
        .await;
    if report.failed > 0 || report.timed_out > 0 {
        println!(
            "   ⚠️  Notifications: {} failed, {} timed out (alert state is unaffected)",
            report.failed, report.timed_out
        );
    }
    report
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a goal: fincoach goals add --user me --name Laptop --target 1000");
    println!("  2. Record spending: fincoach ingest --user me --type expense --category food --amount 42");

    Ok(())
}
