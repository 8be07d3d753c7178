//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fincoach - Score transactions and coach on spending behavior
#[derive(Parser)]
#[command(name = "fincoach")]
#[command(about = "Transaction scoring and alert lifecycle engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "fincoach.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set FINCOACH_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Engine threshold config (TOML); defaults to the data-dir override or built-in values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Record a transaction and run it through the engine
    Ingest {
        /// User the transaction belongs to
        #[arg(short, long)]
        user: String,

        /// Transaction type: income, expense, saving, investment
        #[arg(short = 't', long = "type")]
        tx_type: String,

        /// Category (defaults to "general")
        #[arg(short, long, default_value = "")]
        category: String,

        /// Amount (positive)
        #[arg(short, long)]
        amount: f64,

        /// Transaction id (derived from the contents if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Free-form note; mention "goal" to tag a goal contribution
        #[arg(long)]
        note: Option<String>,

        /// When it happened (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Manage savings goals
    Goals {
        #[command(subcommand)]
        action: GoalsAction,
    },

    /// List alerts and give feedback on them
    Alerts {
        #[command(subcommand)]
        action: AlertsAction,
    },

    /// Run the auto-resolution sweep once
    Sweep {
        /// Only sweep this user (default: every user with active alerts)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Run the auto-resolution sweep on a schedule until interrupted
    ///
    /// The interval comes from --every-hours, or FINCOACH_SWEEP_HOURS.
    Watch {
        /// Hours between sweeps
        #[arg(long)]
        every_hours: Option<u64>,
    },

    /// Inspect the engine configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum GoalsAction {
    /// Add a goal
    Add {
        /// User the goal belongs to
        #[arg(short, long)]
        user: String,

        /// Goal name
        #[arg(short, long)]
        name: String,

        /// Target amount
        #[arg(short, long)]
        target: f64,

        /// Amount already saved
        #[arg(long, default_value = "0")]
        current: f64,

        /// Deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,

        /// Category savings must match to count toward this goal
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Priority label (e.g. high, medium, low)
        #[arg(long)]
        priority: Option<String>,

        /// Goal id (derived from the name if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List a user's goals
    List {
        #[arg(short, long)]
        user: String,
    },

    /// Add money to a goal
    Contribute {
        /// Goal id
        #[arg(long)]
        id: String,

        /// Amount to add
        #[arg(short, long)]
        amount: f64,
    },
}

#[derive(Subcommand)]
pub enum AlertsAction {
    /// List a user's alerts
    List {
        #[arg(short, long)]
        user: String,

        /// Include resolved alerts
        #[arg(long)]
        all: bool,

        /// Print alerts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark an alert as ignored (makes its identity less sensitive)
    Ignore {
        /// Alert ID
        id: i64,
    },

    /// Resolve an alert yourself
    Resolve {
        /// Alert ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Print where the config override file is read from
    Path,
}
