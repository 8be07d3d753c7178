//! Fincoach CLI - Transaction scoring and alert lifecycle
//!
//! Usage:
//!   fincoach init                                   Initialize database
//!   fincoach ingest --user U --type expense ...     Score a transaction
//!   fincoach alerts list --user U                   Show alerts
//!   fincoach sweep                                  Auto-resolve improved alerts
//!   fincoach watch --every-hours 6                  Sweep on a schedule

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

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Ingest {
            user,
            tx_type,
            category,
            amount,
            id,
            note,
            at,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_ingest(
                &db,
                &config,
                &user,
                &tx_type,
                &category,
                amount,
                id.as_deref(),
                note.as_deref(),
                at.as_deref(),
            )
            .await
            .map(|_| ())
        }
        Commands::Goals { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                GoalsAction::Add {
                    user,
                    name,
                    target,
                    current,
                    deadline,
                    category,
                    priority,
                    id,
                } => commands::cmd_goals_add(
                    &db,
                    commands::GoalSpec {
                        user: &user,
                        name: &name,
                        target,
                        current,
                        deadline: deadline.as_deref(),
                        category: &category,
                        priority: priority.as_deref(),
                        id: id.as_deref(),
                    },
                )
                .map(|_| ()),
                GoalsAction::List { user } => commands::cmd_goals_list(&db, &user),
                GoalsAction::Contribute { id, amount } => {
                    commands::cmd_goals_contribute(&db, &id, amount).map(|_| ())
                }
            }
        }
        Commands::Alerts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                AlertsAction::List { user, all, json } => {
                    commands::cmd_alerts_list(&db, &user, all, json)
                }
                AlertsAction::Ignore { id } => {
                    commands::cmd_alerts_ignore(&db, &config, id).map(|_| ())
                }
                AlertsAction::Resolve { id } => {
                    commands::cmd_alerts_resolve(&db, &config, id).map(|_| ())
                }
            }
        }
        Commands::Sweep { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_sweep(&db, &config, user.as_deref())
                .await
                .map(|_| ())
        }
        Commands::Watch { every_hours } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_watch(&db, &config, every_hours).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::cmd_config_show(&config).map(|_| ()),
            ConfigAction::Path => commands::cmd_config_path(),
        },
    }
}
