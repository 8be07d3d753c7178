//! Resolution sweep commands
//!
//! `sweep` runs once. `watch` runs on an interval configured by
//! `--every-hours` or the `FINCOACH_SWEEP_HOURS` environment variable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fincoach_core::notify::notifiers_from_env;
use fincoach_core::{db::Database, CoachService, EngineConfig, Outbox, SweepReport};
use tokio::time::interval;
use tracing::{error, info, warn};

use super::deliver;

/// Environment variable holding the sweep interval in hours
pub const SWEEP_HOURS_ENV: &str = "FINCOACH_SWEEP_HOURS";

/// Interval for scheduled sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSchedule {
    pub interval_hours: u64,
}

impl SweepSchedule {
    /// Parse from `FINCOACH_SWEEP_HOURS`; `None` if unset, invalid, or 0
    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var(SWEEP_HOURS_ENV).ok().as_deref())
    }

    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let interval_hours: u64 = raw?.trim().parse().ok()?;
        if interval_hours == 0 {
            warn!("{} is 0, scheduled sweeps disabled", SWEEP_HOURS_ENV);
            return None;
        }
        Some(Self { interval_hours })
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }
}

fn print_report(report: &SweepReport) {
    println!("🧹 Sweep complete");
    println!("   Alerts checked:  {}", report.checked);
    println!("   Auto-resolved:   {}", report.resolved);
    if report.failed > 0 {
        println!("   ⚠️  Failed:       {}", report.failed);
    }
}

/// One sweep for a user, or for every user with active alerts
pub async fn cmd_sweep(
    db: &Database,
    config: &EngineConfig,
    user: Option<&str>,
) -> Result<SweepReport> {
    let (outbox, worker) = Outbox::channel();
    let service = CoachService::new(Arc::new(db.clone()), config.clone(), outbox);
    let now = Utc::now();

    let report = match user {
        Some(user) => service
            .sweep(user, now)
            .with_context(|| format!("Sweep failed for {}", user))?,
        None => service.sweep_all(now).context("Sweep failed")?,
    };
    print_report(&report);

    drop(service);
    deliver(worker, config).await;
    Ok(report)
}

/// Sweep on a schedule until Ctrl-C
pub async fn cmd_watch(db: &Database, config: &EngineConfig, every_hours: Option<u64>) -> Result<()> {
    let schedule = match every_hours {
        Some(hours) => SweepSchedule::parse(Some(&hours.to_string())),
        None => SweepSchedule::from_env(),
    };
    let Some(schedule) = schedule else {
        bail!(
            "No sweep interval: pass --every-hours or set {} to a positive number of hours",
            SWEEP_HOURS_ENV
        );
    };

    info!("Starting sweep scheduler: every {} hours", schedule.interval_hours);
    println!(
        "👀 Sweeping every {} hour(s). Press Ctrl-C to stop.",
        schedule.interval_hours
    );

    let (outbox, worker) = Outbox::channel();
    let service = CoachService::new(Arc::new(db.clone()), config.clone(), outbox);
    let delivery = tokio::spawn(worker.run(notifiers_from_env(), config.notify.timeout()));

    let mut ticker = interval(schedule.period());
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("Running scheduled sweep...");
                match service.sweep_all(Utc::now()) {
                    Ok(report) => info!(
                        "Scheduled sweep: checked={} resolved={} failed={}",
                        report.checked, report.resolved, report.failed
                    ),
                    Err(e) => error!("Scheduled sweep failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping scheduler...");
                break;
            }
        }
    }

    drop(service);
    match delivery.await {
        Ok(report) => info!(
            "Delivered {} of {} notifications",
            report.delivered, report.events
        ),
        Err(e) => warn!("Notification worker ended abnormally: {}", e),
    }
    Ok(())
}
