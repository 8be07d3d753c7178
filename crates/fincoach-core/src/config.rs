//! Engine configuration
//!
//! Every numeric threshold used by signal extraction, scoring, the income
//! analyzer, the alert lifecycle and the resolution sweep lives here.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/fincoach/config/coach.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Each section is optional in the file; missing keys keep their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::Level;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/coach.toml");

/// Environment variable overriding the notifier timeout
pub const NOTIFY_TIMEOUT_ENV: &str = "FINCOACH_NOTIFY_TIMEOUT_SECS";

/// Thresholds for signal extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Trailing window for the short expense average (days)
    pub week_days: i64,
    /// Trailing window for the long expense average (days)
    pub month_days: i64,
    /// A category above this share of monthly expense dominates (percent)
    pub category_dominance_percent: f64,
    /// Expense above this fraction of the monthly goal requirement endangers it
    pub goal_danger_fraction: f64,
    /// Goal progress at or above this is a milestone (percent)
    pub milestone_progress: f64,
    /// Expense above this multiple of the category average breaks the habit
    pub habit_multiplier: f64,
    /// Day of month after which spending counts as late-month
    pub late_month_day: u32,
    /// Monthly expense above this fraction of income means a tight budget
    pub late_month_expense_ratio: f64,
    /// Local hour at which the late-night window opens
    pub night_start_hour: u32,
    /// Local hour (inclusive) at which the late-night window closes
    pub night_end_hour: u32,
    /// Categories prone to impulse purchases (lower-case)
    pub emotional_categories: Vec<String>,
    pub overconfidence_window_hours: i64,
    pub overconfidence_multiplier: f64,
    /// Expense above this fraction of monthly income is risky while income falls
    pub irregular_income_fraction: f64,
    pub drift_sample: usize,
    pub drift_multiplier: f64,
    pub micro_leak_window_days: i64,
    pub micro_leak_fraction: f64,
    pub micro_leak_min_count: usize,
    pub burst_window_hours: i64,
    pub burst_min_count: usize,
    pub improvement_sample: usize,
    pub improvement_min_count: usize,
    /// A prior expense above this multiple of the average counts as risky
    pub recovery_multiplier: f64,
    /// Offset of the user's wall clock from UTC, for hour and weekday checks
    pub utc_offset_minutes: i32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            week_days: 7,
            month_days: 30,
            category_dominance_percent: 20.0,
            goal_danger_fraction: 0.3,
            milestone_progress: 90.0,
            habit_multiplier: 2.0,
            late_month_day: 20,
            late_month_expense_ratio: 0.8,
            night_start_hour: 20,
            night_end_hour: 2,
            emotional_categories: ["shopping", "entertainment", "food", "dining"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            overconfidence_window_hours: 24,
            overconfidence_multiplier: 1.5,
            irregular_income_fraction: 0.1,
            drift_sample: 10,
            drift_multiplier: 1.4,
            micro_leak_window_days: 7,
            micro_leak_fraction: 0.5,
            micro_leak_min_count: 4,
            burst_window_hours: 12,
            burst_min_count: 5,
            improvement_sample: 5,
            improvement_min_count: 3,
            recovery_multiplier: 2.0,
            utc_offset_minutes: 0,
        }
    }
}

/// Score deltas and level boundaries of the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub set_aside_base: u32,
    pub large_set_aside_multiplier: f64,
    pub large_set_aside_bonus: u32,
    pub goal_support_bonus: u32,
    pub streak_bonus: u32,

    pub goal_danger_risk: u32,
    pub irregular_income_risk: u32,
    pub late_month_risk: u32,
    pub emotional_risk: u32,
    pub extreme_ratio: f64,
    pub extreme_ratio_risk: u32,

    pub high_ratio: f64,
    pub high_ratio_risk: u32,
    pub no_history_amount: f64,
    pub no_history_risk: u32,
    pub dominance_risk: u32,
    pub overconfidence_risk: u32,
    pub habit_risk: u32,

    pub weekend_multiplier: f64,
    pub weekend_risk: u32,
    pub weekly_change_percent: f64,
    pub weekly_change_risk: u32,
    pub drift_risk: u32,
    pub micro_leak_risk: u32,
    pub burst_risk: u32,

    pub improvement_bonus: u32,
    pub recovery_bonus: u32,

    /// POSITIVE requires positivity above this...
    pub positive_min_positivity: u32,
    /// ...and risk below this
    pub positive_max_risk: u32,
    /// Risk at or above this lifts a LOW decision to HIGH
    pub high_min_risk: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            set_aside_base: 30,
            large_set_aside_multiplier: 2.0,
            large_set_aside_bonus: 20,
            goal_support_bonus: 15,
            streak_bonus: 10,
            goal_danger_risk: 40,
            irregular_income_risk: 35,
            late_month_risk: 30,
            emotional_risk: 25,
            extreme_ratio: 5.0,
            extreme_ratio_risk: 30,
            high_ratio: 2.0,
            high_ratio_risk: 20,
            no_history_amount: 5000.0,
            no_history_risk: 25,
            dominance_risk: 15,
            overconfidence_risk: 15,
            habit_risk: 12,
            weekend_multiplier: 1.5,
            weekend_risk: 8,
            weekly_change_percent: 50.0,
            weekly_change_risk: 10,
            drift_risk: 15,
            micro_leak_risk: 18,
            burst_risk: 15,
            improvement_bonus: 15,
            recovery_bonus: 20,
            positive_min_positivity: 35,
            positive_max_risk: 20,
            high_min_risk: 25,
        }
    }
}

/// Whether a decision is worth an alert, and worth an email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub alert_min_risk: u32,
    pub alert_min_positivity: u32,
    pub alert_weekly_change_percent: f64,
    pub alert_min_streak: u32,
    pub email_min_transactions: u64,
    pub email_min_risk: u32,
    pub email_min_positivity: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            alert_min_risk: 20,
            alert_min_positivity: 25,
            alert_weekly_change_percent: 40.0,
            alert_min_streak: 3,
            email_min_transactions: 3,
            email_min_risk: 20,
            email_min_positivity: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeConfig {
    pub history_days: i64,
    pub new_source_positivity: u32,
    /// Variance at or above this is a bonus or raise (percent)
    pub bonus_variance_percent: f64,
    pub bonus_positivity: u32,
    /// The surplus may cover up to this multiple of a goal's remaining amount
    pub goal_surplus_multiplier: f64,
    /// Variance at or below the negative of this is a drop (percent)
    pub drop_variance_percent: f64,
    pub drop_risk: u32,
    pub goal_completion_positivity: u32,
    /// Variance within this band is routine (percent)
    pub routine_variance_percent: f64,
    pub routine_min_samples: usize,
}

impl Default for IncomeConfig {
    fn default() -> Self {
        Self {
            history_days: 180,
            new_source_positivity: 60,
            bonus_variance_percent: 30.0,
            bonus_positivity: 70,
            goal_surplus_multiplier: 2.0,
            drop_variance_percent: 30.0,
            drop_risk: 60,
            goal_completion_positivity: 80,
            routine_variance_percent: 10.0,
            routine_min_samples: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub cooldown_default_days: i64,
    pub cooldown_high_days: i64,
    pub cooldown_critical_days: i64,
    /// Window in which a repeated CRITICAL is absorbed without mutation
    pub critical_dedup_hours: i64,
    pub ignore_ratio: f64,
    pub ignore_risk_margin: u32,
    pub resolve_ratio: f64,
    pub resolve_risk_margin: u32,
    /// Same-level risk moves below this are noise
    pub minimal_risk_delta: u32,
    /// Risk moves beyond this warrant an update
    pub significant_risk_delta: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cooldown_default_days: 1,
            cooldown_high_days: 3,
            cooldown_critical_days: 7,
            critical_dedup_hours: 24,
            ignore_ratio: 0.6,
            ignore_risk_margin: 30,
            resolve_ratio: 0.5,
            resolve_risk_margin: 5,
            minimal_risk_delta: 10,
            significant_risk_delta: 20,
        }
    }
}

impl LifecycleConfig {
    pub fn cooldown_for(&self, level: Level) -> chrono::Duration {
        let days = match level {
            Level::Critical => self.cooldown_critical_days,
            Level::High => self.cooldown_high_days,
            _ => self.cooldown_default_days,
        };
        chrono::Duration::days(days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Trailing window of transactions considered as evidence (days)
    pub window_days: i64,
    pub overspending_min_count: usize,
    /// Recent average below this fraction of the recorded amount is improvement
    pub overspending_ratio: f64,
    pub overspending_share_percent: f64,
    pub savings_min_count: usize,
    pub savings_recent_days: i64,
    pub savings_rate_target: f64,
    pub goal_min_contributions: usize,
    pub goal_progress_percent: f64,
    pub income_min_count: usize,
    /// Mean absolute deviation over mean below this is stable income
    pub income_max_variation: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            overspending_min_count: 5,
            overspending_ratio: 0.7,
            overspending_share_percent: 15.0,
            savings_min_count: 3,
            savings_recent_days: 3,
            savings_rate_target: 20.0,
            goal_min_contributions: 2,
            goal_progress_percent: 90.0,
            income_min_count: 3,
            income_max_variation: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Bound on each notifier call; slower calls are abandoned
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub signals: SignalConfig,
    pub scoring: ScoringConfig,
    pub gate: GateConfig,
    pub income: IncomeConfig,
    pub lifecycle: LifecycleConfig,
    pub resolution: ResolutionConfig,
    pub notify: NotifyConfig,
}

impl EngineConfig {
    /// Load from an explicit path, the data-dir override, or embedded defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = load_config(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults only
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(NOTIFY_TIMEOUT_ENV) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.notify.timeout_secs = secs,
                _ => warn!("Ignoring invalid {}={}", NOTIFY_TIMEOUT_ENV, raw),
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let l = &self.lifecycle;
        if l.cooldown_default_days < 0 || l.cooldown_high_days < 0 || l.cooldown_critical_days < 0
        {
            return Err(Error::Config("cooldown days must not be negative".into()));
        }
        if self.signals.month_days <= 0 || self.signals.week_days <= 0 {
            return Err(Error::Config("signal windows must be positive".into()));
        }
        if self.resolution.window_days <= 0 {
            return Err(Error::Config("resolution window must be positive".into()));
        }
        if self.notify.timeout_secs == 0 {
            return Err(Error::Config("notify timeout must be positive".into()));
        }
        Ok(())
    }

    /// Serialize back to TOML (for `config show`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("fincoach").join("config").join("coach.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<EngineConfig> {
    let candidate = match override_path {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path(),
    };

    let content = match candidate {
        Some(path) if path.exists() => {
            debug!("Loading engine config from {}", path.display());
            fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
        }
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Parse config from TOML content
pub fn parse_config(content: &str) -> Result<EngineConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_matches_defaults() {
        let embedded = EngineConfig::embedded().unwrap();
        assert_eq!(embedded, EngineConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = parse_config(
            r#"
            [lifecycle]
            cooldown_critical_days = 10

            [notify]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.cooldown_critical_days, 10);
        assert_eq!(config.lifecycle.cooldown_high_days, 3);
        assert_eq!(config.notify.timeout(), Duration::from_secs(5));
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_config("[lifecycle\nbroken").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_path_falls_back_to_embedded() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/coach.toml"))).unwrap();
        assert_eq!(config.lifecycle, LifecycleConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = EngineConfig::default();
        config.notify.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_for_level() {
        let l = LifecycleConfig::default();
        assert_eq!(l.cooldown_for(Level::Critical), chrono::Duration::days(7));
        assert_eq!(l.cooldown_for(Level::High), chrono::Duration::days(3));
        assert_eq!(l.cooldown_for(Level::Medium), chrono::Duration::days(1));
        assert_eq!(l.cooldown_for(Level::Positive), chrono::Duration::days(1));
        assert_eq!(l.cooldown_for(Level::Low), chrono::Duration::days(1));
    }
}
