//! Alert lifecycle
//!
//! Decides, per alert identity, whether a scored transaction opens a new alert,
//! refreshes the active one, or is suppressed. The decision itself is the pure
//! [`decide`] function; [`AlertLifecycle`] wraps it with the store round-trip,
//! serialized per identity.
//!
//! Sensitivity adapts to feedback: identities the user keeps ignoring need a
//! much larger risk jump to re-alert, identities that tend to get resolved
//! re-alert on smaller moves.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertArea, AlertIdentity, AlertMeta, Decision, Level, NewAlert, ResolutionReason,
    ResolvedBy, Stats, Transaction,
};
use crate::store::AlertStore;

/// Outcome of the lifecycle state machine for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleDecision {
    Create,
    Update,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Repeat CRITICAL within the dedup window, absorbed without mutation
    DuplicateCritical,
    Cooldown,
    /// Identity is mostly ignored and the risk jump is too small
    Desensitized,
    MinimalChange,
    SameReasons,
    NoMeaningfulChange,
    /// Lost the optimistic write twice in a row
    Conflict,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateCritical => "duplicate_critical",
            Self::Cooldown => "cooldown",
            Self::Desensitized => "desensitized",
            Self::MinimalChange => "minimal_change",
            Self::SameReasons => "same_reasons",
            Self::NoMeaningfulChange => "no_meaningful_change",
            Self::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn ratio(count: u32, triggers: u32) -> f64 {
    count as f64 / triggers.max(1) as f64
}

/// Create, update or skip, given the active alert for the identity (if any)
pub fn decide(
    existing: Option<&Alert>,
    decision: &Decision,
    now: DateTime<Utc>,
    config: &LifecycleConfig,
) -> LifecycleDecision {
    let Some(existing) = existing else {
        return LifecycleDecision::Create;
    };

    if existing.level == Level::Critical
        && decision.level == Level::Critical
        && now - existing.last_triggered_at < Duration::hours(config.critical_dedup_hours)
    {
        return LifecycleDecision::Skip(SkipReason::DuplicateCritical);
    }

    if now < existing.cool_down_until {
        return LifecycleDecision::Skip(SkipReason::Cooldown);
    }

    let risk = i64::from(decision.risk_score);
    let last_risk = i64::from(existing.last_risk_score);

    if ratio(existing.ignored_count, existing.trigger_count) > config.ignore_ratio
        && risk < last_risk + i64::from(config.ignore_risk_margin)
    {
        return LifecycleDecision::Skip(SkipReason::Desensitized);
    }

    if ratio(existing.resolved_count, existing.trigger_count) > config.resolve_ratio
        && risk > last_risk + i64::from(config.resolve_risk_margin)
    {
        return LifecycleDecision::Update;
    }

    let delta = risk - last_risk;
    if existing.level == decision.level && delta.abs() < i64::from(config.minimal_risk_delta) {
        return LifecycleDecision::Skip(SkipReason::MinimalChange);
    }

    let previous: HashSet<&str> = existing.meta.last_reasons.iter().map(String::as_str).collect();
    let current: HashSet<&str> = decision.reasons.iter().map(String::as_str).collect();
    if previous == current {
        return LifecycleDecision::Skip(SkipReason::SameReasons);
    }

    if delta.abs() > i64::from(config.significant_risk_delta) {
        return LifecycleDecision::Update;
    }

    LifecycleDecision::Skip(SkipReason::NoMeaningfulChange)
}

/// What the lifecycle did with one event
#[derive(Debug, Clone, PartialEq)]
pub enum AlertAction {
    Created(Alert),
    Updated(Alert),
    Skipped(SkipReason),
    /// The store could not be read or written; no alert state changed
    Unavailable,
}

impl AlertAction {
    /// The alert that was committed, if any
    pub fn committed(&self) -> Option<&Alert> {
        match self {
            Self::Created(alert) | Self::Updated(alert) => Some(alert),
            Self::Skipped(_) | Self::Unavailable => None,
        }
    }
}

/// One mutex per alert identity, created on demand
#[derive(Default)]
struct IdentityLocks {
    inner: Mutex<HashMap<AlertIdentity, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    const PRUNE_THRESHOLD: usize = 1024;

    fn lock_for(&self, identity: &AlertIdentity) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.len() >= Self::PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        map.entry(identity.clone()).or_default().clone()
    }
}

/// The event context an alert records in its meta
pub struct Trigger<'a> {
    pub decision: &'a Decision,
    pub transaction: &'a Transaction,
    pub stats: &'a Stats,
}

impl Trigger<'_> {
    fn meta(&self) -> AlertMeta {
        AlertMeta {
            last_reasons: self.decision.reasons.clone(),
            last_category: self.transaction.category.clone(),
            last_type: Some(self.transaction.tx_type),
            last_amount: self.transaction.amount,
            behavioral_flags: self.decision.behavioral_flags,
            stats_snapshot: self.stats.snapshot(),
        }
    }
}

/// Runs [`decide`] against the store, serialized per identity
pub struct AlertLifecycle {
    store: Arc<dyn AlertStore>,
    config: LifecycleConfig,
    locks: IdentityLocks,
}

impl AlertLifecycle {
    pub fn new(store: Arc<dyn AlertStore>, config: LifecycleConfig) -> Self {
        Self {
            store,
            config,
            locks: IdentityLocks::default(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Apply one scored event to its identity. Never fails: store problems
    /// come back as `Unavailable` or `Skipped(Conflict)`.
    pub fn apply(
        &self,
        user_id: &str,
        area: &AlertArea,
        trigger: &Trigger<'_>,
        now: DateTime<Utc>,
    ) -> AlertAction {
        let identity = AlertIdentity::new(user_id, area);
        let lock = self.locks.lock_for(&identity);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        match self.apply_once(user_id, area, trigger, now) {
            Err(e) if e.is_conflict() => {
                debug!("Conflict on {}, retrying with a fresh read: {}", identity, e);
            }
            Ok(action) => return action,
            Err(e) => {
                warn!("Alert store unavailable for {}: {}", identity, e);
                return AlertAction::Unavailable;
            }
        }

        match self.apply_once(user_id, area, trigger, now) {
            Ok(action) => action,
            Err(e) if e.is_conflict() => {
                warn!("Repeated conflict on {}, skipping this event: {}", identity, e);
                AlertAction::Skipped(SkipReason::Conflict)
            }
            Err(e) => {
                warn!("Alert store unavailable for {}: {}", identity, e);
                AlertAction::Unavailable
            }
        }
    }

    fn apply_once(
        &self,
        user_id: &str,
        area: &AlertArea,
        trigger: &Trigger<'_>,
        now: DateTime<Utc>,
    ) -> Result<AlertAction> {
        let decision = trigger.decision;
        let existing = self.store.find_active(user_id, area.scope, &area.area_key)?;
        let verdict = decide(existing.as_ref(), decision, now, &self.config);

        match (verdict, existing) {
            (LifecycleDecision::Skip(reason), _) => {
                debug!(
                    "Skipping {}/{}/{}: {}",
                    user_id, area.scope, area.area_key, reason
                );
                Ok(AlertAction::Skipped(reason))
            }
            (LifecycleDecision::Update, Some(mut alert)) => {
                alert.page = area.page.clone();
                alert.title = area.title.clone();
                alert.level = decision.level;
                alert.last_risk_score = decision.risk_score;
                alert.last_positivity_score = decision.positivity_score;
                alert.last_transaction_id = Some(trigger.transaction.id.clone());
                alert.last_triggered_at = now;
                alert.cool_down_until = alert
                    .cool_down_until
                    .max(now + self.config.cooldown_for(decision.level));
                alert.trigger_count += 1;
                alert.meta = trigger.meta();
                alert.updated_at = now;

                let saved = self.store.save(&alert)?;
                info!(
                    "Updated alert {} ({}) at {} after {} triggers",
                    saved.id,
                    saved.identity(),
                    saved.level,
                    saved.trigger_count
                );
                Ok(AlertAction::Updated(saved))
            }
            (LifecycleDecision::Create, _) | (LifecycleDecision::Update, None) => {
                let previous =
                    self.store
                        .find_last_resolved(user_id, area.scope, &area.area_key)?;
                let new = NewAlert {
                    user_id: user_id.to_string(),
                    area: area.clone(),
                    level: decision.level,
                    last_risk_score: decision.risk_score,
                    last_positivity_score: decision.positivity_score,
                    last_transaction_id: Some(trigger.transaction.id.clone()),
                    last_triggered_at: now,
                    cool_down_until: now + self.config.cooldown_for(decision.level),
                    trigger_count: 1,
                    resolved_count: previous.as_ref().map_or(0, |a| a.resolved_count),
                    ignored_count: previous.as_ref().map_or(0, |a| a.ignored_count),
                    meta: trigger.meta(),
                };

                let created = self.store.create(&new)?;
                info!(
                    "Created alert {} ({}) at {}",
                    created.id,
                    created.identity(),
                    created.level
                );
                Ok(AlertAction::Created(created))
            }
        }
    }

    /// Record that the user dismissed an active alert without acting on it
    pub fn mark_ignored(&self, alert_id: i64, now: DateTime<Utc>) -> Result<Alert> {
        self.mutate_active(alert_id, |alert| {
            alert.ignored_count += 1;
            alert.updated_at = now;
        })
    }

    /// Close an active alert on the user's behalf
    pub fn resolve_by_user(&self, alert_id: i64, now: DateTime<Utc>) -> Result<Alert> {
        self.mutate_active(alert_id, |alert| {
            alert.resolve(ResolvedBy::User, ResolutionReason::UserAcknowledged, now);
        })
    }

    /// Active CRITICAL, HIGH and POSITIVE alerts, most recently updated first
    pub fn active_alerts(&self, user_id: &str) -> Result<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .store
            .find_all_active(user_id)?
            .into_iter()
            .filter(|a| a.level.is_notable())
            .collect();
        alerts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    fn mutate_active(&self, alert_id: i64, change: impl Fn(&mut Alert)) -> Result<Alert> {
        let mut retried = false;
        loop {
            let mut alert = self
                .store
                .get(alert_id)?
                .filter(Alert::is_active)
                .ok_or_else(|| Error::NotFound(format!("active alert {}", alert_id)))?;

            let lock = self.locks.lock_for(&alert.identity());
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

            change(&mut alert);
            match self.store.save(&alert) {
                Err(e) if e.is_conflict() && !retried => {
                    debug!("Conflict on alert {}, retrying: {}", alert_id, e);
                    retried = true;
                }
                result => return result,
            }
        }
    }
}
