//! Fincoach Core Library
//!
//! Transaction scoring and alert lifecycle for the fincoach tool:
//! - Signal extraction and rule-table scoring for each transaction
//! - Income analysis that overrides the generic score for income
//! - Alert area classification and the per-identity alert lifecycle
//! - Auto-resolution sweeps when behavior improves
//! - Outbox delivery to insight and email notifiers
//! - SQLite-backed alert store and transaction ledger

pub mod area;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod income;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod resolution;
pub mod scoring;
pub mod service;
pub mod signals;
pub mod stats;
pub mod store;

/// Test utilities including a mock notifier server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use area::{classify, normalize_category};
pub use config::EngineConfig;
pub use db::Database;
pub use engine::{Assessment, CoachEngine, ProcessOutcome};
pub use error::{Error, Result};
pub use income::{IncomeAnalyzer, IncomeSkip, IncomeVerdict};
pub use lifecycle::{decide, AlertAction, AlertLifecycle, LifecycleDecision, SkipReason, Trigger};
pub use notify::{
    AlertEvent, DeliveryReport, EmailNotifier, InsightNotifier, LogNotifier, Notifier, Outbox,
    OutboxWorker,
};
pub use resolution::{Improvement, ResolutionEngine, ResolutionEvidence, SweepReport};
pub use scoring::Scorer;
pub use service::{CoachService, IngestOutcome};
pub use signals::{SignalExtractor, Signals};
pub use store::AlertStore;
