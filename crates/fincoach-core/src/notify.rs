//! Downstream notifiers and the alert outbox
//!
//! Alert events are queued only after the alert state is committed. A worker
//! drains the queue and hands each event to every notifier under a timeout.
//! Notifier failures are logged and dropped: they never block ingestion and
//! never roll back alert state.
//!
//! # Configuration
//!
//! Environment variables:
//! - `FINCOACH_INSIGHT_URL`: Insight generation service base URL (optional)
//! - `FINCOACH_EMAIL_URL`: Email dispatch service base URL (optional)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{Level, ResolutionReason, Scope, Stats, Transaction};
use crate::resolution::Improvement;

pub const INSIGHT_URL_ENV: &str = "FINCOACH_INSIGHT_URL";
pub const EMAIL_URL_ENV: &str = "FINCOACH_EMAIL_URL";

/// A committed create or update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedAlert {
    pub alert_id: i64,
    pub user_id: String,
    pub level: Level,
    pub scope: Scope,
    pub area_key: String,
    pub title: String,
    pub reasons: Vec<String>,
    pub risk_score: u32,
    pub positivity_score: u32,
    pub transaction: Transaction,
    pub stats: Stats,
    /// False when an existing alert was refreshed
    pub created: bool,
    pub email_worthy: bool,
}

/// A committed system resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAlert {
    pub alert_id: i64,
    pub user_id: String,
    pub scope: Scope,
    pub area_key: String,
    pub title: String,
    pub reason: ResolutionReason,
    pub improvement: Option<Improvement>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlertEvent {
    Finalized(FinalizedAlert),
    Resolved(ResolvedAlert),
}

impl AlertEvent {
    pub fn alert_id(&self) -> i64 {
        match self {
            Self::Finalized(e) => e.alert_id,
            Self::Resolved(e) => e.alert_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::Finalized(e) => &e.user_id,
            Self::Resolved(e) => &e.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Finalized(_) => "finalized",
            Self::Resolved(_) => "resolved",
        }
    }
}

/// A fire-and-forget consumer of alert events
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one event. Events a notifier does not care about return `Ok(())`.
    async fn notify(&self, event: &AlertEvent) -> Result<()>;
}

/// Sending half of the alert event queue
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl Outbox {
    pub fn channel() -> (Self, OutboxWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, OutboxWorker { rx })
    }

    /// Queue an event. Never blocks; a closed queue only logs.
    pub fn emit(&self, event: AlertEvent) {
        let (kind, alert_id) = (event.kind(), event.alert_id());
        if self.tx.send(event).is_err() {
            warn!(
                "Outbox closed, dropping {} event for alert {}",
                kind, alert_id
            );
        }
    }
}

/// Counts from one outbox drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub events: usize,
    pub delivered: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Receiving half of the alert event queue
pub struct OutboxWorker {
    rx: mpsc::UnboundedReceiver<AlertEvent>,
}

impl OutboxWorker {
    /// Deliver events until every [`Outbox`] handle is dropped
    pub async fn run(
        mut self,
        notifiers: Vec<Arc<dyn Notifier>>,
        timeout: Duration,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        while let Some(event) = self.rx.recv().await {
            report.events += 1;
            for notifier in &notifiers {
                match tokio::time::timeout(timeout, notifier.notify(&event)).await {
                    Ok(Ok(())) => {
                        debug!(
                            "{} delivered {} event for alert {}",
                            notifier.name(),
                            event.kind(),
                            event.alert_id()
                        );
                        report.delivered += 1;
                    }
                    Ok(Err(e)) => {
                        warn!(
                            "{} failed on {} event for alert {}: {}",
                            notifier.name(),
                            event.kind(),
                            event.alert_id(),
                            e
                        );
                        report.failed += 1;
                    }
                    Err(_) => {
                        warn!(
                            "{} timed out after {:?} on alert {}",
                            notifier.name(),
                            timeout,
                            event.alert_id()
                        );
                        report.timed_out += 1;
                    }
                }
            }
        }
        report
    }

    /// Take whatever is queued right now without delivering it
    pub fn drain_pending(&mut self) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn alert_summary(event: &FinalizedAlert) -> Value {
    json!({
        "id": event.alert_id,
        "level": event.level,
        "scope": event.scope,
        "areaKey": event.area_key,
        "title": event.title,
        "reasons": event.reasons,
    })
}

async fn post_json(client: &Client, url: &str, body: &Value) -> Result<()> {
    let response = client.post(url).json(body).send().await?;
    if !response.status().is_success() {
        return Err(Error::Notify(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }
    Ok(())
}

/// Asks the insight service to write up a finalized alert
pub struct InsightNotifier {
    http_client: Client,
    base_url: String,
}

impl InsightNotifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var(INSIGHT_URL_ENV).ok()?;
        Some(Self::new(&url))
    }

    pub fn payload(event: &FinalizedAlert) -> Value {
        json!({
            "userId": event.user_id,
            "alert": alert_summary(event),
            "scores": {
                "risk": event.risk_score,
                "positivity": event.positivity_score,
            },
            "transaction": event.transaction,
            "stats": event.stats,
            "dataConfidence": "high",
        })
    }
}

#[async_trait]
impl Notifier for InsightNotifier {
    fn name(&self) -> &str {
        "insight"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        let AlertEvent::Finalized(alert) = event else {
            return Ok(());
        };
        let url = format!("{}/ai/insights", self.base_url);
        post_json(&self.http_client, &url, &Self::payload(alert)).await
    }
}

/// Emails the user about email-worthy alerts and behavior improvements
pub struct EmailNotifier {
    http_client: Client,
    base_url: String,
}

impl EmailNotifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var(EMAIL_URL_ENV).ok()?;
        Some(Self::new(&url))
    }

    /// Body for events that warrant an email, `None` for the rest
    pub fn payload(event: &AlertEvent) -> Option<Value> {
        match event {
            AlertEvent::Finalized(alert) if alert.email_worthy => Some(json!({
                "userId": alert.user_id,
                "kind": "alert",
                "alert": alert_summary(alert),
                "transaction": alert.transaction,
            })),
            AlertEvent::Resolved(resolved)
                if resolved.reason == ResolutionReason::BehaviorImproved =>
            {
                Some(json!({
                    "userId": resolved.user_id,
                    "kind": "behavior_improved",
                    "alert": {
                        "id": resolved.alert_id,
                        "scope": resolved.scope,
                        "areaKey": resolved.area_key,
                        "title": resolved.title,
                    },
                    "improvement": resolved.improvement,
                    "reasons": resolved.reasons,
                }))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        let Some(body) = Self::payload(event) else {
            return Ok(());
        };
        let url = format!("{}/email/coach", self.base_url);
        post_json(&self.http_client, &url, &body).await
    }
}

/// Writes every event to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<()> {
        match event {
            AlertEvent::Finalized(alert) => info!(
                "Alert {} {} for {} [{}] risk={} positivity={}: {}",
                alert.alert_id,
                if alert.created { "created" } else { "updated" },
                alert.user_id,
                alert.level,
                alert.risk_score,
                alert.positivity_score,
                alert.title
            ),
            AlertEvent::Resolved(resolved) => info!(
                "Alert {} resolved for {} ({}): {}",
                resolved.alert_id, resolved.user_id, resolved.reason, resolved.title
            ),
        }
        Ok(())
    }
}

/// Log notifier plus whichever HTTP notifiers the environment configures
pub fn notifiers_from_env() -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(insight) = InsightNotifier::from_env() {
        notifiers.push(Arc::new(insight));
    }
    if let Some(email) = EmailNotifier::from_env() {
        notifiers.push(Arc::new(email));
    }
    notifiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::sync::Mutex;

    fn finalized(alert_id: i64, email_worthy: bool) -> AlertEvent {
        AlertEvent::Finalized(FinalizedAlert {
            alert_id,
            user_id: USER.to_string(),
            level: Level::Critical,
            scope: Scope::Expense,
            area_key: "expense_food".to_string(),
            title: "Expense alert – Food".to_string(),
            reasons: vec!["Spent 6x your usual amount".to_string()],
            risk_score: 50,
            positivity_score: 0,
            transaction: expense("t1", "Food", 6000.0, noon()),
            stats: stats_with_avg(1000.0),
            created: true,
            email_worthy,
        })
    }

    fn resolved(reason: ResolutionReason) -> AlertEvent {
        AlertEvent::Resolved(ResolvedAlert {
            alert_id: 7,
            user_id: USER.to_string(),
            scope: Scope::Expense,
            area_key: "overspending_food".to_string(),
            title: "Overspending".to_string(),
            reason,
            improvement: Some(Improvement::ConsistentLowExpenses),
            reasons: vec!["Keep up the excellent work!".to_string()],
        })
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, event: &AlertEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.alert_id());
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl Notifier for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn notify(&self, _event: &AlertEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn notify(&self, _event: &AlertEvent) -> Result<()> {
            Err(Error::Notify("service down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_slow_and_failing_notifiers_are_isolated() {
        let (outbox, worker) = Outbox::channel();
        outbox.emit(finalized(1, false));
        outbox.emit(finalized(2, false));
        drop(outbox);

        let recording = Arc::new(Recording::default());
        let notifiers: Vec<Arc<dyn Notifier>> =
            vec![Arc::new(Slow), Arc::new(Broken), recording.clone()];

        let started = std::time::Instant::now();
        let report = worker.run(notifiers, Duration::from_millis(50)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(*recording.seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(
            report,
            DeliveryReport {
                events: 2,
                delivered: 2,
                failed: 2,
                timed_out: 2,
            }
        );
    }

    #[test]
    fn test_emit_after_worker_dropped_does_not_panic() {
        let (outbox, worker) = Outbox::channel();
        drop(worker);
        outbox.emit(finalized(1, false));
    }

    #[test]
    fn test_insight_payload_shape() {
        let AlertEvent::Finalized(alert) = finalized(3, false) else {
            unreachable!()
        };
        let payload = InsightNotifier::payload(&alert);
        assert_eq!(payload["userId"], USER);
        assert_eq!(payload["alert"]["id"], 3);
        assert_eq!(payload["alert"]["level"], "CRITICAL");
        assert_eq!(payload["alert"]["areaKey"], "expense_food");
        assert_eq!(payload["scores"]["risk"], 50);
        assert_eq!(payload["transaction"]["type"], "expense");
        assert_eq!(payload["dataConfidence"], "high");
    }

    #[test]
    fn test_email_only_for_worthy_events() {
        assert!(EmailNotifier::payload(&finalized(1, false)).is_none());
        assert!(EmailNotifier::payload(&finalized(1, true)).is_some());

        let improved = EmailNotifier::payload(&resolved(ResolutionReason::BehaviorImproved))
            .expect("behavior improvement is emailed");
        assert_eq!(improved["kind"], "behavior_improved");
        assert_eq!(improved["improvement"], "consistent_low_expenses");

        assert!(EmailNotifier::payload(&resolved(ResolutionReason::MetricsImproved)).is_none());
    }

    #[tokio::test]
    async fn test_http_notifiers_post_to_service() {
        let server = MockNotifyServer::start().await;
        let insight = InsightNotifier::new(&server.url());
        let email = EmailNotifier::new(&format!("{}/", server.url()));

        insight.notify(&finalized(4, true)).await.unwrap();
        insight
            .notify(&resolved(ResolutionReason::BehaviorImproved))
            .await
            .unwrap();
        email.notify(&finalized(4, true)).await.unwrap();
        email.notify(&finalized(5, false)).await.unwrap();

        let requests = server.requests();
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/ai/insights", "/email/coach"]);
        assert_eq!(requests[0].body["alert"]["id"], 4);
    }

    #[tokio::test]
    async fn test_http_error_status_is_notify_error() {
        let server = MockNotifyServer::start_failing().await;
        let insight = InsightNotifier::new(&server.url());
        let result = insight.notify(&finalized(1, false)).await;
        assert!(matches!(result, Err(Error::Notify(_))));
    }
}
