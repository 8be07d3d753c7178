//! Alert Store contract
//!
//! The lifecycle manager and the resolution sweep only ever talk to alerts
//! through this trait. Writes are optimistic: `save` succeeds only against the
//! version it read, and `create` fails if the identity already has an active
//! alert. Both failures surface as [`Error::Conflict`](crate::Error::Conflict).

use crate::error::Result;
use crate::models::{Alert, NewAlert, Scope};

pub trait AlertStore: Send + Sync {
    /// The active alert for an identity, if any
    fn find_active(&self, user_id: &str, scope: Scope, area_key: &str) -> Result<Option<Alert>>;

    /// Insert a new active alert
    fn create(&self, alert: &NewAlert) -> Result<Alert>;

    /// Conditional update against `alert.version`; returns the stored alert
    fn save(&self, alert: &Alert) -> Result<Alert>;

    fn find_all_active(&self, user_id: &str) -> Result<Vec<Alert>>;

    fn get(&self, id: i64) -> Result<Option<Alert>>;

    /// Most recently resolved instance of an identity
    fn find_last_resolved(
        &self,
        user_id: &str,
        scope: Scope,
        area_key: &str,
    ) -> Result<Option<Alert>>;
}
