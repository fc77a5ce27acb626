//! Record-store abstraction over the CRM.
//!
//! The engine never talks to Pipedrive directly — it goes through
//! [`RecordStore`], implemented by [`crate::pipedrive::PipedriveClient`] in
//! production and by an in-memory fake in tests. Snapshots are transient
//! reads; nothing here is cached across invocations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::error::SyncError;

/// Read snapshot of a deal (the parent/job record).
#[derive(Debug, Clone)]
pub struct Deal {
    pub id: i64,
    pub title: Option<String>,
    pub org_name: Option<String>,
    pub person_name: Option<String>,
    /// Raw crew custom-field value, exactly as the store returned it.
    pub crew_field: Option<Value>,
    pub update_time: Option<DateTime<Utc>>,
}

/// Read snapshot of an activity (the child/task record).
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: i64,
    /// Activities may be unlinked from any deal.
    pub deal_id: Option<i64>,
    /// Stable lowercase/slug type key (`"demo"`, `"moisture_check_pickup"`).
    pub type_key: String,
    pub subject: String,
    pub done: bool,
    pub due_date: Option<NaiveDate>,
}

/// One page of deals ordered by last-modified time, descending.
#[derive(Debug, Clone)]
pub struct DealPage {
    pub deals: Vec<Deal>,
    pub more: bool,
}

/// Fields for a derived activity to be created.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub subject: String,
    pub type_key: String,
    pub deal_id: i64,
    pub due_date: NaiveDate,
}

/// One (display label, stable key) pair from the activity-type catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTypeEntry {
    pub label: String,
    pub key: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one activity; `Ok(None)` when the id does not exist.
    async fn activity(&self, id: i64) -> Result<Option<Activity>, SyncError>;

    /// Fetch one deal; `Ok(None)` when the id does not exist.
    async fn deal(&self, id: i64) -> Result<Option<Deal>, SyncError>;

    /// All open (incomplete) activities linked to a deal.
    async fn open_activities(&self, deal_id: i64) -> Result<Vec<Activity>, SyncError>;

    /// Page of deals sorted by `update_time` descending.
    async fn deals_page(&self, start: usize, limit: usize) -> Result<DealPage, SyncError>;

    /// Update an activity's subject. Returns the store's own success flag.
    async fn update_subject(&self, activity_id: i64, subject: &str) -> Result<bool, SyncError>;

    /// Create a new activity. Returns the store's own success flag.
    async fn create_activity(&self, activity: &NewActivity) -> Result<bool, SyncError>;

    /// The activity-type translation table.
    async fn activity_types(&self) -> Result<Vec<ActivityTypeEntry>, SyncError>;
}
