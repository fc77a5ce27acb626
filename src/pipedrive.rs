//! Pipedrive REST client — the production [`RecordStore`].
//!
//! All calls go through [`with_retry`]: rate limits (429) and server-side
//! failures get a bounded number of attempts with linearly increasing
//! delay; client-side rejections surface immediately. Authentication is
//! the `api_token` query parameter on every request.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::SyncError;
use crate::store::{
    Activity, ActivityTypeEntry, Deal, DealPage, NewActivity, RecordStore,
};

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: attempt 1 waits base, attempt 2 waits 2×base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt as u64))
    }
}

/// Run `op` until it succeeds, fails non-retryably, or exhausts the
/// attempt cap. The last retryable failure is surfaced on exhaustion.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                log::warn!(
                    "pipedrive retry {}/{} after {} (sleep {:?})",
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// Wire types (deserialized from Pipedrive JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    additional_data: Option<AdditionalData>,
}

#[derive(Debug, Default, Deserialize)]
struct AdditionalData {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    more_items_in_collection: bool,
}

#[derive(Debug, Deserialize)]
struct RawActivity {
    id: i64,
    #[serde(default)]
    deal_id: Option<i64>,
    #[serde(default, rename = "type")]
    type_key: String,
    #[serde(default)]
    subject: Option<String>,
    /// Older API versions serialize this as 0/1, newer ones as a bool.
    #[serde(default, deserialize_with = "bool_or_int")]
    done: bool,
    #[serde(default)]
    due_date: Option<String>,
}

impl RawActivity {
    fn into_activity(self) -> Activity {
        Activity {
            id: self.id,
            deal_id: self.deal_id,
            type_key: self.type_key,
            subject: self.subject.unwrap_or_default(),
            done: self.done,
            due_date: self
                .due_date
                .as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDeal {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    org_name: Option<String>,
    #[serde(default)]
    person_name: Option<String>,
    #[serde(default)]
    org_id: Option<Value>,
    #[serde(default)]
    person_id: Option<Value>,
    #[serde(default)]
    update_time: Option<String>,
    /// Custom fields arrive as top-level keys; the crew field is one of
    /// them, addressed by its configured 40-hex key.
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

impl RawDeal {
    fn into_deal(self, crew_field_key: &str) -> Deal {
        let org_name = non_blank(self.org_name).or_else(|| name_from_ref(self.org_id.as_ref()));
        let person_name =
            non_blank(self.person_name).or_else(|| name_from_ref(self.person_id.as_ref()));
        let crew_field = self
            .extra
            .get(crew_field_key)
            .filter(|v| !v.is_null())
            .cloned();
        Deal {
            id: self.id,
            title: non_blank(self.title),
            org_name,
            person_name,
            crew_field,
            update_time: self.update_time.as_deref().and_then(parse_update_time),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawActivityType {
    #[serde(default)]
    name: String,
    #[serde(default)]
    key_string: String,
}

fn bool_or_int<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Pull a display name out of an expanded org/person reference object.
fn name_from_ref(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pipedrive timestamps come as `"2026-08-14 09:21:07"` (UTC, no zone).
/// RFC 3339 is accepted as a fallback.
fn parse_update_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Client
// ============================================================================

pub struct PipedriveClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    crew_field_key: String,
    retry: RetryPolicy,
}

impl PipedriveClient {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            crew_field_key: config.crew_field_key.clone(),
            retry: RetryPolicy::default(),
        })
    }

    fn query(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut query = vec![("api_token", self.api_token.clone())];
        query.extend(extra.iter().cloned());
        query
    }

    /// One request/response cycle. `Ok(None)` means 404; retryable statuses
    /// become errors classified by [`SyncError::is_retryable`].
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Envelope<T>>, SyncError> {
        let url = format!("{}/v1/{}", self.base_url, path);
        let mut request = self.http.request(method, &url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::api(status.as_u16(), message));
        }

        let envelope: Envelope<T> = response.json().await?;
        Ok(Some(envelope))
    }
}

#[async_trait]
impl RecordStore for PipedriveClient {
    async fn activity(&self, id: i64) -> Result<Option<Activity>, SyncError> {
        let path = format!("activities/{}", id);
        let query = self.query(&[]);
        let envelope = with_retry(&self.retry, || {
            self.send::<RawActivity>(Method::GET, &path, &query, None)
        })
        .await?;
        Ok(envelope
            .and_then(|e| if e.success { e.data } else { None })
            .map(RawActivity::into_activity))
    }

    async fn deal(&self, id: i64) -> Result<Option<Deal>, SyncError> {
        let path = format!("deals/{}", id);
        let query = self.query(&[]);
        let envelope = with_retry(&self.retry, || {
            self.send::<RawDeal>(Method::GET, &path, &query, None)
        })
        .await?;
        Ok(envelope
            .and_then(|e| if e.success { e.data } else { None })
            .map(|raw| raw.into_deal(&self.crew_field_key)))
    }

    async fn open_activities(&self, deal_id: i64) -> Result<Vec<Activity>, SyncError> {
        let path = format!("deals/{}/activities", deal_id);
        let query = self.query(&[("done", "0".to_string())]);
        let envelope = with_retry(&self.retry, || {
            self.send::<Vec<RawActivity>>(Method::GET, &path, &query, None)
        })
        .await?;
        let raw = envelope.and_then(|e| e.data).unwrap_or_default();
        Ok(raw
            .into_iter()
            .map(RawActivity::into_activity)
            .filter(|a| !a.done)
            .collect())
    }

    async fn deals_page(&self, start: usize, limit: usize) -> Result<DealPage, SyncError> {
        let query = self.query(&[
            ("sort", "update_time DESC".to_string()),
            ("start", start.to_string()),
            ("limit", limit.to_string()),
        ]);
        let envelope = with_retry(&self.retry, || {
            self.send::<Vec<RawDeal>>(Method::GET, "deals", &query, None)
        })
        .await?;

        let Some(envelope) = envelope else {
            return Ok(DealPage {
                deals: Vec::new(),
                more: false,
            });
        };
        let more = envelope
            .additional_data
            .and_then(|a| a.pagination)
            .map(|p| p.more_items_in_collection)
            .unwrap_or(false);
        let deals = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|raw| raw.into_deal(&self.crew_field_key))
            .collect();
        Ok(DealPage { deals, more })
    }

    async fn update_subject(&self, activity_id: i64, subject: &str) -> Result<bool, SyncError> {
        let path = format!("activities/{}", activity_id);
        let query = self.query(&[]);
        let body = json!({ "subject": subject });
        let envelope = with_retry(&self.retry, || {
            self.send::<Value>(Method::PUT, &path, &query, Some(&body))
        })
        .await?;
        Ok(envelope.map(|e| e.success).unwrap_or(false))
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<bool, SyncError> {
        let query = self.query(&[]);
        let body = json!({
            "subject": activity.subject,
            "type": activity.type_key,
            "deal_id": activity.deal_id,
            "done": 0,
            "due_date": activity.due_date.format("%Y-%m-%d").to_string(),
        });
        let envelope = with_retry(&self.retry, || {
            self.send::<Value>(Method::POST, "activities", &query, Some(&body))
        })
        .await?;
        Ok(envelope.map(|e| e.success).unwrap_or(false))
    }

    async fn activity_types(&self) -> Result<Vec<ActivityTypeEntry>, SyncError> {
        let query = self.query(&[]);
        let envelope = with_retry(&self.retry, || {
            self.send::<Vec<RawActivityType>>(Method::GET, "activityTypes", &query, None)
        })
        .await?;
        let raw = envelope.and_then(|e| e.data).unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter(|t| !t.key_string.is_empty())
            .map(|t| ActivityTypeEntry {
                label: t.name,
                key: t.key_string,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
