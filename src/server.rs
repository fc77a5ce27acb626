//! HTTP trigger surface — webhooks, manual triggers, diagnostics.
//!
//! Webhook handlers acknowledge with 202 before doing any reconciliation
//! work (the upstream retries on slow responses); the actual work runs in
//! a detached task whose only failure path is the structured log. The ack
//! says nothing about eventual success.
//!
//! Pipedrive has shipped several webhook payload shapes; the record id is
//! probed through an ordered list of JSON pointer rules so new shapes are
//! an additive change.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::state::AppState;

/// Id extraction rules for activity-changed payloads, tried in order.
pub const ACTIVITY_ID_RULES: &[&str] = &["/data/id", "/current/id", "/meta/id", "/activity_id", "/id"];

/// Id extraction rules for deal-changed payloads, tried in order.
pub const DEAL_ID_RULES: &[&str] = &["/data/id", "/current/id", "/meta/id", "/deal_id", "/id"];

/// First rule that yields a usable id wins.
pub fn probe_id(payload: &Value, rules: &[&str]) -> Option<i64> {
    rules
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(id_value))
}

fn id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hooks/activity", post(activity_hook))
        .route("/hooks/deal", post(deal_hook))
        .route("/sweep/{deal_id}", post(manual_sweep))
        .route("/tasks/run", post(run_tasks))
        .route("/tasks/reset", post(reset_tasks))
        .route("/diag/deal/{deal_id}", get(diag_deal))
        .route("/diag/activity/{activity_id}", get(diag_activity))
        .with_state(state)
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SecretQuery {
    #[serde(default)]
    secret: Option<String>,
}

/// Shared-secret gate: `x-webhook-secret` header or `secret` query param.
fn authorized(state: &AppState, headers: &HeaderMap, query: &SecretQuery) -> bool {
    let provided = headers
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .or(query.secret.as_deref());
    matches!(provided, Some(s) if s == state.config.webhook_secret)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "missing or invalid secret" })),
    )
        .into_response()
}

// ============================================================================
// Error mapping
// ============================================================================

struct ApiFailure(SyncError);

impl From<SyncError> for ApiFailure {
    fn from(err: SyncError) -> Self {
        ApiFailure(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Http(_) | SyncError::Api { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn activity_hook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if !authorized(&state, &headers, &query) {
        return unauthorized();
    }
    let Some(activity_id) = probe_id(&payload, ACTIVITY_ID_RULES) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no activity id in payload" })),
        )
            .into_response();
    };

    // Ack first; the upstream only needs to know we received the event.
    let engine = state.engine.clone();
    tokio::spawn(async move {
        match engine.reconcile_activity(activity_id).await {
            Ok(outcome) => log::info!(
                "activity hook {}: {}",
                activity_id,
                outcome.describe()
            ),
            Err(err) => log::error!("activity hook {}: reconcile failed: {}", activity_id, err),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "activity_id": activity_id })),
    )
        .into_response()
}

async fn deal_hook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if !authorized(&state, &headers, &query) {
        return unauthorized();
    }
    let Some(deal_id) = probe_id(&payload, DEAL_ID_RULES) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no deal id in payload" })),
        )
            .into_response();
    };

    let sweeper = state.sweeper.clone();
    tokio::spawn(async move {
        match sweeper.sweep_deal(deal_id).await {
            Ok(Some(report)) => log::info!(
                "deal hook {}: {} updated, {} skipped of {}",
                deal_id,
                report.updated,
                report.skipped,
                report.total
            ),
            Ok(None) => log::info!("deal hook {}: deal not found", deal_id),
            Err(err) => log::error!("deal hook {}: sweep failed: {}", deal_id, err),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "deal_id": deal_id })),
    )
        .into_response()
}

/// Manual sweep — runs inline and returns the aggregate report.
async fn manual_sweep(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    Path(deal_id): Path<i64>,
) -> Result<Response, ApiFailure> {
    if !authorized(&state, &headers, &query) {
        return Ok(unauthorized());
    }
    match state.sweeper.sweep_deal(deal_id).await? {
        Some(report) => Ok(Json(report).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("deal {} not found", deal_id) })),
        )
            .into_response()),
    }
}

async fn run_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    if !authorized(&state, &headers, &query) {
        return Ok(unauthorized());
    }
    let report = state.tasks.run_once().await?;
    Ok(Json(report).into_response())
}

async fn reset_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    if !authorized(&state, &headers, &query) {
        return Ok(unauthorized());
    }
    state.processed.reset().await?;
    Ok(Json(json!({ "reset": true })).into_response())
}

async fn diag_deal(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    Path(deal_id): Path<i64>,
) -> Result<Response, ApiFailure> {
    if !authorized(&state, &headers, &query) {
        return Ok(unauthorized());
    }
    match state.engine.crew_for_deal(deal_id).await? {
        Some(crew_names) => Ok(Json(json!({
            "deal_id": deal_id,
            "crew_names": crew_names,
        }))
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("deal {} not found", deal_id) })),
        )
            .into_response()),
    }
}

async fn diag_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SecretQuery>,
    headers: HeaderMap,
    Path(activity_id): Path<i64>,
) -> Result<Response, ApiFailure> {
    if !authorized(&state, &headers, &query) {
        return Ok(unauthorized());
    }
    match state.engine.type_of_activity(activity_id).await? {
        Some((type_key, type_label)) => Ok(Json(json!({
            "activity_id": activity_id,
            "type_key": type_key,
            "type_label": type_label,
        }))
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("activity {} not found", activity_id) })),
        )
            .into_response()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_v2_payload_shape() {
        let payload = json!({ "data": { "id": 10, "subject": "x" } });
        assert_eq!(probe_id(&payload, ACTIVITY_ID_RULES), Some(10));
    }

    #[test]
    fn probes_v1_payload_shape() {
        let payload = json!({ "current": { "id": 11 }, "previous": {} });
        assert_eq!(probe_id(&payload, ACTIVITY_ID_RULES), Some(11));
    }

    #[test]
    fn probes_meta_and_bare_shapes() {
        assert_eq!(
            probe_id(&json!({ "meta": { "id": "12" } }), ACTIVITY_ID_RULES),
            Some(12)
        );
        assert_eq!(probe_id(&json!({ "id": 13 }), ACTIVITY_ID_RULES), Some(13));
        assert_eq!(
            probe_id(&json!({ "deal_id": 5 }), DEAL_ID_RULES),
            Some(5)
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let payload = json!({ "data": { "id": 1 }, "current": { "id": 2 } });
        assert_eq!(probe_id(&payload, ACTIVITY_ID_RULES), Some(1));
    }

    #[test]
    fn garbage_payloads_probe_to_none() {
        assert_eq!(probe_id(&json!({}), ACTIVITY_ID_RULES), None);
        assert_eq!(probe_id(&json!({ "id": "abc" }), ACTIVITY_ID_RULES), None);
        assert_eq!(
            probe_id(&json!({ "data": { "id": null } }), ACTIVITY_ID_RULES),
            None
        );
    }

    #[test]
    fn secret_accepted_from_header_or_query() {
        let config_json = r#"{
            "api_token": "t",
            "webhook_secret": "hunter2",
            "crew_field_key": "abc"
        }"#;
        let config: crate::config::Config = serde_json::from_str(config_json).unwrap();
        let store = Arc::new(crate::store::fake::FakeStore::new());
        let mut config = config;
        config.data_dir = Some(std::env::temp_dir().join("crewsync-test-auth"));
        let state = AppState::with_store(config, store);

        let mut headers = HeaderMap::new();
        let no_secret = SecretQuery::default();
        assert!(!authorized(&state, &headers, &no_secret));

        headers.insert("x-webhook-secret", "hunter2".parse().unwrap());
        assert!(authorized(&state, &headers, &no_secret));

        headers.remove("x-webhook-secret");
        let query = SecretQuery {
            secret: Some("hunter2".to_string()),
        };
        assert!(authorized(&state, &headers, &query));

        let wrong = SecretQuery {
            secret: Some("guess".to_string()),
        };
        assert!(!authorized(&state, &headers, &wrong));
    }
}
