//! Sweep — reconcile every open activity of one deal.
//!
//! Used by the deal webhook, the manual trigger, and the drift poller.
//! One activity's failure never aborts its siblings; failures are counted
//! and logged per item.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::{ReconcileOutcome, ReconciliationEngine};
use crate::error::SyncError;

/// Aggregate result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Activities considered.
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SweepReport {
    fn with_note(note: &str) -> Self {
        Self {
            note: Some(note.to_string()),
            ..Self::default()
        }
    }
}

pub struct SweepOrchestrator {
    engine: Arc<ReconciliationEngine>,
}

impl SweepOrchestrator {
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self { engine }
    }

    /// Sweep all open activities of `deal_id`. `Ok(None)` when the deal
    /// does not exist.
    pub async fn sweep_deal(&self, deal_id: i64) -> Result<Option<SweepReport>, SyncError> {
        let Some(deal) = self.engine.store().deal(deal_id).await? else {
            log::info!("sweep: deal {} not found", deal_id);
            return Ok(None);
        };

        let crew_names = self.engine.crew().names_for_field(deal.crew_field.as_ref());
        if crew_names.is_empty() {
            log::info!("sweep: deal {} has no recognized crew, nothing to rename", deal_id);
            return Ok(Some(SweepReport::with_note("no recognized crew")));
        }

        let open = self.engine.store().open_activities(deal_id).await?;
        let mut report = SweepReport {
            total: open.len(),
            ..SweepReport::default()
        };

        for activity in &open {
            match self
                .engine
                .reconcile_listed(activity, &deal, &crew_names)
                .await
            {
                Ok(ReconcileOutcome::Updated { .. }) => report.updated += 1,
                Ok(ReconcileOutcome::WriteRejected) => report.failed += 1,
                Ok(outcome) => {
                    log::debug!(
                        "sweep: deal {} activity {} skipped ({})",
                        deal_id,
                        activity.id,
                        outcome.describe()
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    log::warn!(
                        "sweep: deal {} activity {} failed: {}",
                        deal_id,
                        activity.id,
                        err
                    );
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "sweep: deal {} done — {} updated, {} skipped, {} failed of {}",
            deal_id,
            report.updated,
            report.skipped,
            report.failed,
            report.total
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;
    use crate::crew::{default_crew_table, CrewDirectory};
    use crate::filter::ChangeFilter;
    use crate::store::fake::{activity, deal, FakeStore};
    use crate::store::ActivityTypeEntry;
    use serde_json::json;

    fn sweeper(store: Arc<FakeStore>) -> SweepOrchestrator {
        let catalog = Arc::new(TypeCatalog::with_entries(vec![ActivityTypeEntry {
            label: "Demo".to_string(),
            key: "demo".to_string(),
        }]));
        let engine = Arc::new(ReconciliationEngine::new(
            store,
            catalog,
            ChangeFilter::AllowAll,
            CrewDirectory::new(default_crew_table()),
        ));
        SweepOrchestrator::new(engine)
    }

    #[tokio::test]
    async fn mixed_sweep_counts_updated_and_skipped() {
        let store = Arc::new(
            FakeStore::new()
                .with_deal(deal(5, "Smith Job", json!(50)))
                .with_activity(activity(
                    10,
                    Some(5),
                    "demo",
                    "[JOB 5] Smith Job — Demo — Crew: Hector",
                ))
                .with_activity(activity(11, Some(5), "demo", "drifted subject")),
        );
        let report = sweeper(store.clone()).sweep_deal(5).await.unwrap().unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn missing_deal_is_none() {
        let store = Arc::new(FakeStore::new());
        assert!(sweeper(store).sweep_deal(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn crewless_deal_reports_zero_with_reason() {
        let store = Arc::new(
            FakeStore::new()
                .with_deal(deal(5, "Smith Job", json!([])))
                .with_activity(activity(10, Some(5), "demo", "drifted")),
        );
        let report = sweeper(store.clone()).sweep_deal(5).await.unwrap().unwrap();
        assert_eq!(report, SweepReport::with_note("no recognized crew"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn rejected_write_does_not_abort_siblings() {
        let store = Arc::new(
            FakeStore::new()
                .with_deal(deal(5, "Smith Job", json!(50)))
                .with_activity(activity(10, Some(5), "demo", "drifted a"))
                .with_activity(activity(11, Some(5), "demo", "drifted b")),
        );
        *store.reject_writes.lock().unwrap() = true;
        let report = sweeper(store).sweep_deal(5).await.unwrap().unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.total, 2);
    }

    #[tokio::test]
    async fn done_activities_are_not_considered() {
        let mut closed = activity(12, Some(5), "demo", "drifted");
        closed.done = true;
        let store = Arc::new(
            FakeStore::new()
                .with_deal(deal(5, "Smith Job", json!(50)))
                .with_activity(closed),
        );
        let report = sweeper(store).sweep_deal(5).await.unwrap().unwrap();
        assert_eq!(report.total, 0);
    }
}
