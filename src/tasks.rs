//! Derived-task creation — one Moisture Check activity per eligible deal.
//!
//! A deal is eligible when its crew field resolves to at least one known
//! crew name. Creation is idempotent across runs and restarts via the
//! persisted [`ProcessedIdSet`]; a rejected create is *not* recorded, so
//! it is retried on the next pass.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::catalog::TypeCatalog;
use crate::crew::CrewDirectory;
use crate::dedup::ProcessedIdSet;
use crate::error::SyncError;
use crate::store::{NewActivity, RecordStore};
use crate::title;

/// Type key of the derived follow-up activity.
pub const DERIVED_TYPE_KEY: &str = "moisture_check_pickup";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskRunReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Deals considered.
    pub total: usize,
}

pub struct DerivedTaskRunner {
    store: Arc<dyn RecordStore>,
    catalog: Arc<TypeCatalog>,
    crew: CrewDirectory,
    processed: Arc<ProcessedIdSet>,
    page_size: usize,
}

impl DerivedTaskRunner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: Arc<TypeCatalog>,
        crew: CrewDirectory,
        processed: Arc<ProcessedIdSet>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            catalog,
            crew,
            processed,
            page_size,
        }
    }

    /// One full pass over all deals.
    pub async fn run_once(&self) -> Result<TaskRunReport, SyncError> {
        let mut report = TaskRunReport::default();
        let mut start = 0;

        loop {
            let page = self.store.deals_page(start, self.page_size).await?;
            if page.deals.is_empty() {
                break;
            }

            for deal in &page.deals {
                report.total += 1;

                let crew_names = self.crew.names_for_field(deal.crew_field.as_ref());
                if crew_names.is_empty() {
                    report.skipped += 1;
                    continue;
                }
                if self.processed.contains(deal.id).await {
                    log::debug!("tasks: deal {} already has a derived task", deal.id);
                    report.skipped += 1;
                    continue;
                }

                let label = self.catalog.label_of(DERIVED_TYPE_KEY);
                let task = NewActivity {
                    subject: title::build(deal, &label, &crew_names),
                    type_key: DERIVED_TYPE_KEY.to_string(),
                    deal_id: deal.id,
                    due_date: Utc::now().date_naive(),
                };

                if self.store.create_activity(&task).await? {
                    self.processed.insert(deal.id).await?;
                    report.created += 1;
                    log::info!("tasks: created \"{}\" for deal {}", task.subject, deal.id);
                } else {
                    // Not recorded as processed — retried next run.
                    log::warn!("tasks: store rejected create for deal {}", deal.id);
                    report.failed += 1;
                }
            }

            if !page.more || page.deals.len() < self.page_size {
                break;
            }
            start += self.page_size;
        }

        log::info!(
            "tasks: {} created, {} skipped, {} failed of {}",
            report.created,
            report.skipped,
            report.failed,
            report.total
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::default_crew_table;
    use crate::store::fake::{deal, FakeStore};
    use crate::store::ActivityTypeEntry;
    use serde_json::json;

    fn runner(store: Arc<FakeStore>, processed: Arc<ProcessedIdSet>) -> DerivedTaskRunner {
        let catalog = Arc::new(TypeCatalog::with_entries(vec![ActivityTypeEntry {
            label: "Moisture Check/Pickup".to_string(),
            key: DERIVED_TYPE_KEY.to_string(),
        }]));
        DerivedTaskRunner::new(
            store,
            catalog,
            CrewDirectory::new(default_crew_table()),
            processed,
            100,
        )
    }

    #[tokio::test]
    async fn creates_once_per_eligible_deal() {
        let dir = tempfile::tempdir().unwrap();
        let processed = Arc::new(ProcessedIdSet::load(dir.path()));
        let store = Arc::new(
            FakeStore::new()
                .with_deal(deal(5, "Smith Job", json!(50)))
                .with_deal(deal(6, "Crewless Job", json!(null))),
        );
        let runner = runner(store.clone(), processed.clone());

        let report = runner.run_once().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 2);

        let created = store.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].deal_id, 5);
        assert_eq!(created[0].type_key, DERIVED_TYPE_KEY);
        assert_eq!(
            created[0].subject,
            "[JOB 5] Smith Job — Moisture Check/Pickup — Crew: Hector"
        );

        // Second pass: nothing new.
        let report = runner.run_once().await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(store.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reset_allows_recreation() {
        let dir = tempfile::tempdir().unwrap();
        let processed = Arc::new(ProcessedIdSet::load(dir.path()));
        let store = Arc::new(FakeStore::new().with_deal(deal(5, "Smith Job", json!(50))));
        let runner = runner(store.clone(), processed.clone());

        runner.run_once().await.unwrap();
        processed.reset().await.unwrap();
        let report = runner.run_once().await.unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(store.created.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejected_create_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let processed = Arc::new(ProcessedIdSet::load(dir.path()));
        let store = Arc::new(FakeStore::new().with_deal(deal(5, "Smith Job", json!(50))));
        *store.reject_writes.lock().unwrap() = true;
        let runner = runner(store.clone(), processed.clone());

        let report = runner.run_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!processed.contains(5).await);

        *store.reject_writes.lock().unwrap() = false;
        let report = runner.run_once().await.unwrap();
        assert_eq!(report.created, 1);
    }
}
