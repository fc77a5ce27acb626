//! Long-lived application state.
//!
//! One instance owns every piece of shared mutable state (type catalog,
//! poll cursor, processed-id set) and is handed to trigger handlers as an
//! `Arc` — no ambient module-level statics, so tests can run multiple
//! independent instances.

use std::sync::Arc;

use crate::catalog::TypeCatalog;
use crate::config::Config;
use crate::crew::CrewDirectory;
use crate::dedup::ProcessedIdSet;
use crate::engine::ReconciliationEngine;
use crate::error::SyncError;
use crate::filter::ChangeFilter;
use crate::pipedrive::PipedriveClient;
use crate::poller::DriftPoller;
use crate::store::RecordStore;
use crate::sweep::SweepOrchestrator;
use crate::tasks::DerivedTaskRunner;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub catalog: Arc<TypeCatalog>,
    pub filter: ChangeFilter,
    pub engine: Arc<ReconciliationEngine>,
    pub sweeper: Arc<SweepOrchestrator>,
    pub poller: Arc<DriftPoller>,
    pub tasks: DerivedTaskRunner,
    pub processed: Arc<ProcessedIdSet>,
}

impl AppState {
    /// Production wiring against the real Pipedrive client.
    pub fn new(config: Config) -> Result<Self, SyncError> {
        let store: Arc<dyn RecordStore> = Arc::new(PipedriveClient::new(&config)?);
        Ok(Self::with_store(config, store))
    }

    /// Wiring with an injected store (tests).
    pub fn with_store(config: Config, store: Arc<dyn RecordStore>) -> Self {
        let catalog = Arc::new(TypeCatalog::new());
        let crew = CrewDirectory::new(config.crew_map.clone());
        let filter = ChangeFilter::from_config(&config.rename_policy);
        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            catalog.clone(),
            filter.clone(),
            crew.clone(),
        ));
        let sweeper = Arc::new(SweepOrchestrator::new(engine.clone()));
        let poller = Arc::new(DriftPoller::new(store.clone(), sweeper.clone(), &config.poll));
        let processed = Arc::new(ProcessedIdSet::load(&config.data_dir()));
        let tasks = DerivedTaskRunner::new(
            store.clone(),
            catalog.clone(),
            crew,
            processed.clone(),
            config.poll.page_size,
        );

        Self {
            config,
            store,
            catalog,
            filter,
            engine,
            sweeper,
            poller,
            tasks,
            processed,
        }
    }
}
