//! Reconciliation engine — one unit of work: fetch, compare, maybe write.
//!
//! The step order is load-bearing: the type-scope check runs before the
//! deal fetch (the activity carries its own type key, saving a round trip
//! for out-of-scope types), and the canonical comparison short-circuits
//! no-op writes so repeated triggers against unchanged state never touch
//! the store. At most one write per call.

use std::sync::Arc;

use crate::catalog::TypeCatalog;
use crate::crew::CrewDirectory;
use crate::error::SyncError;
use crate::filter::ChangeFilter;
use crate::store::{Activity, Deal, RecordStore};
use crate::title;

/// What one reconcile call did. Skips are normal outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Subject was drifted; one write issued and accepted.
    Updated { subject: String },
    /// Subject already matches the canonical form.
    AlreadyCanonical,
    /// Activity type not covered by the rename policy.
    OutOfScope,
    /// Activity has no parent deal link.
    NoParentLink,
    /// Deal has no recognized crew assignment.
    NoCrew,
    ActivityNotFound,
    DealNotFound,
    /// Store answered the write with success=false.
    WriteRejected,
}

impl ReconcileOutcome {
    pub fn wrote(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated { .. })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ReconcileOutcome::Updated { .. } => "updated",
            ReconcileOutcome::AlreadyCanonical => "already canonical",
            ReconcileOutcome::OutOfScope => "type out of scope",
            ReconcileOutcome::NoParentLink => "no deal link",
            ReconcileOutcome::NoCrew => "no recognized crew",
            ReconcileOutcome::ActivityNotFound => "activity not found",
            ReconcileOutcome::DealNotFound => "deal not found",
            ReconcileOutcome::WriteRejected => "write rejected",
        }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn RecordStore>,
    catalog: Arc<TypeCatalog>,
    filter: ChangeFilter,
    crew: CrewDirectory,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: Arc<TypeCatalog>,
        filter: ChangeFilter,
        crew: CrewDirectory,
    ) -> Self {
        Self {
            store,
            catalog,
            filter,
            crew,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn crew(&self) -> &CrewDirectory {
        &self.crew
    }

    /// Reconcile a single activity by id (webhook / manual path).
    pub async fn reconcile_activity(
        &self,
        activity_id: i64,
    ) -> Result<ReconcileOutcome, SyncError> {
        let Some(activity) = self.store.activity(activity_id).await? else {
            return Ok(ReconcileOutcome::ActivityNotFound);
        };
        let Some(deal_id) = activity.deal_id else {
            return Ok(ReconcileOutcome::NoParentLink);
        };
        if !self.filter.in_scope(&activity.type_key, &self.catalog) {
            return Ok(ReconcileOutcome::OutOfScope);
        }
        let Some(deal) = self.store.deal(deal_id).await? else {
            return Ok(ReconcileOutcome::DealNotFound);
        };
        let crew_names = self.crew.names_for_field(deal.crew_field.as_ref());
        if crew_names.is_empty() {
            return Ok(ReconcileOutcome::NoCrew);
        }
        self.apply(&activity, &deal, &crew_names).await
    }

    /// Steps for an activity already in hand with its deal and resolved
    /// crew (sweep path — no redundant fetches).
    pub async fn reconcile_listed(
        &self,
        activity: &Activity,
        deal: &Deal,
        crew_names: &[String],
    ) -> Result<ReconcileOutcome, SyncError> {
        if !self.filter.in_scope(&activity.type_key, &self.catalog) {
            return Ok(ReconcileOutcome::OutOfScope);
        }
        self.apply(activity, deal, crew_names).await
    }

    async fn apply(
        &self,
        activity: &Activity,
        deal: &Deal,
        crew_names: &[String],
    ) -> Result<ReconcileOutcome, SyncError> {
        let label = self.catalog.label_of(&activity.type_key);
        let canonical = title::build(deal, &label, crew_names);

        if activity.subject.trim() == canonical {
            return Ok(ReconcileOutcome::AlreadyCanonical);
        }

        if self.store.update_subject(activity.id, &canonical).await? {
            log::info!(
                "activity {}: subject updated to \"{}\"",
                activity.id,
                canonical
            );
            Ok(ReconcileOutcome::Updated { subject: canonical })
        } else {
            log::warn!("activity {}: store rejected subject update", activity.id);
            Ok(ReconcileOutcome::WriteRejected)
        }
    }

    /// Diagnostic read path: resolved crew names for a deal. Never writes.
    pub async fn crew_for_deal(&self, deal_id: i64) -> Result<Option<Vec<String>>, SyncError> {
        let Some(deal) = self.store.deal(deal_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.crew.names_for_field(deal.crew_field.as_ref())))
    }

    /// Diagnostic read path: (type key, resolved label) for an activity.
    pub async fn type_of_activity(
        &self,
        activity_id: i64,
    ) -> Result<Option<(String, String)>, SyncError> {
        let Some(activity) = self.store.activity(activity_id).await? else {
            return Ok(None);
        };
        let label = self.catalog.label_of(&activity.type_key);
        Ok(Some((activity.type_key, label)))
    }
}
