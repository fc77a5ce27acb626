//! crewsync — keeps Pipedrive activity subjects canonical.
//!
//! An activity's subject is a pure function of its parent deal (job
//! reference + assigned crew) and its activity type. Three trigger paths
//! converge on the same reconciliation engine: per-activity webhooks,
//! per-deal webhooks (fan-out to open children), and a drift-correcting
//! poll over recently modified deals. Writes are idempotent — a subject
//! that already matches its canonical form is never rewritten.

pub mod catalog;
pub mod config;
pub mod crew;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod filter;
pub mod pipedrive;
pub mod poller;
pub mod server;
pub mod state;
pub mod store;
pub mod sweep;
pub mod tasks;
pub mod title;

pub use config::Config;
pub use engine::{ReconcileOutcome, ReconciliationEngine};
pub use error::SyncError;
pub use state::AppState;
pub use sweep::SweepReport;
