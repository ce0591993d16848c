//! Cargo hold ledger reconciled against delivery and salvage contracts.
//!
//! Journal lines are classified into [`InventoryEvent`]s, applied by the
//! single-writer [`Reconciler`], and persisted through [`persist`].

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod persist;
pub mod verify;

pub use classify::{EventClassifier, JournalClassifier};
pub use engine::{InventoryEvent, Outcome, ReconcileOutput, Reconciler, ReconcilerConfig};
pub use error::{ClassifyError, EngineError, EventError, LedgerError};
pub use ledger::{CommodityEntry, CommodityId, CommodityView, ContractRecord, ContractStatus, Ledger, MissionId};
