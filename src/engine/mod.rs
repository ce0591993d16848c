//! Event-driven reconciliation of the cargo hold against open contracts.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Journal     │────►│  Classifier  │────►│  Reconciler  │
//! │  (raw lines) │     │  (typed evt) │     │  (one writer)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │  Snapshot    │◄────│    Ledger    │
//!                      │  codec       │     │ (fingerprint)│
//!                      └──────────────┘     └──────────────┘
//! ```

pub mod events;
pub mod reconciler;

pub use events::InventoryEvent;
pub use reconciler::{Outcome, ReconcileOutput, Reconciler, ReconcilerConfig};
