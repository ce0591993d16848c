//! Raw telemetry lines -> typed inventory events.
//!
//! The reconciler never sees raw text. A classifier either produces one
//! event, says the line is irrelevant (`Ok(None)`), or reports why a line it
//! recognised could not be read.

pub mod journal;

pub use journal::JournalClassifier;

use crate::engine::events::InventoryEvent;
use crate::error::ClassifyError;

pub trait EventClassifier {
    fn classify(&self, line: &str) -> Result<Option<InventoryEvent>, ClassifyError>;
}
