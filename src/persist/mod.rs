//! Durable storage for the ledger between runs.

pub mod snapshot;

pub use snapshot::{decode, encode, load, save};
