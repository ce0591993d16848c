//! The owned set of commodity entries and its read-only projections.

pub mod contract;
pub mod entry;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use contract::{ContractRecord, ContractStatus, MissionId};
pub use entry::CommodityEntry;

/// Case-normalized commodity identifier.
///
/// Journal localisation keys (`$StructuralRegulators_Name;`) and plain names
/// (`StructuralRegulators`, `structuralregulators`) map to the same id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CommodityId(String);

impl CommodityId {
    pub fn new(raw: &str) -> Self {
        let mut s = raw.trim();
        s = s.strip_prefix('$').unwrap_or(s);
        let lower = s.to_ascii_lowercase();
        let trimmed = lower.strip_suffix("_name;").unwrap_or(&lower);
        Self(trimmed.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for CommodityId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for CommodityId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<CommodityId> for String {
    fn from(id: CommodityId) -> Self {
        id.0
    }
}

impl fmt::Display for CommodityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-only projection of one entry for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityView {
    pub id: CommodityId,
    pub total: u32,
    pub owned: u32,
    pub stolen: u32,
    pub haulage: u32,
    pub need: u32,
    pub contracts: usize,
}

impl From<&CommodityEntry> for CommodityView {
    fn from(e: &CommodityEntry) -> Self {
        Self {
            id: e.id().clone(),
            total: e.total(),
            owned: e.owned(),
            stolen: e.stolen(),
            haulage: e.haulage(),
            need: e.need(),
            contracts: e.contracts().len(),
        }
    }
}

/// Every commodity entry, keyed by id. Contracts are reached through their
/// parent entry and looked up by mission id; nothing holds references across
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<CommodityId, CommodityEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CommodityEntry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.entries.insert(entry.id().clone(), entry);
        }
        ledger.prune();
        ledger
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CommodityEntry> {
        self.entries.get(&CommodityId::new(id))
    }

    pub fn entry(&self, id: &CommodityId) -> Option<&CommodityEntry> {
        self.entries.get(id)
    }

    pub fn entry_mut(&mut self, id: &CommodityId) -> Option<&mut CommodityEntry> {
        self.entries.get_mut(id)
    }

    /// Resolve or create the entry for `id`.
    pub fn entry_or_insert(&mut self, id: &CommodityId) -> &mut CommodityEntry {
        self.entries
            .entry(id.clone())
            .or_insert_with(|| CommodityEntry::new(id.clone()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommodityEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CommodityEntry> {
        self.entries.values_mut()
    }

    /// Find which commodity holds the contract for `mission_id`.
    pub fn find_contract(&self, mission_id: MissionId) -> Option<(&CommodityId, &ContractRecord)> {
        self.entries
            .iter()
            .find_map(|(id, e)| e.contract(mission_id).map(|c| (id, c)))
    }

    pub fn contract(&self, mission_id: MissionId) -> Option<&ContractRecord> {
        self.find_contract(mission_id).map(|(_, c)| c)
    }

    pub fn reconcile_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.reconcile();
        }
    }

    /// Remove entries with nothing held, nothing owed and no contracts.
    /// Returns the ids that were dropped.
    pub fn prune(&mut self) -> Vec<CommodityId> {
        let empty: Vec<CommodityId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &empty {
            self.entries.remove(id);
        }
        empty
    }

    pub fn views(&self) -> Vec<CommodityView> {
        self.entries.values().map(CommodityView::from).collect()
    }

    /// Units physically in the hold across all commodities.
    pub fn cargo_carried(&self) -> u32 {
        self.entries
            .values()
            .fold(0u32, |acc, e| acc.saturating_add(e.total()))
    }

    /// Deterministic digest of the full ledger, used to compare states
    /// across replays.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        for entry in self.entries.values() {
            h.update(entry.id().as_str().as_bytes());
            for v in [entry.total(), entry.stolen(), entry.haulage(), entry.need()] {
                h.update(v.to_le_bytes());
            }
            for c in entry.contracts() {
                h.update(c.mission_id.to_le_bytes());
                h.update(c.status.as_str().as_bytes());
                for v in [c.amount, c.remaining, c.collected, c.delivered] {
                    h.update(v.to_le_bytes());
                }
                h.update([c.shared as u8]);
            }
        }
        hex::encode(h.finalize())
    }
}
