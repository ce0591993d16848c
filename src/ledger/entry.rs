//! Per-commodity aggregate with derived quantities.

use serde::Serialize;

use super::contract::{ContractRecord, MissionId};
use super::CommodityId;

/// Aggregate for one commodity.
///
/// `total` and `stolen` are stored; `haulage`, `owned` and `need` are derived
/// by [`CommodityEntry::reconcile`] and never adjusted on their own, so
/// `total == owned + stolen + haulage` holds whenever a mutation is followed
/// by a reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityEntry {
    id: CommodityId,
    total: u32,
    stolen: u32,
    haulage: u32,
    owned: u32,
    need: u32,
    contracts: Vec<ContractRecord>,
}

impl CommodityEntry {
    pub fn new(id: CommodityId) -> Self {
        Self {
            id,
            total: 0,
            stolen: 0,
            haulage: 0,
            owned: 0,
            need: 0,
            contracts: Vec::new(),
        }
    }

    /// Rebuild an entry from stored fields. Derived values are recomputed.
    pub fn restore(id: CommodityId, total: u32, stolen: u32, contracts: Vec<ContractRecord>) -> Self {
        let mut entry = Self::new(id);
        entry.total = total;
        entry.stolen = stolen;
        for contract in contracts {
            entry.insert_contract(contract);
        }
        entry.reconcile();
        entry
    }

    pub fn id(&self) -> &CommodityId {
        &self.id
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn stolen(&self) -> u32 {
        self.stolen
    }

    pub fn haulage(&self) -> u32 {
        self.haulage
    }

    pub fn owned(&self) -> u32 {
        self.owned
    }

    pub fn need(&self) -> u32 {
        self.need
    }

    pub fn contracts(&self) -> &[ContractRecord] {
        &self.contracts
    }

    pub fn contracts_mut(&mut self) -> impl Iterator<Item = &mut ContractRecord> {
        self.contracts.iter_mut()
    }

    pub fn contract(&self, mission_id: MissionId) -> Option<&ContractRecord> {
        self.contracts.iter().find(|c| c.mission_id == mission_id)
    }

    pub fn contract_mut(&mut self, mission_id: MissionId) -> Option<&mut ContractRecord> {
        self.contracts.iter_mut().find(|c| c.mission_id == mission_id)
    }

    /// Insert a contract, replacing any record with the same mission id in
    /// place so ordering is kept.
    pub fn insert_contract(&mut self, mut contract: ContractRecord) {
        contract.refresh();
        match self.contract_mut(contract.mission_id) {
            Some(slot) => *slot = contract,
            None => self.contracts.push(contract),
        }
    }

    pub fn remove_contract(&mut self, mission_id: MissionId) -> Option<ContractRecord> {
        let idx = self.contracts.iter().position(|c| c.mission_id == mission_id)?;
        Some(self.contracts.remove(idx))
    }

    /// Drop every record that is no longer Active and return them.
    pub fn prune_terminal(&mut self) -> Vec<ContractRecord> {
        let (terminal, active): (Vec<_>, Vec<_>) =
            self.contracts.drain(..).partition(|c| c.status.is_terminal());
        self.contracts = active;
        terminal
    }

    pub fn add_units(&mut self, count: u32) {
        self.total = self.total.saturating_add(count);
    }

    pub fn add_stolen(&mut self, count: u32) {
        self.stolen = self.stolen.saturating_add(count);
    }

    /// Remove up to `count` freely owned units. Returns how many were taken.
    pub fn take_owned(&mut self, count: u32) -> u32 {
        let taken = count.min(self.owned);
        self.total -= taken;
        self.owned -= taken;
        taken
    }

    /// Remove up to `count` stolen units. Returns how many were taken.
    pub fn take_stolen(&mut self, count: u32) -> u32 {
        let taken = count.min(self.stolen).min(self.total);
        self.total -= taken;
        self.stolen -= taken;
        taken
    }

    /// Remove units that were earmarked against a contract and have already
    /// been released from it.
    pub fn take_hauled(&mut self, count: u32) {
        self.total = self.total.saturating_sub(count);
    }

    /// Forget every physically held unit; contracts keep their obligations.
    pub fn vacate(&mut self) {
        self.total = 0;
        self.stolen = 0;
        for contract in self.contracts.iter_mut().filter(|c| c.is_active()) {
            contract.collected = 0;
        }
    }

    /// Recompute derived quantities and clamp stored ones so conservation
    /// holds.
    pub fn reconcile(&mut self) {
        for contract in &mut self.contracts {
            contract.refresh();
        }
        self.haulage = self
            .contracts
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.collected));
        self.need = self
            .contracts
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.remaining));
        // earmarked units are physically present by definition
        if self.haulage > self.total {
            self.total = self.haulage;
        }
        self.stolen = self.stolen.min(self.total - self.haulage);
        self.owned = self.total - self.stolen - self.haulage;
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0 && self.need == 0 && self.contracts.is_empty()
    }
}
