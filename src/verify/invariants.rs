use std::collections::HashSet;

use crate::ledger::{CommodityEntry, Ledger};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{commodity}: {msg}")]
pub struct InvariantViolation {
    pub commodity: String,
    pub msg: String,
}

fn violation(entry: &CommodityEntry, msg: impl Into<String>) -> InvariantViolation {
    InvariantViolation {
        commodity: entry.id().to_string(),
        msg: msg.into(),
    }
}

pub fn assert_conservation(entry: &CommodityEntry) -> Result<(), InvariantViolation> {
    let parts = entry.owned() as u64 + entry.stolen() as u64 + entry.haulage() as u64;
    if parts != entry.total() as u64 {
        return Err(violation(
            entry,
            format!(
                "total {} != owned {} + stolen {} + haulage {}",
                entry.total(),
                entry.owned(),
                entry.stolen(),
                entry.haulage()
            ),
        ));
    }
    Ok(())
}

pub fn assert_derived_consistency(entry: &CommodityEntry) -> Result<(), InvariantViolation> {
    let haulage: u64 = entry.contracts().iter().map(|c| c.collected as u64).sum();
    if haulage != entry.haulage() as u64 {
        return Err(violation(entry, "haulage drifted from contract collections"));
    }
    let need: u64 = entry.contracts().iter().map(|c| c.remaining as u64).sum();
    if need != entry.need() as u64 {
        return Err(violation(entry, "need drifted from contract remaining"));
    }
    for c in entry.contracts().iter().filter(|c| c.is_active()) {
        let expected = c.amount.saturating_sub(c.collected).saturating_sub(c.delivered);
        if c.remaining != expected {
            return Err(violation(
                entry,
                format!("mission {} remaining {} != {}", c.mission_id, c.remaining, expected),
            ));
        }
    }
    Ok(())
}

/// Every check that must hold for a committed ledger.
pub fn check_ledger(ledger: &Ledger) -> Result<(), InvariantViolation> {
    let mut seen = HashSet::new();
    for entry in ledger.entries() {
        assert_conservation(entry)?;
        assert_derived_consistency(entry)?;
        if entry.is_empty() {
            return Err(violation(entry, "empty entry was not pruned"));
        }
        for c in entry.contracts() {
            if !seen.insert(c.mission_id) {
                return Err(violation(entry, format!("mission {} recorded twice", c.mission_id)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CommodityId, ContractRecord};

    #[test]
    fn test_reconciled_ledger_passes() {
        let mut ledger = Ledger::new();
        let e = ledger.entry_or_insert(&CommodityId::new("gold"));
        e.add_units(5);
        e.insert_contract(ContractRecord::accepted(1, "n", "k", 3));
        ledger.reconcile_all();
        assert!(check_ledger(&ledger).is_ok());
    }

    #[test]
    fn test_unreconciled_entry_is_flagged() {
        let mut ledger = Ledger::new();
        let e = ledger.entry_or_insert(&CommodityId::new("gold"));
        e.add_units(5);
        let err = check_ledger(&ledger).unwrap_err();
        assert_eq!(err.commodity, "gold");
    }

    #[test]
    fn test_duplicate_mission_across_entries_is_flagged() {
        let mut ledger = Ledger::new();
        for id in ["gold", "silver"] {
            ledger
                .entry_or_insert(&CommodityId::new(id))
                .insert_contract(ContractRecord::accepted(9, "n", "k", 1));
        }
        ledger.reconcile_all();
        let err = check_ledger(&ledger).unwrap_err();
        assert!(err.msg.contains("recorded twice"));
    }
}
