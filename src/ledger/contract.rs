//! Per-mission contract records nested under a commodity entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MissionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    Active,
    #[serde(alias = "Complete")]
    Completed,
    Failed,
}

impl ContractStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContractStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "Active",
            ContractStatus::Completed => "Completed",
            ContractStatus::Failed => "Failed",
        }
    }
}

/// Requested lifecycle transition for a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Complete,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub mission_id: MissionId,
    pub from: ContractStatus,
}

/// A delivery/collection obligation keyed by mission id.
///
/// `collected` counts units currently held under the contract (they show up
/// as haulage on the parent entry); `delivered` counts units already handed
/// over. While the record is Active, `remaining` is always
/// `amount - collected - delivered`, saturating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractRecord {
    pub mission_id: MissionId,
    pub name: String,
    pub kind: String,
    pub status: ContractStatus,
    pub origin_system: Option<String>,
    pub source_system: Option<String>,
    pub source_body: Option<String>,
    pub destination: Option<String>,
    pub amount: u32,
    pub remaining: u32,
    pub collected: u32,
    pub delivered: u32,
    pub start_market: Option<u64>,
    pub end_market: Option<u64>,
    pub expiry: Option<DateTime<Utc>>,
    pub shared: bool,
}

pub const UNKNOWN_NAME: &str = "Unknown";

impl ContractRecord {
    /// Contract observed through its acceptance event.
    pub fn accepted(mission_id: MissionId, name: &str, kind: &str, amount: u32) -> Self {
        Self {
            mission_id,
            name: name.to_string(),
            kind: kind.to_string(),
            status: ContractStatus::Active,
            origin_system: None,
            source_system: None,
            source_body: None,
            destination: None,
            amount,
            remaining: amount,
            collected: 0,
            delivered: 0,
            start_market: None,
            end_market: None,
            expiry: None,
            shared: false,
        }
    }

    /// Contract reconstructed from cargo or depot telemetry without ever
    /// seeing its acceptance.
    pub fn synthesized(mission_id: MissionId, amount: u32) -> Self {
        Self {
            shared: true,
            ..Self::accepted(mission_id, UNKNOWN_NAME, UNKNOWN_NAME, amount)
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// Shared record that has seen depot traffic. Such contracts belong to
    /// wing or community deliveries and never show up in the personal
    /// mission log.
    pub fn is_depot_shared(&self) -> bool {
        self.shared && (self.start_market.is_some() || self.end_market.is_some())
    }

    /// Recompute `remaining` from the counters. Flagged (terminal) records
    /// keep their last value until they are pruned.
    pub fn refresh(&mut self) {
        if self.is_active() {
            self.remaining = self
                .amount
                .saturating_sub(self.collected)
                .saturating_sub(self.delivered);
        }
    }

    /// Units taken out of `collected`, at most `count`.
    pub fn release(&mut self, count: u32) -> u32 {
        let taken = count.min(self.collected);
        self.collected -= taken;
        self.refresh();
        taken
    }

    pub fn record_markets(&mut self, start: Option<u64>, end: Option<u64>) {
        if let Some(id) = start.filter(|id| *id != 0) {
            self.start_market = Some(id);
        }
        if let Some(id) = end.filter(|id| *id != 0) {
            self.end_market = Some(id);
        }
    }

    /// `Active -> {Completed, Failed}`; anything from a terminal state is
    /// rejected.
    pub fn transition(&mut self, to: Transition) -> Result<ContractStatus, TransitionRejected> {
        match (self.status, to) {
            (ContractStatus::Active, Transition::Complete) => {
                self.status = ContractStatus::Completed;
                Ok(self.status)
            }
            (ContractStatus::Active, Transition::Fail) => {
                self.status = ContractStatus::Failed;
                Ok(self.status)
            }
            (from, _) => Err(TransitionRejected {
                mission_id: self.mission_id,
                from,
            }),
        }
    }
}

/// Mission names look like `Mission_Salvage_Planet`; the kind is the second
/// token.
pub fn kind_from_name(name: &str) -> String {
    name.split('_')
        .nth(1)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_tracks_collected_and_delivered() {
        let mut c = ContractRecord::accepted(1, "Mission_Delivery", "Delivery", 10);
        c.collected = 4;
        c.refresh();
        assert_eq!(c.remaining, 6);
        c.collected = 0;
        c.delivered = 4;
        c.refresh();
        assert_eq!(c.remaining, 6);
        c.delivered = 12;
        c.refresh();
        assert_eq!(c.remaining, 0);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut c = ContractRecord::accepted(7, "n", "k", 3);
        assert_eq!(c.transition(Transition::Fail), Ok(ContractStatus::Failed));
        let err = c.transition(Transition::Complete).unwrap_err();
        assert_eq!(err.from, ContractStatus::Failed);
        assert_eq!(err.mission_id, 7);
    }

    #[test]
    fn test_flagged_record_freezes_remaining() {
        let mut c = ContractRecord::accepted(1, "n", "k", 5);
        c.collected = 3;
        c.refresh();
        c.transition(Transition::Fail).unwrap();
        assert_eq!(c.release(2), 2);
        assert_eq!(c.remaining, 2);
        assert_eq!(c.collected, 1);
    }

    #[test]
    fn test_zero_market_ids_are_ignored() {
        let mut c = ContractRecord::synthesized(1, 10);
        c.record_markets(Some(0), Some(3224777216));
        assert_eq!(c.start_market, None);
        assert_eq!(c.end_market, Some(3224777216));
        assert!(c.is_depot_shared());
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(kind_from_name("Mission_Salvage_Planet"), "Salvage");
        assert_eq!(kind_from_name("Mission_Delivery_Boom"), "Delivery");
        assert_eq!(kind_from_name("Courier"), "Unknown");
    }
}
