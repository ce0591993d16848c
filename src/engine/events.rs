//! Typed telemetry events consumed by the reconciler.
//!
//! The set is closed: every kind the engine reacts to is a variant of
//! [`InventoryEvent`], and the reconciler matches on it exhaustively.
//! Anything else is dropped by the classifier before it gets here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::ledger::{CommodityId, MissionId};

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vehicle {
    #[default]
    Ship,
    Srv,
}

/// One line of the authoritative inventory report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoGroup {
    pub commodity: CommodityId,
    pub count: u32,
    /// How many of `count` carry the stolen tag.
    pub stolen: u32,
    pub mission_id: Option<MissionId>,
}

impl CargoGroup {
    pub fn new(commodity: &str, count: u32) -> Self {
        Self {
            commodity: CommodityId::new(commodity),
            count,
            stolen: 0,
            mission_id: None,
        }
    }

    pub fn stolen(mut self, stolen: u32) -> Self {
        self.stolen = stolen;
        self
    }

    pub fn for_mission(mut self, mission_id: MissionId) -> Self {
        self.mission_id = Some(mission_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullInventorySnapshot {
    pub ts: Timestamp,
    pub vehicle: Vehicle,
    pub groups: Vec<CargoGroup>,
    /// Total the source claims to carry, when it reports one.
    pub reported_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitsEjected {
    pub ts: Timestamp,
    pub commodity: CommodityId,
    pub count: u32,
    pub mission_id: Option<MissionId>,
    pub abandoned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAccepted {
    pub ts: Timestamp,
    pub mission_id: MissionId,
    /// Absent for contract kinds that carry no cargo.
    pub commodity: Option<CommodityId>,
    pub name: String,
    pub kind: String,
    pub amount: u32,
    pub origin_system: Option<String>,
    pub destination: Option<String>,
    pub expiry: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepotUpdate {
    Collect,
    Deliver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotTransaction {
    pub ts: Timestamp,
    pub mission_id: MissionId,
    pub commodity: CommodityId,
    pub update: DepotUpdate,
    pub count: u32,
    pub total_to_deliver: u32,
    pub start_market: Option<u64>,
    pub end_market: Option<u64>,
}

/// Startup listing of the personal mission log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionLog {
    pub ts: Timestamp,
    pub active: Vec<MissionId>,
    pub failed: Vec<MissionId>,
    pub complete: Vec<MissionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InventoryEvent {
    Snapshot(FullInventorySnapshot),
    Ejected(UnitsEjected),
    ContractAccepted(ContractAccepted),
    ContractCompleted { ts: Timestamp, mission_id: MissionId },
    ContractAbandoned { ts: Timestamp, mission_id: MissionId },
    ContractFailed { ts: Timestamp, mission_id: MissionId },
    Depot(DepotTransaction),
    Synthesized { ts: Timestamp, commodity: CommodityId, count: u32 },
    Broker { ts: Timestamp, consumed: Vec<(CommodityId, u32)> },
    MissionLog(MissionLog),
}

impl InventoryEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            InventoryEvent::Snapshot(e) => e.ts,
            InventoryEvent::Ejected(e) => e.ts,
            InventoryEvent::ContractAccepted(e) => e.ts,
            InventoryEvent::ContractCompleted { ts, .. }
            | InventoryEvent::ContractAbandoned { ts, .. }
            | InventoryEvent::ContractFailed { ts, .. }
            | InventoryEvent::Synthesized { ts, .. }
            | InventoryEvent::Broker { ts, .. } => *ts,
            InventoryEvent::Depot(e) => e.ts,
            InventoryEvent::MissionLog(e) => e.ts,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InventoryEvent::Snapshot(_) => "snapshot",
            InventoryEvent::Ejected(_) => "ejected",
            InventoryEvent::ContractAccepted(_) => "contract_accepted",
            InventoryEvent::ContractCompleted { .. } => "contract_completed",
            InventoryEvent::ContractAbandoned { .. } => "contract_abandoned",
            InventoryEvent::ContractFailed { .. } => "contract_failed",
            InventoryEvent::Depot(_) => "depot",
            InventoryEvent::Synthesized { .. } => "synthesized",
            InventoryEvent::Broker { .. } => "broker",
            InventoryEvent::MissionLog(_) => "mission_log",
        }
    }

    /// Reject events whose required fields are missing or unusable.
    pub fn validate(&self) -> Result<(), EventError> {
        let event = self.kind();
        let commodity = |id: &CommodityId| {
            if id.is_empty() {
                Err(EventError::EmptyCommodity { event })
            } else {
                Ok(())
            }
        };
        let mission = |id: MissionId| {
            if id == 0 {
                Err(EventError::MissingMission { event })
            } else {
                Ok(())
            }
        };

        match self {
            InventoryEvent::Snapshot(e) => e.groups.iter().try_for_each(|g| {
                commodity(&g.commodity)?;
                g.mission_id.map_or(Ok(()), mission)
            }),
            InventoryEvent::Ejected(e) => {
                commodity(&e.commodity)?;
                e.mission_id.map_or(Ok(()), mission)
            }
            InventoryEvent::ContractAccepted(e) => mission(e.mission_id),
            InventoryEvent::ContractCompleted { mission_id, .. }
            | InventoryEvent::ContractAbandoned { mission_id, .. }
            | InventoryEvent::ContractFailed { mission_id, .. } => mission(*mission_id),
            InventoryEvent::Depot(e) => {
                mission(e.mission_id)?;
                commodity(&e.commodity)?;
                if e.total_to_deliver == 0 {
                    return Err(EventError::ZeroQuantity {
                        event,
                        field: "total_to_deliver",
                    });
                }
                Ok(())
            }
            InventoryEvent::Synthesized { commodity: id, .. } => commodity(id),
            InventoryEvent::Broker { consumed, .. } => {
                consumed.iter().try_for_each(|(id, _)| commodity(id))
            }
            InventoryEvent::MissionLog(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        DateTime::parse_from_rfc3339("2018-08-26T02:55:10Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_validate_rejects_empty_commodity() {
        let event = InventoryEvent::Synthesized {
            ts: ts(),
            commodity: CommodityId::new(" "),
            count: 4,
        };
        assert_eq!(
            event.validate(),
            Err(EventError::EmptyCommodity { event: "synthesized" })
        );
    }

    #[test]
    fn test_validate_rejects_zero_depot_total() {
        let event = InventoryEvent::Depot(DepotTransaction {
            ts: ts(),
            mission_id: 200,
            commodity: CommodityId::new("tantalum"),
            update: DepotUpdate::Collect,
            count: 5,
            total_to_deliver: 0,
            start_market: None,
            end_market: None,
        });
        assert!(matches!(
            event.validate(),
            Err(EventError::ZeroQuantity { field: "total_to_deliver", .. })
        ));
    }

    #[test]
    fn test_validate_accepts_snapshot() {
        let event = InventoryEvent::Snapshot(FullInventorySnapshot {
            ts: ts(),
            vehicle: Vehicle::Ship,
            groups: vec![CargoGroup::new("gold", 3).for_mission(7)],
            reported_count: Some(3),
        });
        assert!(event.validate().is_ok());
        assert_eq!(event.timestamp(), ts());
    }
}
