//! Classifier for game journal lines (one JSON object per line, keyed by
//! `"event"`).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::EventClassifier;
use crate::engine::events::*;
use crate::error::ClassifyError;
use crate::ledger::contract::kind_from_name;
use crate::ledger::{CommodityId, MissionId};

/// Limpet recipes and how many units each synthesis yields.
const LIMPET_RECIPES: &[(&str, u32)] = &[
    ("Limpet Basic", 4),
    ("Limpet Standard", 6),
    ("Limpet Premium", 8),
];
const LIMPET_COMMODITY: &str = "drones";

#[derive(Debug, Clone, Copy, Default)]
pub struct JournalClassifier;

impl JournalClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl EventClassifier for JournalClassifier {
    fn classify(&self, line: &str) -> Result<Option<InventoryEvent>, ClassifyError> {
        let value: Value = serde_json::from_str(line)?;
        let Some(name) = value.get("event").and_then(Value::as_str) else {
            return Err(ClassifyError::MissingField {
                event: "<unnamed>".to_string(),
                field: "event",
            });
        };
        let name = name.to_string();

        let event = match name.as_str() {
            "Cargo" => cargo(&name, value)?,
            "EjectCargo" => eject(&name, value)?,
            "MissionAccepted" => accepted(&name, value)?,
            "MissionCompleted" => {
                let (ts, mission_id) = mission_ref(&name, value)?;
                Some(InventoryEvent::ContractCompleted { ts, mission_id })
            }
            "MissionAbandoned" => {
                let (ts, mission_id) = mission_ref(&name, value)?;
                Some(InventoryEvent::ContractAbandoned { ts, mission_id })
            }
            "MissionFailed" => {
                let (ts, mission_id) = mission_ref(&name, value)?;
                Some(InventoryEvent::ContractFailed { ts, mission_id })
            }
            "CargoDepot" => depot(&name, value)?,
            "Synthesis" => synthesis(&name, value)?,
            "TechnologyBroker" => broker(&name, value)?,
            "Missions" => missions(&name, value)?,
            _ => None,
        };
        Ok(event)
    }
}

// =============================================================================
// Line shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CargoLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    vessel: Option<String>,
    count: Option<u32>,
    inventory: Option<Vec<InventoryItem>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InventoryItem {
    name: Option<String>,
    #[serde(rename = "MissionID")]
    mission_id: Option<MissionId>,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    stolen: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EjectLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(rename = "Type")]
    commodity: Option<String>,
    count: Option<u32>,
    #[serde(rename = "MissionID")]
    mission_id: Option<MissionId>,
    #[serde(default)]
    abandoned: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AcceptedLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(rename = "MissionID")]
    mission_id: Option<MissionId>,
    name: Option<String>,
    commodity: Option<String>,
    count: Option<u32>,
    destination_system: Option<String>,
    expiry: Option<Timestamp>,
}

#[derive(Deserialize)]
struct MissionRefLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(rename = "MissionID")]
    mission_id: Option<MissionId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DepotLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(rename = "MissionID")]
    mission_id: Option<MissionId>,
    update_type: Option<String>,
    cargo_type: Option<String>,
    count: Option<u32>,
    #[serde(rename = "StartMarketID")]
    start_market: Option<u64>,
    #[serde(rename = "EndMarketID")]
    end_market: Option<u64>,
    total_items_to_deliver: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SynthesisLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(default)]
    commodities: Vec<BrokerItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerItem {
    name: Option<String>,
    #[serde(default)]
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MissionsLine {
    #[serde(rename = "timestamp")]
    ts: Option<Timestamp>,
    #[serde(default)]
    active: Vec<MissionRefLine>,
    #[serde(default)]
    failed: Vec<MissionRefLine>,
    #[serde(default)]
    complete: Vec<MissionRefLine>,
}

// =============================================================================
// Mapping
// =============================================================================

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ClassifyError> {
    Ok(serde_json::from_value(value)?)
}

fn require<T>(value: Option<T>, event: &str, field: &'static str) -> Result<T, ClassifyError> {
    value.ok_or_else(|| ClassifyError::MissingField {
        event: event.to_string(),
        field,
    })
}

fn cargo(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: CargoLine = parse(value)?;
    let ts = require(line.ts, name, "timestamp")?;
    let vehicle = match line.vessel.as_deref() {
        Some(v) if v.eq_ignore_ascii_case("srv") => Vehicle::Srv,
        _ => Vehicle::Ship,
    };
    let mut groups = Vec::new();
    for item in require(line.inventory, name, "Inventory")? {
        let commodity = require(item.name, name, "Inventory.Name")?;
        groups.push(CargoGroup {
            commodity: CommodityId::new(&commodity),
            count: item.count,
            stolen: item.stolen,
            mission_id: item.mission_id,
        });
    }
    Ok(Some(InventoryEvent::Snapshot(FullInventorySnapshot {
        ts,
        vehicle,
        groups,
        reported_count: line.count,
    })))
}

fn eject(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: EjectLine = parse(value)?;
    Ok(Some(InventoryEvent::Ejected(UnitsEjected {
        ts: require(line.ts, name, "timestamp")?,
        commodity: CommodityId::new(&require(line.commodity, name, "Type")?),
        count: require(line.count, name, "Count")?,
        mission_id: line.mission_id,
        abandoned: line.abandoned,
    })))
}

fn accepted(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: AcceptedLine = parse(value)?;
    let mission_name = require(line.name, name, "Name")?;
    Ok(Some(InventoryEvent::ContractAccepted(ContractAccepted {
        ts: require(line.ts, name, "timestamp")?,
        mission_id: require(line.mission_id, name, "MissionID")?,
        commodity: line.commodity.map(|c| CommodityId::new(&c)),
        kind: kind_from_name(&mission_name),
        name: mission_name,
        amount: line.count.unwrap_or(0),
        origin_system: None,
        destination: line.destination_system,
        expiry: line.expiry,
    })))
}

fn mission_ref(name: &str, value: Value) -> Result<(Timestamp, MissionId), ClassifyError> {
    let line: MissionRefLine = parse(value)?;
    Ok((
        require(line.ts, name, "timestamp")?,
        require(line.mission_id, name, "MissionID")?,
    ))
}

fn depot(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: DepotLine = parse(value)?;
    let update = match require(line.update_type, name, "UpdateType")?.as_str() {
        "Collect" => DepotUpdate::Collect,
        "Deliver" => DepotUpdate::Deliver,
        // progress notices for wing missions move no cargo of ours
        _ => return Ok(None),
    };
    Ok(Some(InventoryEvent::Depot(DepotTransaction {
        ts: require(line.ts, name, "timestamp")?,
        mission_id: require(line.mission_id, name, "MissionID")?,
        commodity: CommodityId::new(&require(line.cargo_type, name, "CargoType")?),
        update,
        count: require(line.count, name, "Count")?,
        total_to_deliver: require(line.total_items_to_deliver, name, "TotalItemsToDeliver")?,
        start_market: line.start_market.filter(|id| *id != 0),
        end_market: line.end_market.filter(|id| *id != 0),
    })))
}

fn synthesis(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: SynthesisLine = parse(value)?;
    let recipe = require(line.name, name, "Name")?;
    let Some(&(_, count)) = LIMPET_RECIPES.iter().find(|(r, _)| *r == recipe) else {
        return Ok(None);
    };
    Ok(Some(InventoryEvent::Synthesized {
        ts: require(line.ts, name, "timestamp")?,
        commodity: CommodityId::new(LIMPET_COMMODITY),
        count,
    }))
}

fn broker(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: BrokerLine = parse(value)?;
    let ts = require(line.ts, name, "timestamp")?;
    let mut consumed = Vec::with_capacity(line.commodities.len());
    for item in line.commodities {
        let commodity = require(item.name, name, "Commodities.Name")?;
        consumed.push((CommodityId::new(&commodity), item.count));
    }
    Ok(Some(InventoryEvent::Broker { ts, consumed }))
}

fn missions(name: &str, value: Value) -> Result<Option<InventoryEvent>, ClassifyError> {
    let line: MissionsLine = parse(value)?;
    let ids = |refs: Vec<MissionRefLine>| -> Result<Vec<MissionId>, ClassifyError> {
        refs.into_iter()
            .map(|r| require(r.mission_id, name, "MissionID"))
            .collect()
    };
    Ok(Some(InventoryEvent::MissionLog(MissionLog {
        ts: require(line.ts, name, "timestamp")?,
        active: ids(line.active)?,
        failed: ids(line.failed)?,
        complete: ids(line.complete)?,
    })))
}
