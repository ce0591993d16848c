//! JSON snapshot of the ledger.
//!
//! Only stored quantities are written; `haulage`, `owned`, `need` and each
//! Active contract's `remaining` are recomputed on load. Loading is
//! tolerant: a record that fails to decode is dropped with a warning and the
//! rest of the document survives.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LedgerError;
use crate::ledger::contract::UNKNOWN_NAME;
use crate::ledger::{CommodityEntry, CommodityId, ContractRecord, ContractStatus, Ledger, MissionId};
use crate::logging::{self, obj, v_str, v_u64, Domain};

#[derive(Debug, Serialize)]
struct LedgerDoc {
    commodities: Vec<CommodityDoc>,
}

#[derive(Debug, Serialize)]
struct CommodityDoc {
    id: CommodityId,
    total: u32,
    stolen: u32,
    haulage: u32,
    contracts: Vec<ContractDoc>,
}

/// Loose shapes for reading; nested records stay as raw values so a bad one
/// can be skipped on its own.
#[derive(Debug, Deserialize)]
struct RawDoc {
    #[serde(default, alias = "cargo")]
    commodities: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawCommodity {
    #[serde(alias = "edname")]
    id: CommodityId,
    #[serde(default)]
    total: u32,
    #[serde(default)]
    stolen: u32,
    #[serde(default, alias = "haulageData")]
    contracts: Vec<Value>,
}

fn unknown() -> String {
    UNKNOWN_NAME.to_string()
}

fn active() -> ContractStatus {
    ContractStatus::Active
}

#[derive(Debug, Serialize, Deserialize)]
struct ContractDoc {
    #[serde(alias = "missionid")]
    mission_id: MissionId,
    #[serde(default = "unknown")]
    name: String,
    #[serde(default = "unknown", alias = "typeEDName")]
    kind: String,
    #[serde(default = "active")]
    status: ContractStatus,
    #[serde(default, alias = "originsystem")]
    origin_system: Option<String>,
    #[serde(default, alias = "sourcesystem")]
    source_system: Option<String>,
    #[serde(default, alias = "sourcebody")]
    source_body: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    amount: u32,
    #[serde(default)]
    remaining: u32,
    #[serde(default, alias = "startmarketid")]
    start_market: Option<u64>,
    #[serde(default, alias = "endmarketid")]
    end_market: Option<u64>,
    #[serde(default)]
    collected: u32,
    #[serde(default)]
    delivered: u32,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    shared: bool,
}

impl From<&ContractRecord> for ContractDoc {
    fn from(c: &ContractRecord) -> Self {
        Self {
            mission_id: c.mission_id,
            name: c.name.clone(),
            kind: c.kind.clone(),
            status: c.status,
            origin_system: c.origin_system.clone(),
            source_system: c.source_system.clone(),
            source_body: c.source_body.clone(),
            destination: c.destination.clone(),
            amount: c.amount,
            remaining: c.remaining,
            start_market: c.start_market,
            end_market: c.end_market,
            collected: c.collected,
            delivered: c.delivered,
            expiry: c.expiry,
            shared: c.shared,
        }
    }
}

impl From<ContractDoc> for ContractRecord {
    fn from(doc: ContractDoc) -> Self {
        let mut c = ContractRecord::accepted(doc.mission_id, &doc.name, &doc.kind, doc.amount);
        c.status = doc.status;
        c.origin_system = doc.origin_system;
        c.source_system = doc.source_system;
        c.source_body = doc.source_body;
        c.destination = doc.destination;
        c.remaining = doc.remaining;
        c.collected = doc.collected;
        c.delivered = doc.delivered;
        c.expiry = doc.expiry;
        c.shared = doc.shared;
        c.record_markets(doc.start_market, doc.end_market);
        c.refresh();
        c
    }
}

impl From<&CommodityEntry> for CommodityDoc {
    fn from(e: &CommodityEntry) -> Self {
        Self {
            id: e.id().clone(),
            total: e.total(),
            stolen: e.stolen(),
            haulage: e.haulage(),
            contracts: e.contracts().iter().map(ContractDoc::from).collect(),
        }
    }
}

// =============================================================================
// Encode / decode
// =============================================================================

pub fn encode(ledger: &Ledger) -> Result<String, LedgerError> {
    let doc = LedgerDoc {
        commodities: ledger.entries().map(CommodityDoc::from).collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Rebuild a ledger from a document. Never fails; unreadable parts are
/// logged and skipped.
pub fn decode(text: &str) -> Ledger {
    let doc: RawDoc = match serde_json::from_str(text) {
        Ok(doc) => doc,
        Err(err) => {
            logging::warn(
                Domain::Persist,
                "document_unreadable",
                obj(&[("msg", v_str(&err.to_string()))]),
            );
            return Ledger::new();
        }
    };

    let mut seen_commodities: HashSet<CommodityId> = HashSet::new();
    let mut seen_missions: HashSet<MissionId> = HashSet::new();
    let mut entries = Vec::new();

    for (idx, raw) in doc.commodities.into_iter().enumerate() {
        let commodity: RawCommodity = match serde_json::from_value(raw) {
            Ok(c) => c,
            Err(err) => {
                logging::warn(
                    Domain::Persist,
                    "commodity_dropped",
                    obj(&[("index", v_u64(idx as u64)), ("msg", v_str(&err.to_string()))]),
                );
                continue;
            }
        };
        if commodity.id.is_empty() || !seen_commodities.insert(commodity.id.clone()) {
            logging::warn(
                Domain::Persist,
                "commodity_dropped",
                obj(&[
                    ("index", v_u64(idx as u64)),
                    ("commodity", v_str(commodity.id.as_str())),
                    ("msg", v_str("empty or duplicate id")),
                ]),
            );
            continue;
        }

        let mut contracts = Vec::new();
        for raw in commodity.contracts {
            let record = match serde_json::from_value::<ContractDoc>(raw) {
                Ok(doc) => ContractRecord::from(doc),
                Err(err) => {
                    logging::warn(
                        Domain::Persist,
                        "contract_dropped",
                        obj(&[
                            ("commodity", v_str(commodity.id.as_str())),
                            ("msg", v_str(&err.to_string())),
                        ]),
                    );
                    continue;
                }
            };
            // a Failed record still awaits the snapshot that settles it
            if record.status == ContractStatus::Completed {
                continue;
            }
            if record.mission_id == 0 || !seen_missions.insert(record.mission_id) {
                logging::warn(
                    Domain::Persist,
                    "contract_dropped",
                    obj(&[
                        ("commodity", v_str(commodity.id.as_str())),
                        ("mission_id", v_u64(record.mission_id)),
                        ("msg", v_str("missing or duplicate mission id")),
                    ]),
                );
                continue;
            }
            contracts.push(record);
        }

        entries.push(CommodityEntry::restore(
            commodity.id,
            commodity.total,
            commodity.stolen,
            contracts,
        ));
    }

    Ledger::from_entries(entries)
}

// =============================================================================
// File I/O
// =============================================================================

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the ledger through a sibling temp file so a crash mid-write never
/// leaves a truncated document behind.
pub fn save(ledger: &Ledger, path: impl AsRef<Path>) -> Result<(), LedgerError> {
    let path = path.as_ref();
    let text = encode(ledger)?;
    let tmp = temp_path(path);

    fs::write(&tmp, text).map_err(|source| LedgerError::Persist {
        path: tmp.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(LedgerError::Persist {
            path: path.to_path_buf(),
            source,
        });
    }

    logging::debug(
        Domain::Persist,
        "saved",
        obj(&[
            ("path", v_str(&path.display().to_string())),
            ("commodities", v_u64(ledger.len() as u64)),
        ]),
    );
    Ok(())
}

/// Read the ledger at `path`. A missing or unreadable file yields an empty
/// ledger.
pub fn load(path: impl AsRef<Path>) -> Ledger {
    let path = path.as_ref();
    let shown = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(text) => {
            let ledger = decode(&text);
            logging::info(
                Domain::Persist,
                "loaded",
                obj(&[("path", v_str(&shown)), ("commodities", v_u64(ledger.len() as u64))]),
            );
            ledger
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            logging::info(
                Domain::Persist,
                "no_ledger",
                obj(&[("path", v_str(&shown))]),
            );
            Ledger::new()
        }
        Err(err) => {
            logging::warn(
                Domain::Persist,
                "load_failed",
                obj(&[("path", v_str(&shown)), ("msg", v_str(&err.to_string()))]),
            );
            Ledger::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ledger {
        let mut c = ContractRecord::accepted(413748339, "Mission_Delivery_Boom", "Delivery", 60);
        c.collected = 20;
        c.destination = Some("HIP 20277".to_string());
        c.record_markets(Some(3225297216), Some(3224777216));
        let silver = CommodityEntry::restore(CommodityId::new("silver"), 25, 2, vec![c]);
        let drones = CommodityEntry::restore(CommodityId::new("drones"), 21, 0, vec![]);
        Ledger::from_entries(vec![silver, drones])
    }

    #[test]
    fn test_encode_decode_preserves_fingerprint() {
        let ledger = sample();
        let text = encode(&ledger).unwrap();
        assert!(!text.contains("\"owned\""));
        assert!(!text.contains("\"need\""));
        let back = decode(&text);
        assert_eq!(back.fingerprint(), ledger.fingerprint());
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_decode_recomputes_derived_fields() {
        let text = r#"{"commodities":[{"id":"gold","total":3,"stolen":0,"haulage":99,
            "contracts":[{"mission_id":5,"amount":10,"remaining":1,"collected":4}]}]}"#;
        let ledger = decode(text);
        let gold = ledger.get("gold").unwrap();
        assert_eq!(gold.total(), 4);
        assert_eq!(gold.haulage(), 4);
        assert_eq!(gold.need(), 6);
        assert_eq!(gold.contract(5).unwrap().name, "Unknown");
    }

    #[test]
    fn test_decode_drops_completed_and_duplicate_contracts() {
        let text = r#"{"commodities":[
            {"id":"gold","total":0,"contracts":[
                {"mission_id":1,"amount":3,"status":"Completed"},
                {"mission_id":2,"amount":3}]},
            {"id":"silver","total":0,"contracts":[{"mission_id":2,"amount":5}]}]}"#;
        let ledger = decode(text);
        assert!(ledger.contract(1).is_none());
        assert_eq!(ledger.find_contract(2).unwrap().0.as_str(), "gold");
        assert!(ledger.get("silver").is_none());
    }

    #[test]
    fn test_decode_keeps_failed_contract_frozen() {
        let text = r#"{"commodities":[{"id":"gold","total":2,"contracts":[
            {"mission_id":9,"amount":4,"remaining":1,"collected":2,"status":"Failed"}]}]}"#;
        let ledger = decode(text);
        let gold = ledger.get("gold").unwrap();
        let c = gold.contract(9).unwrap();
        assert_eq!(c.status, ContractStatus::Failed);
        assert_eq!(c.remaining, 1);
        assert_eq!(gold.haulage(), 2);
        assert_eq!(gold.need(), 1);
        assert_eq!(gold.owned(), 0);
    }

    #[test]
    fn test_decode_garbage_yields_empty_ledger() {
        assert!(decode("not json").is_empty());
        assert!(decode("{}").is_empty());
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/var/data/ledger.json"));
        assert_eq!(tmp, PathBuf::from("/var/data/ledger.json.tmp"));
    }
}
