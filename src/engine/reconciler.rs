//! Reconciler: (Ledger, InventoryEvent) -> Ledger
//!
//! Every event is applied to a working copy of the ledger. The copy is
//! reconciled, pruned and checked, and only then swapped in, so callers see
//! either the fully reconciled result or the untouched previous state.
//!
//! Two sources feed the same ledger:
//!
//! | Source                | Authoritative for                          |
//! |-----------------------|--------------------------------------------|
//! | Inventory snapshot    | units held, stolen/haulage split           |
//! | Contract lifecycle    | which missions exist and what they still need |
//!
//! A snapshot overrides held quantities but never erases obligations.

use std::collections::HashSet;

use super::events::*;
use crate::error::EngineError;
use crate::ledger::contract::Transition;
use crate::ledger::{CommodityEntry, CommodityId, ContractRecord, Ledger, MissionId};
use crate::logging::{self, obj, v_str, v_u64, Domain};
use crate::verify::invariants::check_ledger;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Run the full invariant check before committing each event.
    pub verify_invariants: bool,
    /// On a mission log, fail Active contracts the log does not mention.
    pub sweep_unlisted_missions: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            verify_invariants: true,
            sweep_unlisted_missions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing to reconcile; the reason is a short static tag.
    Ignored(&'static str),
}

/// Result of processing an event
#[derive(Debug, Clone)]
pub struct ReconcileOutput {
    pub outcome: Outcome,
    pub touched: Vec<CommodityId>,
    pub pruned: Vec<CommodityId>,
    pub seq: u64,
    pub state_hash: String,
}

/// Sole owner and writer of the ledger.
#[derive(Debug, Clone)]
pub struct Reconciler {
    ledger: Ledger,
    cfg: ReconcilerConfig,
    seq: u64,
    last_event_at: Option<Timestamp>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

impl Reconciler {
    pub fn new(cfg: ReconcilerConfig) -> Self {
        Self::with_ledger(Ledger::new(), cfg)
    }

    pub fn with_ledger(ledger: Ledger, cfg: ReconcilerConfig) -> Self {
        Self {
            ledger,
            cfg,
            seq: 0,
            last_event_at: None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.cfg
    }

    /// Number of events admitted so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_event_at(&self) -> Option<Timestamp> {
        self.last_event_at
    }

    pub fn apply(&mut self, event: InventoryEvent) -> Result<ReconcileOutput, EngineError> {
        let kind = event.kind();
        let domain = domain_of(&event);
        let ts = event.timestamp();

        if let Err(err) = event.validate() {
            logging::warn(
                domain,
                "event_rejected",
                obj(&[("event", v_str(kind)), ("msg", v_str(&err.to_string()))]),
            );
            return Err(err.into());
        }

        let mut work = self.ledger.clone();
        let mut touched = Vec::new();
        let outcome = dispatch(&mut work, event, &self.cfg, &mut touched);
        work.reconcile_all();
        let pruned = work.prune();

        if self.cfg.verify_invariants {
            if let Err(violation) = check_ledger(&work) {
                logging::error(
                    domain,
                    "invariant_violation",
                    obj(&[
                        ("event", v_str(kind)),
                        ("commodity", v_str(&violation.commodity)),
                        ("msg", v_str(&violation.msg)),
                    ]),
                );
                return Err(violation.into());
            }
        }

        self.ledger = work;
        self.seq += 1;
        self.last_event_at = Some(self.last_event_at.map_or(ts, |prev| prev.max(ts)));
        let state_hash = self.ledger.fingerprint();

        let outcome_tag = match &outcome {
            Outcome::Applied => "applied",
            Outcome::Ignored(reason) => *reason,
        };
        logging::debug(
            domain,
            kind,
            obj(&[
                ("seq", v_u64(self.seq)),
                ("outcome", v_str(outcome_tag)),
                ("touched", v_u64(touched.len() as u64)),
                ("pruned", v_u64(pruned.len() as u64)),
                ("state_hash", v_str(&state_hash)),
            ]),
        );

        Ok(ReconcileOutput {
            outcome,
            touched,
            pruned,
            seq: self.seq,
            state_hash,
        })
    }
}

fn domain_of(event: &InventoryEvent) -> Domain {
    match event {
        InventoryEvent::Snapshot(_) => Domain::Snapshot,
        InventoryEvent::Ejected(_) | InventoryEvent::Synthesized { .. } | InventoryEvent::Broker { .. } => {
            Domain::Cargo
        }
        InventoryEvent::ContractAccepted(_)
        | InventoryEvent::ContractCompleted { .. }
        | InventoryEvent::ContractAbandoned { .. }
        | InventoryEvent::ContractFailed { .. }
        | InventoryEvent::MissionLog(_) => Domain::Mission,
        InventoryEvent::Depot(_) => Domain::Depot,
    }
}

fn dispatch(
    ledger: &mut Ledger,
    event: InventoryEvent,
    cfg: &ReconcilerConfig,
    touched: &mut Vec<CommodityId>,
) -> Outcome {
    match event {
        InventoryEvent::Snapshot(e) => on_snapshot(ledger, e, touched),
        InventoryEvent::Ejected(e) => on_ejected(ledger, e, touched),
        InventoryEvent::ContractAccepted(e) => on_accepted(ledger, e, touched),
        InventoryEvent::ContractCompleted { mission_id, .. } => {
            close_contract(ledger, mission_id, Transition::Complete, touched)
        }
        InventoryEvent::ContractAbandoned { mission_id, .. }
        | InventoryEvent::ContractFailed { mission_id, .. } => {
            close_contract(ledger, mission_id, Transition::Fail, touched)
        }
        InventoryEvent::Depot(e) => on_depot(ledger, e, touched),
        InventoryEvent::Synthesized { commodity, count, .. } => {
            if count == 0 {
                return Outcome::Ignored("nothing synthesized");
            }
            ledger.entry_or_insert(&commodity).add_units(count);
            touch(touched, &commodity);
            Outcome::Applied
        }
        InventoryEvent::Broker { consumed, .. } => on_broker(ledger, consumed, touched),
        InventoryEvent::MissionLog(e) => on_mission_log(ledger, e, cfg, touched),
    }
}

fn touch(touched: &mut Vec<CommodityId>, id: &CommodityId) {
    if !touched.contains(id) {
        touched.push(id.clone());
    }
}

fn home_of(ledger: &Ledger, mission_id: MissionId) -> Option<CommodityId> {
    ledger.find_contract(mission_id).map(|(id, _)| id.clone())
}

// =============================================================================
// Snapshot
// =============================================================================

fn on_snapshot(
    ledger: &mut Ledger,
    snap: FullInventorySnapshot,
    touched: &mut Vec<CommodityId>,
) -> Outcome {
    if snap.vehicle != Vehicle::Ship {
        return Outcome::Ignored("not the ship hold");
    }

    // Records flagged by an earlier ejection are settled now. Units the source
    // still tags with their mission are no longer legitimately hauled; the
    // record lingers (holding nothing) only while such units are reported.
    let tagged: HashSet<MissionId> = snap.groups.iter().filter_map(|g| g.mission_id).collect();
    let mut forfeited: HashSet<MissionId> = HashSet::new();
    for entry in ledger.entries_mut() {
        for mut c in entry.prune_terminal() {
            if tagged.contains(&c.mission_id) {
                forfeited.insert(c.mission_id);
                c.collected = 0;
                entry.insert_contract(c);
            }
        }
        entry.vacate();
        touched.push(entry.id().clone());
    }

    let mut carried: u64 = 0;
    for group in snap.groups {
        carried += group.count as u64;
        let misplaced = match group.mission_id {
            Some(m) => home_of(ledger, m).filter(|home| *home != group.commodity),
            None => None,
        };

        let entry = ledger.entry_or_insert(&group.commodity);
        entry.add_units(group.count);
        match group.mission_id {
            Some(m) if forfeited.contains(&m) => entry.add_stolen(group.count),
            Some(m) if misplaced.is_some() => {
                logging::warn(
                    Domain::Snapshot,
                    "mission_commodity_mismatch",
                    obj(&[
                        ("mission_id", v_u64(m)),
                        ("commodity", v_str(group.commodity.as_str())),
                    ]),
                );
            }
            Some(m) => match entry.contract_mut(m) {
                Some(c) => c.collected = c.collected.saturating_add(group.count),
                None => {
                    let mut c = ContractRecord::synthesized(m, group.count);
                    c.collected = group.count;
                    entry.insert_contract(c);
                }
            },
            None => entry.add_stolen(group.stolen.min(group.count)),
        }
        touch(touched, &group.commodity);
    }

    // A reconstructed contract can only be as small as what we've seen of it.
    // One known only from cargo tags is gone once the hold stops reporting it.
    for entry in ledger.entries_mut() {
        for c in entry.contracts_mut().filter(|c| c.shared && c.is_active()) {
            c.amount = c.amount.max(c.collected.saturating_add(c.delivered));
        }
        let stale: Vec<MissionId> = entry
            .contracts()
            .iter()
            .filter(|c| {
                c.shared
                    && c.is_active()
                    && !c.is_depot_shared()
                    && c.collected == 0
                    && c.delivered == 0
                    && !tagged.contains(&c.mission_id)
            })
            .map(|c| c.mission_id)
            .collect();
        for m in stale {
            entry.remove_contract(m);
            logging::debug(
                Domain::Snapshot,
                "contract_dropped",
                obj(&[("mission_id", v_u64(m)), ("commodity", v_str(entry.id().as_str()))]),
            );
        }
    }

    if let Some(reported) = snap.reported_count {
        if reported as u64 != carried {
            logging::warn(
                Domain::Snapshot,
                "count_mismatch",
                obj(&[("reported", v_u64(reported as u64)), ("carried", v_u64(carried))]),
            );
        }
    }
    Outcome::Applied
}

// =============================================================================
// Hold adjustments
// =============================================================================

fn on_ejected(ledger: &mut Ledger, e: UnitsEjected, touched: &mut Vec<CommodityId>) -> Outcome {
    let Some(entry) = ledger.entry_mut(&e.commodity) else {
        return Outcome::Ignored("unknown commodity");
    };
    let mut left = e.count;

    match e.mission_id {
        Some(m) if entry.contract(m).is_some() => {
            left -= release_hauled(entry, m, left, e.abandoned);
        }
        // the tag names a mission we never resolved; the units can only have
        // come from what this commodity hauls
        Some(_) => {
            for m in hauling(entry, true) {
                if left == 0 {
                    break;
                }
                left -= release_hauled(entry, m, left, e.abandoned);
            }
        }
        None => {}
    }

    entry.reconcile();
    left -= entry.take_owned(left);
    left -= entry.take_stolen(left);

    // the hold is authoritative: whatever is still unaccounted for leaves
    // haulage without touching contract status
    for m in hauling(entry, false) {
        if left == 0 {
            break;
        }
        left -= release_hauled(entry, m, left, false);
    }
    touch(touched, &e.commodity);
    Outcome::Applied
}

/// Mission ids of contracts on `entry` still holding units.
fn hauling(entry: &CommodityEntry, active_only: bool) -> Vec<MissionId> {
    entry
        .contracts()
        .iter()
        .filter(|c| c.collected > 0 && (!active_only || c.is_active()))
        .map(|c| c.mission_id)
        .collect()
}

/// Release up to `count` units held under `mission_id` and drop them from
/// the hold. An abandoned ejection flags the contract Failed first.
fn release_hauled(entry: &mut CommodityEntry, mission_id: MissionId, count: u32, abandoned: bool) -> u32 {
    let Some(contract) = entry.contract_mut(mission_id) else {
        return 0;
    };
    if abandoned && contract.is_active() {
        let _ = contract.transition(Transition::Fail);
    }
    let released = contract.release(count);
    entry.take_hauled(released);
    released
}

fn on_broker(
    ledger: &mut Ledger,
    consumed: Vec<(CommodityId, u32)>,
    touched: &mut Vec<CommodityId>,
) -> Outcome {
    let mut any = false;
    for (id, count) in consumed {
        let Some(entry) = ledger.entry_mut(&id) else {
            continue;
        };
        entry.reconcile();
        let taken = entry.take_owned(count);
        if taken < count {
            logging::debug(
                Domain::Cargo,
                "broker_shortfall",
                obj(&[
                    ("commodity", v_str(id.as_str())),
                    ("requested", v_u64(count as u64)),
                    ("taken", v_u64(taken as u64)),
                ]),
            );
        }
        touch(touched, &id);
        any = true;
    }
    if any {
        Outcome::Applied
    } else {
        Outcome::Ignored("nothing to consume")
    }
}

// =============================================================================
// Contract lifecycle
// =============================================================================

fn on_accepted(ledger: &mut Ledger, e: ContractAccepted, touched: &mut Vec<CommodityId>) -> Outcome {
    let Some(commodity) = e.commodity.filter(|c| !c.is_empty()) else {
        return Outcome::Ignored("no cargo deliverable");
    };
    if e.amount == 0 {
        return Outcome::Ignored("no cargo deliverable");
    }

    if let Some(home) = home_of(ledger, e.mission_id) {
        let Some(c) = ledger.entry_mut(&home).and_then(|entry| entry.contract_mut(e.mission_id)) else {
            return Outcome::Ignored("unknown mission");
        };
        if !(c.shared && c.is_active()) {
            return Outcome::Ignored("contract already known");
        }
        // acceptance arrived after cargo or depot telemetry
        c.name = e.name;
        c.kind = e.kind;
        c.amount = e.amount;
        c.origin_system = e.origin_system.or(c.origin_system.take());
        c.destination = e.destination.or(c.destination.take());
        c.expiry = e.expiry.or(c.expiry);
        c.shared = false;
        c.refresh();
        logging::debug(
            Domain::Mission,
            "contract_upgraded",
            obj(&[("mission_id", v_u64(e.mission_id)), ("commodity", v_str(home.as_str()))]),
        );
        touch(touched, &home);
        return Outcome::Applied;
    }

    let mut c = ContractRecord::accepted(e.mission_id, &e.name, &e.kind, e.amount);
    c.origin_system = e.origin_system;
    c.destination = e.destination;
    c.expiry = e.expiry;
    ledger.entry_or_insert(&commodity).insert_contract(c);
    touch(touched, &commodity);
    Outcome::Applied
}

/// Shared terminal path for completion, failure and abandonment.
///
/// Completed: units still collected under the contract leave the hold.
/// Failed: they stay in the hold but are reclassified as stolen.
fn close_contract(
    ledger: &mut Ledger,
    mission_id: MissionId,
    to: Transition,
    touched: &mut Vec<CommodityId>,
) -> Outcome {
    let Some(home) = home_of(ledger, mission_id) else {
        return Outcome::Ignored("unknown mission");
    };
    let Some(entry) = ledger.entry_mut(&home) else {
        return Outcome::Ignored("unknown mission");
    };
    let Some(contract) = entry.contract_mut(mission_id) else {
        return Outcome::Ignored("unknown mission");
    };
    if contract.transition(to).is_err() {
        return Outcome::Ignored("contract already terminal");
    }
    let Some(closed) = entry.remove_contract(mission_id) else {
        return Outcome::Ignored("unknown mission");
    };

    match to {
        Transition::Complete => entry.take_hauled(closed.collected),
        Transition::Fail => entry.add_stolen(closed.collected),
    }
    logging::debug(
        Domain::Mission,
        "contract_closed",
        obj(&[
            ("mission_id", v_u64(mission_id)),
            ("commodity", v_str(home.as_str())),
            ("status", v_str(closed.status.as_str())),
            ("collected", v_u64(closed.collected as u64)),
            ("remaining", v_u64(closed.remaining as u64)),
        ]),
    );
    touch(touched, &home);
    Outcome::Applied
}

fn on_depot(ledger: &mut Ledger, e: DepotTransaction, touched: &mut Vec<CommodityId>) -> Outcome {
    let home = home_of(ledger, e.mission_id).unwrap_or_else(|| e.commodity.clone());
    let entry = ledger.entry_or_insert(&home);
    entry.reconcile();

    if entry.contract(e.mission_id).is_none() {
        logging::debug(
            Domain::Depot,
            "contract_synthesized",
            obj(&[
                ("mission_id", v_u64(e.mission_id)),
                ("commodity", v_str(home.as_str())),
                ("total_to_deliver", v_u64(e.total_to_deliver as u64)),
            ]),
        );
        entry.insert_contract(ContractRecord::synthesized(e.mission_id, e.total_to_deliver));
    }
    let Some(c) = entry.contract_mut(e.mission_id) else {
        return Outcome::Ignored("unknown mission");
    };
    if !c.is_active() {
        return Outcome::Ignored("contract already terminal");
    }
    if c.shared && e.total_to_deliver > c.amount {
        c.amount = e.total_to_deliver;
    }
    c.record_markets(e.start_market, e.end_market);

    let finished = match e.update {
        DepotUpdate::Collect => {
            c.collected = c.collected.saturating_add(e.count);
            c.refresh();
            entry.add_units(e.count);
            false
        }
        DepotUpdate::Deliver => {
            let from_hold = c.release(e.count);
            c.delivered = c.delivered.saturating_add(e.count);
            c.refresh();
            let done = c.remaining == 0 && c.collected == 0;
            entry.take_hauled(from_hold);
            entry.reconcile();
            // whatever wasn't earmarked came out of the player's own stock
            entry.take_owned(e.count - from_hold);
            done
        }
    };
    touch(touched, &home);

    if finished {
        return close_contract(ledger, e.mission_id, Transition::Complete, touched);
    }
    Outcome::Applied
}

fn on_mission_log(
    ledger: &mut Ledger,
    log: MissionLog,
    cfg: &ReconcilerConfig,
    touched: &mut Vec<CommodityId>,
) -> Outcome {
    let mut closed = 0usize;
    for &m in &log.complete {
        if close_contract(ledger, m, Transition::Complete, touched) == Outcome::Applied {
            closed += 1;
        }
    }
    for &m in &log.failed {
        if close_contract(ledger, m, Transition::Fail, touched) == Outcome::Applied {
            closed += 1;
        }
    }

    if cfg.sweep_unlisted_missions {
        let listed: HashSet<MissionId> = log
            .active
            .iter()
            .chain(&log.failed)
            .chain(&log.complete)
            .copied()
            .collect();
        let unlisted: Vec<MissionId> = ledger
            .entries()
            .flat_map(|e| e.contracts())
            .filter(|c| c.is_active() && !c.is_depot_shared() && !listed.contains(&c.mission_id))
            .map(|c| c.mission_id)
            .collect();
        for m in unlisted {
            if close_contract(ledger, m, Transition::Fail, touched) == Outcome::Applied {
                closed += 1;
            }
        }
    }

    if closed == 0 {
        Outcome::Ignored("mission log matches ledger")
    } else {
        Outcome::Applied
    }
}
