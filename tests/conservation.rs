//! Randomized event streams: conservation must hold after every event, and
//! no well-formed stream may ever trip the invariant checker.

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use holdledger::engine::events::*;
use holdledger::engine::{Reconciler, ReconcilerConfig};
use holdledger::error::EngineError;
use holdledger::ledger::{CommodityId, Ledger, MissionId};
use holdledger::verify::invariants::check_ledger;

const COMMODITIES: &[&str] = &["gold", "silver", "tantalum", "biowaste"];
const SEEDS: &[u64] = &[7, 42, 1337, 20181031];
const STEPS: usize = 400;

struct Gen {
    rng: StdRng,
    step: i64,
}

impl Gen {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: 0,
        }
    }

    fn ts(&mut self) -> Timestamp {
        self.step += 1;
        Utc.with_ymd_and_hms(2018, 5, 5, 0, 0, 0).unwrap() + Duration::seconds(self.step)
    }

    fn commodity(&mut self) -> CommodityId {
        CommodityId::new(COMMODITIES[self.rng.gen_range(0..COMMODITIES.len())])
    }

    fn mission(&mut self) -> MissionId {
        self.rng.gen_range(1..=8)
    }

    fn snapshot(&mut self) -> InventoryEvent {
        let n = self.rng.gen_range(0..6);
        let mut groups = Vec::with_capacity(n);
        for _ in 0..n {
            let count = self.rng.gen_range(1..20);
            let mut g = CargoGroup {
                commodity: self.commodity(),
                count,
                stolen: 0,
                mission_id: None,
            };
            match self.rng.gen_range(0..3) {
                0 => g.mission_id = Some(self.mission()),
                1 => g.stolen = self.rng.gen_range(0..=count + 2),
                _ => {}
            }
            groups.push(g);
        }
        InventoryEvent::Snapshot(FullInventorySnapshot {
            ts: self.ts(),
            vehicle: Vehicle::Ship,
            groups,
            reported_count: None,
        })
    }

    fn event(&mut self) -> InventoryEvent {
        match self.rng.gen_range(0..11) {
            0 | 1 => self.snapshot(),
            2 => InventoryEvent::Ejected(UnitsEjected {
                ts: self.ts(),
                commodity: self.commodity(),
                count: self.rng.gen_range(0..15),
                mission_id: self.rng.gen_bool(0.5).then(|| self.mission()),
                abandoned: self.rng.gen_bool(0.3),
            }),
            3 => InventoryEvent::ContractAccepted(ContractAccepted {
                ts: self.ts(),
                mission_id: self.mission(),
                commodity: self.rng.gen_bool(0.9).then(|| self.commodity()),
                name: "Mission_Delivery".to_string(),
                kind: "Delivery".to_string(),
                amount: self.rng.gen_range(0..40),
                origin_system: None,
                destination: None,
                expiry: None,
            }),
            4 => InventoryEvent::ContractCompleted {
                ts: self.ts(),
                mission_id: self.mission(),
            },
            5 => InventoryEvent::ContractAbandoned {
                ts: self.ts(),
                mission_id: self.mission(),
            },
            6 => InventoryEvent::ContractFailed {
                ts: self.ts(),
                mission_id: self.mission(),
            },
            7 => InventoryEvent::Depot(DepotTransaction {
                ts: self.ts(),
                mission_id: self.mission(),
                commodity: self.commodity(),
                update: if self.rng.gen_bool(0.5) {
                    DepotUpdate::Collect
                } else {
                    DepotUpdate::Deliver
                },
                count: self.rng.gen_range(0..30),
                total_to_deliver: self.rng.gen_range(1..60),
                start_market: self.rng.gen_bool(0.5).then_some(3225297216),
                end_market: Some(3224777216),
            }),
            8 => InventoryEvent::Synthesized {
                ts: self.ts(),
                commodity: self.commodity(),
                count: self.rng.gen_range(0..9),
            },
            9 => InventoryEvent::Broker {
                ts: self.ts(),
                consumed: vec![(self.commodity(), self.rng.gen_range(0..12))],
            },
            _ => {
                let active = (0..self.rng.gen_range(0..4)).map(|_| self.mission()).collect();
                let failed = (0..self.rng.gen_range(0..2)).map(|_| self.mission()).collect();
                InventoryEvent::MissionLog(MissionLog {
                    ts: self.ts(),
                    active,
                    failed,
                    complete: Vec::new(),
                })
            }
        }
    }
}

fn assert_conserved(ledger: &Ledger, context: &str) {
    for e in ledger.entries() {
        assert_eq!(
            e.total(),
            e.owned() + e.stolen() + e.haulage(),
            "{}: conservation broken for {}",
            context,
            e.id()
        );
        assert!(!e.is_empty(), "{}: empty entry {} left in ledger", context, e.id());
    }
    check_ledger(ledger).unwrap_or_else(|v| panic!("{}: {}", context, v));
}

#[test]
fn random_streams_conserve_units() {
    for &seed in SEEDS {
        let mut gen = Gen::new(seed);
        let mut r = Reconciler::new(ReconcilerConfig::default());
        for step in 0..STEPS {
            let event = gen.event();
            let kind = event.kind();
            match r.apply(event) {
                Ok(_) => {}
                Err(EngineError::Invariant(v)) => {
                    panic!("seed {} step {} ({}): invariant rejected: {}", seed, step, kind, v)
                }
                Err(EngineError::Malformed(e)) => {
                    panic!("seed {} step {} ({}): generator produced bad event: {}", seed, step, kind, e)
                }
            }
            assert_conserved(r.ledger(), &format!("seed {} step {}", seed, step));
        }
    }
}

#[test]
fn snapshot_sets_totals_exactly() {
    for &seed in SEEDS {
        let mut gen = Gen::new(seed);
        let mut r = Reconciler::default();
        for _ in 0..STEPS / 4 {
            r.apply(gen.event()).unwrap();
        }
        let snap = gen.snapshot();
        let InventoryEvent::Snapshot(ref s) = snap else {
            unreachable!()
        };
        let mut expected: std::collections::BTreeMap<CommodityId, u32> = Default::default();
        for g in &s.groups {
            *expected.entry(g.commodity.clone()).or_default() += g.count;
        }
        r.apply(snap.clone()).unwrap();
        for e in r.ledger().entries() {
            assert_eq!(
                e.total(),
                expected.get(e.id()).copied().unwrap_or(0),
                "seed {}: total for {}",
                seed,
                e.id()
            );
        }
    }
}

#[test]
fn repeated_snapshot_is_idempotent() {
    for &seed in SEEDS {
        let mut gen = Gen::new(seed);
        let mut r = Reconciler::default();
        for step in 0..STEPS {
            r.apply(gen.event()).unwrap();
            if step % 25 != 0 {
                continue;
            }
            let snap = gen.snapshot();
            let first = r.apply(snap.clone()).unwrap().state_hash;
            let second = r.apply(snap).unwrap().state_hash;
            assert_eq!(first, second, "seed {} step {}", seed, step);
        }
    }
}

#[test]
fn closing_a_contract_releases_its_need() {
    for &seed in SEEDS {
        let mut gen = Gen::new(seed);
        let mut r = Reconciler::default();
        for _ in 0..STEPS / 2 {
            r.apply(gen.event()).unwrap();
        }
        let open: Vec<(CommodityId, MissionId, u32)> = r
            .ledger()
            .entries()
            .flat_map(|e| {
                e.contracts()
                    .iter()
                    .filter(|c| c.is_active())
                    .map(move |c| (e.id().clone(), c.mission_id, c.remaining))
            })
            .collect();
        for (commodity, mission_id, remaining) in open {
            let before = r.ledger().entry(&commodity).map_or(0, |e| e.need());
            let ts = gen.ts();
            r.apply(InventoryEvent::ContractFailed { ts, mission_id }).unwrap();
            let after = r.ledger().entry(&commodity).map_or(0, |e| e.need());
            assert_eq!(before - after, remaining, "seed {} mission {}", seed, mission_id);
            assert!(r.ledger().contract(mission_id).is_none());
        }
    }
}
