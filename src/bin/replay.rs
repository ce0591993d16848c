//! Replay journal lines into the persisted ledger.
//!
//! Usage: `replay [journal.log]` (reads stdin when no file is given).
//! Prints one JSON line per commodity once the input is exhausted.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{Context, Result};

use holdledger::classify::{EventClassifier, JournalClassifier};
use holdledger::config::Config;
use holdledger::engine::{Outcome, Reconciler};
use holdledger::logging::{self, obj, v_str, v_u64, Domain};
use holdledger::persist;

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let input: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("open journal {}", path))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let ledger = persist::load(&cfg.ledger_path);
    let mut reconciler = Reconciler::with_ledger(ledger, cfg.reconciler());
    let classifier = JournalClassifier::new();

    logging::info(
        Domain::System,
        "replay_start",
        obj(&[
            ("ledger_path", v_str(&cfg.ledger_path)),
            ("save_every", v_u64(cfg.save_every)),
            ("commodities", v_u64(reconciler.ledger().len() as u64)),
        ]),
    );

    let mut lines = 0u64;
    let mut applied = 0u64;
    let mut ignored = 0u64;
    let mut rejected = 0u64;

    for (idx, line) in input.lines().enumerate() {
        let line = line.context("read journal line")?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;

        let event = match classifier.classify(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                logging::warn(
                    Domain::Classify,
                    "line_skipped",
                    obj(&[("line", v_u64(idx as u64 + 1)), ("msg", v_str(&err.to_string()))]),
                );
                rejected += 1;
                continue;
            }
        };

        match reconciler.apply(event) {
            Ok(out) if out.outcome == Outcome::Applied => {
                applied += 1;
                if cfg.save_every > 0 && applied % cfg.save_every == 0 {
                    persist::save(reconciler.ledger(), &cfg.ledger_path)
                        .context("periodic ledger save")?;
                }
            }
            Ok(_) => ignored += 1,
            // already logged by the reconciler; the ledger is unchanged
            Err(_) => rejected += 1,
        }
    }

    persist::save(reconciler.ledger(), &cfg.ledger_path).context("final ledger save")?;

    for view in reconciler.ledger().views() {
        println!("{}", serde_json::to_string(&view)?);
    }

    logging::info(
        Domain::System,
        "replay_done",
        obj(&[
            ("lines", v_u64(lines)),
            ("applied", v_u64(applied)),
            ("ignored", v_u64(ignored)),
            ("rejected", v_u64(rejected)),
            ("cargo_carried", v_u64(reconciler.ledger().cargo_carried() as u64)),
            ("state_hash", v_str(&reconciler.ledger().fingerprint())),
        ]),
    );
    Ok(())
}
