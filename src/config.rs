use crate::engine::reconciler::ReconcilerConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_path: String,
    /// Save the ledger after this many applied events (0 = only at exit).
    pub save_every: u64,
    pub verify_invariants: bool,
    pub sweep_unlisted_missions: bool,
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            ledger_path: std::env::var("LEDGER_PATH").unwrap_or_else(|_| "./ledger.json".to_string()),
            save_every: std::env::var("SAVE_EVERY").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
            verify_invariants: env_bool("VERIFY_INVARIANTS", true),
            sweep_unlisted_missions: env_bool("SWEEP_UNLISTED", true),
        }
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            verify_invariants: self.verify_invariants,
            sweep_unlisted_missions: self.sweep_unlisted_missions,
        }
    }
}
