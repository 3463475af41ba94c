use std::collections::HashMap;

use parking_lot::RwLock;

/// Duration assumed for steps with no recorded history (milliseconds).
pub const DEFAULT_STEP_DURATION_MS: f64 = 100.0;

/// Per-domain, per-action duration samples backing the sequential-versus-
/// parallel estimates. Lookups degrade from action-level average to
/// domain-level average to a fixed default, so distinct steps within one
/// domain can carry distinct expectations.
#[derive(Debug, Default)]
pub struct DurationLedger {
    samples: RwLock<HashMap<String, HashMap<String, Vec<u64>>>>,
}

impl DurationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one duration sample.
    pub fn record(&self, domain: &str, action: &str, duration_ms: u64) {
        let mut samples = self.samples.write();
        samples
            .entry(domain.to_string())
            .or_default()
            .entry(action.to_string())
            .or_default()
            .push(duration_ms);
    }

    /// Expected duration for a step, in milliseconds.
    #[must_use]
    pub fn average(&self, domain: &str, action: &str) -> f64 {
        let samples = self.samples.read();
        let Some(actions) = samples.get(domain) else {
            return DEFAULT_STEP_DURATION_MS;
        };
        if let Some(durations) = actions.get(action) {
            if let Some(avg) = mean(durations) {
                return avg;
            }
        }
        let all: Vec<u64> = actions.values().flatten().copied().collect();
        mean(&all).unwrap_or(DEFAULT_STEP_DURATION_MS)
    }

    /// Domain-level average across all actions, if any samples exist.
    #[must_use]
    pub fn domain_average(&self, domain: &str) -> Option<f64> {
        let samples = self.samples.read();
        let all: Vec<u64> = samples.get(domain)?.values().flatten().copied().collect();
        mean(&all)
    }
}

fn mean(durations: &[u64]) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let avg = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
    Some(avg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_domain_uses_default() {
        let ledger = DurationLedger::new();
        assert!((ledger.average("email", "list") - DEFAULT_STEP_DURATION_MS).abs() < f64::EPSILON);
    }

    #[test]
    fn action_average_wins_over_domain_average() {
        let ledger = DurationLedger::new();
        ledger.record("email", "list", 100);
        ledger.record("email", "list", 200);
        ledger.record("email", "create", 1000);
        assert!((ledger.average("email", "list") - 150.0).abs() < 1e-9);
    }

    #[test]
    fn unseen_action_falls_back_to_domain_average() {
        let ledger = DurationLedger::new();
        ledger.record("email", "list", 100);
        ledger.record("email", "create", 300);
        assert!((ledger.average("email", "archive") - 200.0).abs() < 1e-9);
        assert!((ledger.domain_average("email").unwrap() - 200.0).abs() < 1e-9);
    }
}
