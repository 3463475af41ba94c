use serde::{Deserialize, Serialize};

use crate::module::PatternObservation;

/// EMA coefficient pulling the duration average toward new samples.
pub const DURATION_ALPHA: f64 = 0.2;
/// EMA coefficient pulling the success rate toward new outcomes.
pub const SUCCESS_ALPHA: f64 = 0.1;

/// Exponential moving average step.
#[must_use]
pub fn ema(previous: f64, sample: f64, alpha: f64) -> f64 {
    previous * (1.0 - alpha) + sample * alpha
}

/// Running expectation for one pattern signature. Seeded from the first
/// observation so a cold signature never trips anomaly thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    /// Expected duration (EMA, milliseconds).
    pub avg_duration_ms: f64,
    /// Expected success rate (EMA, `[0, 1]`).
    pub success_rate: f64,
    /// Fastest execution seen.
    pub min_duration_ms: u64,
    /// Slowest execution seen.
    pub max_duration_ms: u64,
}

impl Baseline {
    /// Seeds a baseline from the first observation of a signature.
    #[must_use]
    pub fn seeded(observation: &PatternObservation) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let duration = observation.duration_ms as f64;
        Self {
            avg_duration_ms: duration,
            success_rate: if observation.success { 1.0 } else { 0.0 },
            min_duration_ms: observation.duration_ms,
            max_duration_ms: observation.duration_ms,
        }
    }

    /// Folds one observation into the running averages.
    pub fn absorb(&mut self, observation: &PatternObservation) {
        #[allow(clippy::cast_precision_loss)]
        let duration = observation.duration_ms as f64;
        self.avg_duration_ms = ema(self.avg_duration_ms, duration, DURATION_ALPHA);
        let outcome = if observation.success { 1.0 } else { 0.0 };
        self.success_rate = ema(self.success_rate, outcome, SUCCESS_ALPHA);
        self.min_duration_ms = self.min_duration_ms.min(observation.duration_ms);
        self.max_duration_ms = self.max_duration_ms.max(observation.duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(duration_ms: u64, success: bool) -> PatternObservation {
        PatternObservation::new("search", vec!["email".into()], duration_ms, success)
    }

    #[test]
    fn seeded_baseline_mirrors_first_observation() {
        let baseline = Baseline::seeded(&obs(400, true));
        assert!((baseline.avg_duration_ms - 400.0).abs() < f64::EPSILON);
        assert!((baseline.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(baseline.min_duration_ms, 400);
        assert_eq!(baseline.max_duration_ms, 400);
    }

    #[test]
    fn absorb_moves_averages_and_extremes() {
        let mut baseline = Baseline::seeded(&obs(100, true));
        baseline.absorb(&obs(200, false));
        assert!((baseline.avg_duration_ms - 120.0).abs() < 1e-9);
        assert!((baseline.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(baseline.min_duration_ms, 100);
        assert_eq!(baseline.max_duration_ms, 200);
    }
}
