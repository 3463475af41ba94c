use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::json;
use shared_logging::LogLevel;

use attune_patterns::{PatternSignature, PatternStore};

use crate::{
    ledger::DurationLedger,
    module::{
        AdaptationConfig, AdaptationKind, AdaptationPriority, ConfidenceBucket,
        ExecutionAdaptation, LearnedSequence, PredictedStep, RecordedStep, StepSnapshot,
    },
    telemetry::PredictionTelemetry,
};

/// Learned sequences retained per signature; the oldest run is evicted once
/// the cap is reached.
pub const SEQUENCE_CAP: usize = 50;

struct Candidate {
    step_type: String,
    domain: String,
    action: String,
    occurrences: usize,
    total_duration_ms: u64,
}

/// Maintains per-signature execution history and answers "what runs next"
/// and "how should this plan change" queries.
pub struct PredictiveExecutor {
    sequences: RwLock<HashMap<PatternSignature, VecDeque<LearnedSequence>>>,
    ledger: DurationLedger,
    config: AdaptationConfig,
    profiles: Option<Arc<PatternStore>>,
    telemetry: Option<PredictionTelemetry>,
}

impl Default for PredictiveExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictiveExecutor {
    /// Creates an executor with default thresholds and no profile store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sequences: RwLock::new(HashMap::new()),
            ledger: DurationLedger::new(),
            config: AdaptationConfig::default(),
            profiles: None,
            telemetry: None,
        }
    }

    /// Overrides the adaptation thresholds.
    #[must_use]
    pub fn with_config(mut self, config: AdaptationConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes per-user learning updates into a shared pattern store.
    #[must_use]
    pub fn with_profiles(mut self, store: Arc<PatternStore>) -> Self {
        self.profiles = Some(store);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PredictionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Duration history backing the adaptation estimates.
    #[must_use]
    pub const fn ledger(&self) -> &DurationLedger {
        &self.ledger
    }

    /// Records a completed run under its signature, feeds the duration
    /// ledger, and updates the user's profile when a store is wired in.
    pub fn learn_execution(
        &self,
        intent: &str,
        domains: &[String],
        steps: Vec<RecordedStep>,
        total_duration_ms: u64,
        success: bool,
        user_id: Option<&str>,
    ) {
        let signature = PatternSignature::derive(intent, domains);
        for step in &steps {
            self.ledger.record(&step.domain, &step.action, step.duration_ms);
        }
        let step_count = steps.len();
        {
            let mut sequences = self.sequences.write();
            let runs = sequences.entry(signature.clone()).or_default();
            runs.push_back(LearnedSequence {
                steps,
                total_duration_ms,
                success,
                recorded_at: Utc::now(),
            });
            while runs.len() > SEQUENCE_CAP {
                runs.pop_front();
            }
        }
        if let (Some(store), Some(user)) = (&self.profiles, user_id) {
            store.record_execution(user, intent, domains, total_duration_ms, success);
        }
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Info,
                "execution.learned",
                json!({
                    "signature": signature.as_str(),
                    "steps": step_count,
                    "duration_ms": total_duration_ms,
                    "success": success,
                }),
            );
        }
    }

    /// Number of learned sequences for an intent/domain combination.
    #[must_use]
    pub fn sequence_count(&self, intent: &str, domains: &[String]) -> usize {
        let signature = PatternSignature::derive(intent, domains);
        self.sequences
            .read()
            .get(&signature)
            .map_or(0, VecDeque::len)
    }

    /// Predicts the next steps of an in-flight run. A learned sequence
    /// matches when it contains every already-executed step id; candidates
    /// are the steps appearing after the furthest executed position, up to
    /// `limit` positions ahead, ranked by how many matching sequences they
    /// appeared in.
    #[must_use]
    pub fn predict_next_steps(
        &self,
        intent: &str,
        domains: &[String],
        executed_step_ids: &[String],
        limit: usize,
    ) -> Vec<PredictedStep> {
        let signature = PatternSignature::derive(intent, domains);
        let sequences = self.sequences.read();
        let Some(runs) = sequences.get(&signature) else {
            return Vec::new();
        };
        let executed: HashSet<&str> = executed_step_ids.iter().map(String::as_str).collect();
        let mut matching = 0usize;
        let mut candidates: IndexMap<String, Candidate> = IndexMap::new();
        for run in runs {
            let ids: HashSet<&str> = run.steps.iter().map(|s| s.step_id.as_str()).collect();
            if !executed.iter().all(|id| ids.contains(id)) {
                continue;
            }
            matching += 1;
            let resume_from = run
                .steps
                .iter()
                .enumerate()
                .filter(|(_, step)| executed.contains(step.step_id.as_str()))
                .map(|(idx, _)| idx)
                .max()
                .map_or(0, |idx| idx + 1);
            for step in run.steps.iter().skip(resume_from).take(limit) {
                let candidate = candidates
                    .entry(step.step_id.clone())
                    .or_insert_with(|| Candidate {
                        step_type: step.step_type.clone(),
                        domain: step.domain.clone(),
                        action: step.action.clone(),
                        occurrences: 0,
                        total_duration_ms: 0,
                    });
                candidate.occurrences += 1;
                candidate.total_duration_ms += step.duration_ms;
            }
        }
        if matching == 0 {
            return Vec::new();
        }
        let mut predicted: Vec<PredictedStep> = candidates
            .into_iter()
            .map(|(step_id, candidate)| {
                #[allow(clippy::cast_precision_loss)]
                let rate = candidate.occurrences as f64 / matching as f64;
                let (bucket, score) = ConfidenceBucket::from_rate(rate);
                #[allow(clippy::cast_precision_loss)]
                let avg_duration_ms =
                    candidate.total_duration_ms as f64 / candidate.occurrences as f64;
                PredictedStep {
                    step_id,
                    step_type: candidate.step_type,
                    domain: candidate.domain,
                    action: candidate.action,
                    occurrences: candidate.occurrences,
                    avg_duration_ms,
                    occurrence_rate: rate,
                    bucket,
                    score,
                }
            })
            .collect();
        predicted.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        predicted.truncate(limit);
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Debug,
                "prediction.served",
                json!({
                    "signature": signature.as_str(),
                    "matching_sequences": matching,
                    "predictions": predicted.len(),
                }),
            );
        }
        predicted
    }

    /// Suggests structural adaptations for a plan before it executes.
    #[must_use]
    pub fn suggest_adaptations(
        &self,
        plan_id: &str,
        steps: &[StepSnapshot],
    ) -> Vec<ExecutionAdaptation> {
        let mut adaptations = Vec::new();
        self.suggest_parallelism(plan_id, steps, &mut adaptations);
        self.suggest_caching(plan_id, steps, &mut adaptations);
        self.suggest_reservations(plan_id, steps, &mut adaptations);
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(
                LogLevel::Debug,
                "adaptations.suggested",
                json!({ "plan_id": plan_id, "count": adaptations.len() }),
            );
        }
        adaptations
    }

    fn suggest_parallelism(
        &self,
        plan_id: &str,
        steps: &[StepSnapshot],
        out: &mut Vec<ExecutionAdaptation>,
    ) {
        let mut groups: IndexMap<&str, Vec<&StepSnapshot>> = IndexMap::new();
        for step in steps {
            groups.entry(step.domain.as_str()).or_default().push(step);
        }
        for (domain, group) in &groups {
            if group.len() < 2 || group.iter().any(|step| step.has_dependencies) {
                continue;
            }
            let durations: Vec<f64> = group
                .iter()
                .map(|step| self.ledger.average(&step.domain, &step.action))
                .collect();
            let sequential: f64 = durations.iter().sum();
            let parallel = durations.iter().copied().fold(0.0_f64, f64::max);
            if sequential <= 0.0 {
                continue;
            }
            let improvement = (sequential - parallel) / sequential;
            if improvement <= self.config.min_parallel_improvement {
                continue;
            }
            let priority = if improvement > self.config.high_priority_improvement {
                AdaptationPriority::High
            } else {
                AdaptationPriority::Medium
            };
            out.push(ExecutionAdaptation {
                plan_id: plan_id.to_string(),
                kind: AdaptationKind::Parallelize,
                priority,
                affected_steps: group.iter().map(|step| step.id.clone()).collect(),
                domains: vec![(*domain).to_string()],
                estimated_improvement: improvement,
                description: format!(
                    "run {} independent {domain} steps concurrently (~{:.0}% faster)",
                    group.len(),
                    improvement * 100.0
                ),
            });
        }
    }

    fn suggest_caching(
        &self,
        plan_id: &str,
        steps: &[StepSnapshot],
        out: &mut Vec<ExecutionAdaptation>,
    ) {
        for step in steps {
            if !step.action.ends_with("_search") {
                continue;
            }
            out.push(ExecutionAdaptation {
                plan_id: plan_id.to_string(),
                kind: AdaptationKind::CacheResults,
                priority: AdaptationPriority::Medium,
                affected_steps: vec![step.id.clone()],
                domains: vec![step.domain.clone()],
                estimated_improvement: self.config.cache_improvement,
                description: format!(
                    "cache results of `{}`; repeated searches tend to hit the same data",
                    step.id
                ),
            });
        }
    }

    fn suggest_reservations(
        &self,
        plan_id: &str,
        steps: &[StepSnapshot],
        out: &mut Vec<ExecutionAdaptation>,
    ) {
        let mut touched: Vec<String> = Vec::new();
        for step in steps {
            if self
                .config
                .reservable_domains
                .iter()
                .any(|domain| domain == &step.domain)
                && !touched.contains(&step.domain)
            {
                touched.push(step.domain.clone());
            }
        }
        if touched.is_empty() {
            return;
        }
        out.push(ExecutionAdaptation {
            plan_id: plan_id.to_string(),
            kind: AdaptationKind::PreallocateResources,
            priority: AdaptationPriority::Medium,
            affected_steps: Vec::new(),
            domains: touched.clone(),
            estimated_improvement: self.config.reservation_improvement,
            description: format!(
                "pre-allocate rate-limit quota for: {}",
                touched.join(", ")
            ),
        });
    }
}
