use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::module::{PatternObservation, PatternSignature};

/// Tunable knobs for cluster formation and joining.
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Minimum weighted similarity required to join an existing cluster.
    pub join_threshold: f64,
    /// Confidence assigned to a freshly created cluster.
    pub seed_confidence: f64,
    /// Confidence added on every join, capped at 1.0.
    pub join_increment: f64,
    /// Durations above this mark a pattern as time-sensitive (milliseconds).
    pub time_sensitive_ms: f64,
    /// Complexity above this marks a pattern as complex.
    pub complex_threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            join_threshold: 0.7,
            seed_confidence: 0.7,
            join_increment: 0.05,
            time_sensitive_ms: 1000.0,
            complex_threshold: 0.6,
        }
    }
}

/// Representative center of a cluster, derived from its founding observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterCentroid {
    /// Founding intent.
    pub intent: String,
    /// Founding domain set.
    pub domains: Vec<String>,
    /// Representative duration (milliseconds).
    pub avg_duration_ms: f64,
    /// Representative success rate.
    pub success_rate: f64,
    /// Representative complexity.
    pub complexity: f64,
}

/// Derived boolean characteristics of a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterTraits {
    /// The founding observation spanned more than one domain.
    pub multi_domain: bool,
    /// Complexity exceeded the configured threshold.
    pub complex: bool,
    /// Duration exceeded the time-sensitivity threshold.
    pub time_sensitive: bool,
}

/// One unsupervised pattern cluster. Created when nothing similar exists,
/// mutated on every join, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCluster {
    /// Cluster identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Number of observations that joined.
    pub member_count: u64,
    /// Representative centroid.
    pub centroid: ClusterCentroid,
    /// Aggregate confidence in `[0, 1]`.
    pub confidence: f64,
    /// Derived characteristics.
    pub traits: ClusterTraits,
    /// Signatures that have joined this cluster.
    pub signatures: HashSet<PatternSignature>,
}

impl PatternCluster {
    fn seeded(
        signature: &PatternSignature,
        observation: &PatternObservation,
        config: &ClusteringConfig,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let duration = observation.duration_ms as f64;
        let complexity = observation.complexity_or_default();
        Self {
            id: Uuid::new_v4(),
            name: format!(
                "{} over {}",
                observation.intent,
                observation.domains.join("+")
            ),
            member_count: 1,
            centroid: ClusterCentroid {
                intent: observation.intent.clone(),
                domains: observation.domains.clone(),
                avg_duration_ms: duration,
                success_rate: if observation.success { 1.0 } else { 0.0 },
                complexity,
            },
            confidence: config.seed_confidence,
            traits: ClusterTraits {
                multi_domain: observation.domains.len() > 1,
                complex: complexity > config.complex_threshold,
                time_sensitive: duration > config.time_sensitive_ms,
            },
            signatures: HashSet::from([signature.clone()]),
        }
    }

    fn join(&mut self, increment: f64) {
        self.member_count += 1;
        self.confidence = (self.confidence + increment).min(1.0);
    }
}

/// Result of assigning an observation to a cluster.
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    /// Cluster identifier.
    pub id: Uuid,
    /// Cluster name.
    pub name: String,
    /// Member count after this assignment.
    pub member_count: u64,
    /// Confidence after this assignment.
    pub confidence: f64,
    /// Cluster characteristics.
    pub traits: ClusterTraits,
    /// Whether the assignment created a new cluster.
    pub newly_created: bool,
}

fn summarize(cluster: &PatternCluster, newly_created: bool) -> ClusterSummary {
    ClusterSummary {
        id: cluster.id,
        name: cluster.name.clone(),
        member_count: cluster.member_count,
        confidence: cluster.confidence,
        traits: cluster.traits,
        newly_created,
    }
}

/// Incrementally built set of pattern clusters.
#[derive(Debug, Default)]
pub struct ClusterIndex {
    config: ClusteringConfig,
    clusters: RwLock<Vec<PatternCluster>>,
}

impl ClusterIndex {
    /// Creates an index with custom configuration.
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            clusters: RwLock::new(Vec::new()),
        }
    }

    /// Assigns an observation to a cluster. Exact-signature history wins over
    /// similarity search: once a signature joined a cluster it always rejoins
    /// it. Otherwise the most similar cluster above the join threshold is
    /// used, and failing that a new cluster is created.
    pub fn assign(
        &self,
        signature: &PatternSignature,
        observation: &PatternObservation,
    ) -> ClusterSummary {
        let mut clusters = self.clusters.write();
        if let Some(cluster) = clusters
            .iter_mut()
            .find(|cluster| cluster.signatures.contains(signature))
        {
            cluster.join(self.config.join_increment);
            return summarize(cluster, false);
        }
        let mut best: Option<(usize, f64)> = None;
        for (idx, cluster) in clusters.iter().enumerate() {
            let score = similarity(observation, &cluster.centroid);
            if best.map_or(true, |(_, current)| score > current) {
                best = Some((idx, score));
            }
        }
        if let Some((idx, score)) = best {
            if score > self.config.join_threshold {
                let cluster = &mut clusters[idx];
                cluster.join(self.config.join_increment);
                cluster.signatures.insert(signature.clone());
                return summarize(cluster, false);
            }
        }
        let cluster = PatternCluster::seeded(signature, observation, &self.config);
        let summary = summarize(&cluster, true);
        clusters.push(cluster);
        summary
    }

    /// Snapshot of all clusters.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PatternCluster> {
        self.clusters.read().clone()
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// Whether any clusters exist yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}

/// Weighted similarity between an observation and a centroid, normalized by
/// the weights that were applicable. The duration component is skipped (and
/// its weight excluded from the denominator) when either duration is
/// non-positive.
#[must_use]
pub fn similarity(observation: &PatternObservation, centroid: &ClusterCentroid) -> f64 {
    let mut score = 0.0;
    let mut applicable = 0.0;

    applicable += 0.3;
    if observation.intent == centroid.intent {
        score += 0.3;
    }

    applicable += 0.3;
    score += jaccard(&observation.domains, &centroid.domains) * 0.3;

    #[allow(clippy::cast_precision_loss)]
    let duration = observation.duration_ms as f64;
    if duration > 0.0 && centroid.avg_duration_ms > 0.0 {
        applicable += 0.2;
        let spread = (duration - centroid.avg_duration_ms).abs()
            / duration.max(centroid.avg_duration_ms);
        score += (1.0 - spread.min(1.0)) * 0.2;
    }

    applicable += 0.2;
    if observation.success == (centroid.success_rate >= 0.5) {
        score += 0.2;
    }

    (score / applicable).clamp(0.0, 1.0)
}

fn jaccard(left: &[String], right: &[String]) -> f64 {
    let left: HashSet<&str> = left.iter().map(String::as_str).collect();
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    let intersection = left.intersection(&right).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = intersection as f64 / union as f64;
    ratio
}
