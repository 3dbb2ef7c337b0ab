//! The evaluator boundary.
//!
//! The engine never computes fitness. An [`Evaluator`] plays a genome in the
//! external environment and reports one score per named objective. Each
//! genome is played for `eval_episodes` episodes on freshly seeded maps; the
//! per-objective scores of the successful episodes are averaged.
//!
//! Evaluators must be [`Send`] and [`Sync`]: with the `parallel` feature the
//! driver evaluates the population across Rayon worker threads.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{Difficulty, EpisodeConfig, MapSize};
use crate::genome::Genome;

/// Why an episode produced no scores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("episode timed out after {0:?}")]
    Timeout(Duration),
    #[error("episode finished without writing metrics")]
    NoMetrics,
    #[error("episode failed: {0}")]
    Failed(String),
}

/// Scores reported by the evaluator, keyed by objective name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectiveScores(BTreeMap<String, f64>);

impl ObjectiveScores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, objective: impl Into<String>, score: f64) {
        self.0.insert(objective.into(), score);
    }

    #[must_use]
    pub fn get(&self, objective: &str) -> Option<f64> {
        self.0.get(objective).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Per-objective mean over `episodes`. An objective missing from an
    /// episode counts as zero for that episode.
    #[must_use]
    pub fn mean(episodes: &[ObjectiveScores]) -> Option<Self> {
        if episodes.is_empty() {
            return None;
        }
        let n = episodes.len() as f64;
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for episode in episodes {
            for (name, score) in &episode.0 {
                *sums.entry(name.clone()).or_insert(0.0) += score;
            }
        }
        Some(Self(
            sums.into_iter().map(|(name, sum)| (name, sum / n)).collect(),
        ))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ObjectiveScores {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Run parameters for a single episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeParams {
    pub max_episode_ticks: u32,
    pub action_interval: u32,
    pub map_size: MapSize,
    pub difficulty: Difficulty,
    pub disable_opponents: bool,
    /// Seed of the generated map.
    pub map_seed: u64,
    /// Index of this episode within the genome's evaluation.
    pub episode: usize,
}

impl EpisodeParams {
    #[must_use]
    pub fn new(config: &EpisodeConfig, map_seed: u64, episode: usize) -> Self {
        Self {
            max_episode_ticks: config.max_episode_ticks,
            action_interval: config.action_interval,
            map_size: config.map_size,
            difficulty: config.difficulty,
            disable_opponents: config.disable_opponents,
            map_seed,
            episode,
        }
    }
}

/// Plays a genome in the external environment.
pub trait Evaluator: Send + Sync {
    /// Play one episode and report the objective scores.
    fn evaluate(
        &self,
        genome: &Genome,
        params: &EpisodeParams,
    ) -> Result<ObjectiveScores, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&Genome, &EpisodeParams) -> Result<ObjectiveScores, EvaluationError> + Send + Sync,
{
    fn evaluate(
        &self,
        genome: &Genome,
        params: &EpisodeParams,
    ) -> Result<ObjectiveScores, EvaluationError> {
        self(genome, params)
    }
}

/// Play one episode per entry of `map_seeds` and average the results.
///
/// Failed episodes are logged and skipped. When every episode fails the last
/// error is returned.
pub fn evaluate_episodes<E: Evaluator + ?Sized>(
    evaluator: &E,
    genome: &Genome,
    config: &EpisodeConfig,
    map_seeds: &[u64],
) -> Result<ObjectiveScores, EvaluationError> {
    let mut successes = Vec::with_capacity(map_seeds.len());
    let mut last_error = EvaluationError::NoMetrics;

    for (episode, &seed) in map_seeds.iter().enumerate() {
        let params = EpisodeParams::new(config, seed, episode);
        match evaluator.evaluate(genome, &params) {
            Ok(scores) => successes.push(scores),
            Err(err) => {
                warn!(genome = %genome.id, episode, %err, "episode failed");
                last_error = err;
            }
        }
    }

    ObjectiveScores::mean(&successes).ok_or(last_error)
}
