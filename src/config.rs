//! Run configuration.
//!
//! Every recognised option is a typed field on [`NeatConfig`] or one of its
//! sections. Configurations are usually read from TOML:
//!
//! ```toml
//! population_size = 100
//! max_generations = 100
//!
//! [speciation]
//! compatibility_threshold = 3.5
//! c3 = 0.4
//!
//! [fitness]
//! mode = "pareto"
//! ```
//!
//! Missing keys fall back to [`Default`]; unknown keys are rejected.
//! [`NeatConfig::validate`] checks every range once at load time so the
//! engine never has to re-check them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fitness::{FitnessMode, MissingFitness, Objective};

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} = {value} is out of range, expected {expected}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("elite_count ({elite_count}) must be smaller than population_size ({population_size})")]
    TooManyElites {
        elite_count: usize,
        population_size: usize,
    },
    #[error("at least one objective must be configured")]
    NoObjectives,
    #[error("objective {0:?} is configured more than once")]
    DuplicateObjective(String),
}

/// Shape of the genomes in the initial population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenomeConfig {
    /// Number of input nodes (observation size).
    pub input_size: usize,
    /// Number of output nodes (action size).
    pub output_size: usize,
    /// Probability of each input/output pair being connected at creation.
    pub connect_probability: f64,
    /// Initial and replacement weights are drawn from
    /// `[-initial_weight_range, initial_weight_range]`.
    pub initial_weight_range: f32,
    /// Weights are clamped to `[-weight_clamp, weight_clamp]`.
    pub weight_clamp: f32,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            input_size: 93,
            output_size: 13,
            connect_probability: 0.1,
            initial_weight_range: 2.0,
            weight_clamp: 10.0,
        }
    }
}

/// Mutation rates and structural policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationConfig {
    /// Probability that a genome's weights are mutated.
    pub weight_mutation_rate: f64,
    /// Scale of a weight perturbation: `weight += U(-1, 1) * power`.
    pub weight_mutation_power: f32,
    /// Within a weight mutation, probability of perturbing rather than
    /// replacing each weight.
    pub weight_perturb_prob: f64,
    /// Probability of splitting a connection with a new hidden node.
    pub add_node_rate: f64,
    /// Probability of adding a new connection.
    pub add_connection_rate: f64,
    /// Random pair draws before add-connection gives up.
    pub max_connection_attempts: usize,
    /// Allow `b -> a` when `a -> b` already exists.
    pub allow_recurrent: bool,
    /// Allow `a -> a`.
    pub allow_self_loops: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            weight_mutation_rate: 0.8,
            weight_mutation_power: 1.0,
            weight_perturb_prob: 0.9,
            add_node_rate: 0.03,
            add_connection_rate: 0.05,
            max_connection_attempts: 20,
            allow_recurrent: false,
            allow_self_loops: false,
        }
    }
}

/// Compatibility distance coefficients and the species threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeciationConfig {
    /// Genomes closer than this to a representative join its species.
    pub compatibility_threshold: f64,
    /// Excess gene coefficient.
    pub c1: f64,
    /// Disjoint gene coefficient.
    pub c2: f64,
    /// Mean weight difference coefficient.
    pub c3: f64,
    /// When both genomes have fewer connections than this, gene counts are
    /// not normalized by genome size.
    pub normalize_threshold: usize,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            compatibility_threshold: 3.0,
            c1: 1.0,
            c2: 1.0,
            c3: 0.5,
            normalize_threshold: 20,
        }
    }
}

/// How crossover treats non-matching genes when both parents score the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Only the designated fitter parent (shorter genome on ties)
    /// contributes disjoint and excess genes.
    #[default]
    FitterOnly,
    /// Both parents contribute disjoint and excess genes.
    Union,
}

/// Selection and reproduction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReproductionConfig {
    /// Genomes copied unchanged into the next generation.
    pub elite_count: usize,
    /// Fraction of the population eligible to become a parent: the top of
    /// each species under weighted sum, the NSGA-II survivor quota under
    /// Pareto ranking.
    pub survival_threshold: f64,
    /// Genomes drawn per tournament.
    pub tournament_size: usize,
    /// Probability that an offspring is produced by crossover rather than
    /// cloning.
    pub sexual_reproduction_prob: f64,
    /// Probability that a matching gene disabled in either parent stays
    /// disabled in the child.
    pub disabled_inherit_prob: f64,
    /// Probability that the second parent is drawn from another species,
    /// chosen uniformly, instead of the first parent's species.
    pub interspecies_mating_rate: f64,
    /// Generations a species may go without improving its best member
    /// before it stops receiving offspring. The species holding the
    /// generation's champion is exempt.
    pub stagnation_threshold: usize,
    /// Crossover behaviour for equally fit parents.
    pub tie_policy: TiePolicy,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            elite_count: 2,
            survival_threshold: 0.2,
            tournament_size: 3,
            sexual_reproduction_prob: 0.75,
            disabled_inherit_prob: 0.75,
            interspecies_mating_rate: 0.001,
            stagnation_threshold: 15,
            tie_policy: TiePolicy::FitterOnly,
        }
    }
}

/// Objectives and how they are reduced for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitnessConfig {
    /// Weighted sum or Pareto ranking.
    pub mode: FitnessMode,
    /// Named objectives in fitness-vector order.
    pub objectives: Vec<Objective>,
    /// Treatment of genomes without an evaluation result.
    pub missing: MissingFitness,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            mode: FitnessMode::WeightedSum,
            objectives: vec![
                Objective::new("territory", 0.4),
                Objective::new("progression", 0.4),
                Objective::new("survival", 0.2),
            ],
            missing: MissingFitness::Zero,
        }
    }
}

/// Size of the generated map an episode is played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapSize {
    #[default]
    Small,
    Medium,
    Large,
}

/// Strength of the scripted opponents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Parameters forwarded to the evaluator for every episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpisodeConfig {
    /// Simulation ticks per episode.
    pub max_episode_ticks: u32,
    /// The controller acts every `action_interval` ticks.
    pub action_interval: u32,
    pub map_size: MapSize,
    pub difficulty: Difficulty,
    /// Play without scripted opponents.
    pub disable_opponents: bool,
    /// Episodes played per genome; objective scores are averaged.
    pub eval_episodes: usize,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            max_episode_ticks: 1800,
            action_interval: 30,
            map_size: MapSize::Small,
            difficulty: Difficulty::Easy,
            disable_opponents: false,
            eval_episodes: 1,
        }
    }
}

/// Configuration for a NEAT run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeatConfig {
    /// Number of genomes per generation, held constant.
    pub population_size: usize,
    /// Hard limit on the number of generations.
    pub max_generations: usize,
    /// Stop after this many generations without a new best aggregate fitness.
    pub early_stop_generations: usize,
    /// Where `run` writes checkpoints; `None` disables them.
    pub checkpoint_dir: Option<PathBuf>,
    pub genome: GenomeConfig,
    pub mutation: MutationConfig,
    pub speciation: SpeciationConfig,
    pub reproduction: ReproductionConfig,
    pub fitness: FitnessConfig,
    pub episode: EpisodeConfig,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            max_generations: 10,
            early_stop_generations: 20,
            checkpoint_dir: None,
            genome: GenomeConfig::default(),
            mutation: MutationConfig::default(),
            speciation: SpeciationConfig::default(),
            reproduction: ReproductionConfig::default(),
            fitness: FitnessConfig::default(),
            episode: EpisodeConfig::default(),
        }
    }
}

impl NeatConfig {
    /// A small config for tests and experiments.
    #[must_use]
    pub fn minimal(input_size: usize, output_size: usize) -> Self {
        Self {
            genome: GenomeConfig {
                input_size,
                output_size,
                connect_probability: 1.0,
                ..GenomeConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Number of objectives in every fitness vector.
    #[must_use]
    pub fn num_objectives(&self) -> usize {
        self.fitness.objectives.len()
    }

    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("population_size", self.population_size as f64)?;
        check_positive("max_generations", self.max_generations as f64)?;
        check_positive("genome.input_size", self.genome.input_size as f64)?;
        check_positive("genome.output_size", self.genome.output_size as f64)?;
        check_probability("genome.connect_probability", self.genome.connect_probability)?;
        check_positive(
            "genome.initial_weight_range",
            f64::from(self.genome.initial_weight_range),
        )?;
        check_positive("genome.weight_clamp", f64::from(self.genome.weight_clamp))?;

        let m = &self.mutation;
        check_probability("mutation.weight_mutation_rate", m.weight_mutation_rate)?;
        check_positive(
            "mutation.weight_mutation_power",
            f64::from(m.weight_mutation_power),
        )?;
        check_probability("mutation.weight_perturb_prob", m.weight_perturb_prob)?;
        check_probability("mutation.add_node_rate", m.add_node_rate)?;
        check_probability("mutation.add_connection_rate", m.add_connection_rate)?;

        let s = &self.speciation;
        check_positive(
            "speciation.compatibility_threshold",
            s.compatibility_threshold,
        )?;
        check_non_negative("speciation.c1", s.c1)?;
        check_non_negative("speciation.c2", s.c2)?;
        check_non_negative("speciation.c3", s.c3)?;

        let r = &self.reproduction;
        if r.elite_count >= self.population_size {
            return Err(ConfigError::TooManyElites {
                elite_count: r.elite_count,
                population_size: self.population_size,
            });
        }
        if !(r.survival_threshold > 0.0 && r.survival_threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "reproduction.survival_threshold",
                value: r.survival_threshold,
                expected: "(0, 1]",
            });
        }
        check_positive("reproduction.tournament_size", r.tournament_size as f64)?;
        check_probability(
            "reproduction.sexual_reproduction_prob",
            r.sexual_reproduction_prob,
        )?;
        check_probability(
            "reproduction.disabled_inherit_prob",
            r.disabled_inherit_prob,
        )?;
        check_probability(
            "reproduction.interspecies_mating_rate",
            r.interspecies_mating_rate,
        )?;

        if self.fitness.objectives.is_empty() {
            return Err(ConfigError::NoObjectives);
        }
        for (i, objective) in self.fitness.objectives.iter().enumerate() {
            if !objective.weight.is_finite() {
                return Err(ConfigError::OutOfRange {
                    field: "fitness.objectives.weight",
                    value: objective.weight,
                    expected: "a finite number",
                });
            }
            if self.fitness.objectives[..i]
                .iter()
                .any(|o| o.name == objective.name)
            {
                return Err(ConfigError::DuplicateObjective(objective.name.clone()));
            }
        }

        check_positive("episode.eval_episodes", self.episode.eval_episodes as f64)?;
        check_positive(
            "episode.max_episode_ticks",
            f64::from(self.episode.max_episode_ticks),
        )?;
        Ok(())
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "[0, 1]",
        })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "> 0",
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: ">= 0",
        })
    }
}
