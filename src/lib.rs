//! # Evolve NEAT
//!
//! A multi-objective NeuroEvolution of Augmenting Topologies (NEAT) engine
//! for training controllers that are scored by an external simulator.
//!
//! ## Features
//!
//! - **Innovation Tracking**: a run-wide [`InnovationTracker`] numbers every
//!   structural edge, so identical mutations in one generation line up in
//!   crossover
//! - **Speciation**: compatibility distance over excess, disjoint and matching
//!   genes, with persistent species representatives
//! - **Multi-Objective Fitness**: weighted-sum or NSGA-II Pareto ranking,
//!   selected by configuration
//! - **Evaluation Barrier**: an [`Evaluator`] trait for the external
//!   environment, evaluated in parallel with Rayon (`parallel` feature)
//! - **Checkpoints**: JSON snapshots of population and counters that resume
//!   without innovation collisions
//!
//! ## Quick Start
//!
//! ```rust
//! use evolve_neat::{
//!     EpisodeParams, EvaluationError, Evolution, Genome, LogTracker, NeatConfig, ObjectiveScores,
//! };
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! // Reward genomes for growing enabled connections.
//! fn evaluate(genome: &Genome, _: &EpisodeParams) -> Result<ObjectiveScores, EvaluationError> {
//!     let size = genome.num_enabled_connections() as f64;
//!     Ok([("territory", size), ("progression", 0.0), ("survival", 1.0)]
//!         .into_iter()
//!         .collect())
//! }
//!
//! let mut config = NeatConfig::minimal(4, 2);
//! config.population_size = 10;
//! config.max_generations = 3;
//!
//! let mut evolution = Evolution::new(config, ChaCha8Rng::seed_from_u64(42)).unwrap();
//! let summary = evolution.run(&evaluate, LogTracker).unwrap();
//! assert_eq!(summary.generations, 3);
//! ```
//!
//! ## Driving a generation by hand
//!
//! When evaluation happens elsewhere (separate processes, a job queue), the
//! caller feeds results back one genome at a time:
//!
//! ```rust
//! use evolve_neat::{Evolution, NeatConfig, ObjectiveScores};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut config = NeatConfig::minimal(2, 1);
//! config.population_size = 6;
//! let mut evolution = Evolution::new(config, ChaCha8Rng::seed_from_u64(7)).unwrap();
//!
//! evolution.begin_evaluation().unwrap();
//! for index in 0..evolution.population().len() {
//!     let scores: ObjectiveScores = [("survival", index as f64)].into_iter().collect();
//!     evolution.record_evaluation(index, Ok(scores)).unwrap();
//! }
//! evolution.speciate().unwrap();
//! let report = evolution.report().unwrap();
//! evolution.reproduce().unwrap();
//!
//! assert!((report.best_fitness - 1.0).abs() < 1e-12);
//! assert_eq!(evolution.generation(), 1);
//! ```
//!
//! ## Architecture
//!
//! ### Innovation numbers
//!
//! Node ids and connection innovations come from counters owned by the
//! driver. Within a generation the tracker caches the innovation of each
//! `(from, to)` pair, so two genomes that grow the same edge receive the same
//! number. The cache is cleared when reproduction starts.
//!
//! ### Genome storage
//!
//! Genomes are flat vectors of node and connection genes addressed by stable
//! ids, which keeps them trivially serializable as the JSON document handed
//! to the evaluator.

pub mod checkpoint;
pub mod config;
pub mod crossover;
pub mod evaluation;
pub mod evolution;
pub mod fitness;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod mutation;
pub mod species;
pub mod tracker;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointError};
pub use config::{
    ConfigError, Difficulty, EpisodeConfig, FitnessConfig, GenomeConfig, MapSize, MutationConfig,
    NeatConfig, ReproductionConfig, SpeciationConfig, TiePolicy,
};
pub use crossover::{crossover, fitter_first};
pub use evaluation::{evaluate_episodes, EpisodeParams, EvaluationError, Evaluator, ObjectiveScores};
pub use evolution::{Evolution, EvolutionError, EvolutionState, RunSummary, TerminationReason};
pub use fitness::{
    crowding_distance, dominates, non_dominated_sort, pareto_order, select_survivors,
    weighted_sum, FitnessMode, MissingFitness, Objective, Ranking,
};
pub use gene::{ConnectionGene, NodeGene, NodeKind};
pub use genome::{Genome, GenomeError};
pub use innovation::{InnovationError, InnovationTracker, IoLayout};
pub use species::{compatibility_distance, Species, SpeciesSet};
pub use tracker::{GenerationReport, GenomeReport, LogTracker, Tracker};
