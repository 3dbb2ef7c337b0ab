//! Experiment tracking boundary.
//!
//! The driver reports every evaluated genome and a summary of every
//! generation to a [`Tracker`]. Sweep orchestration and dashboards live
//! outside the crate; [`LogTracker`] forwards the reports to `tracing`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::evaluation::ObjectiveScores;

/// Per-genome metrics for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeReport {
    pub genome_id: Uuid,
    /// Position of the genome in the population.
    pub index: usize,
    pub species_id: Option<usize>,
    pub objectives: ObjectiveScores,
    pub aggregate_fitness: f64,
    pub evaluated: bool,
    pub num_nodes: usize,
    pub num_enabled_connections: usize,
}

/// Summary of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    /// Best aggregate fitness in this generation.
    pub best_fitness: f64,
    /// Mean aggregate fitness over the population.
    pub mean_fitness: f64,
    /// Best aggregate fitness seen so far in the run.
    pub best_ever_fitness: f64,
    pub generations_without_improvement: usize,
    pub species_count: usize,
    /// Number of Pareto fronts among evaluated genomes.
    pub num_fronts: usize,
    pub pareto_front_size: usize,
    /// Genomes that produced no evaluation result.
    pub unevaluated: usize,
    pub genomes: Vec<GenomeReport>,
}

impl GenerationReport {
    /// Report of the best genome by aggregate fitness.
    #[must_use]
    pub fn champion(&self) -> Option<&GenomeReport> {
        self.genomes
            .iter()
            .max_by(|a, b| a.aggregate_fitness.total_cmp(&b.aggregate_fitness))
    }
}

/// Sink for run metrics.
pub trait Tracker {
    /// Called once per genome after the evaluation barrier.
    fn record_genome(&mut self, generation: usize, report: &GenomeReport);

    /// Called once per generation after speciation.
    fn record_generation(&mut self, report: &GenerationReport);
}

/// Tracker that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracker;

impl Tracker for LogTracker {
    fn record_genome(&mut self, generation: usize, report: &GenomeReport) {
        debug!(
            generation,
            genome = %report.genome_id,
            index = report.index,
            species = ?report.species_id,
            aggregate = report.aggregate_fitness,
            objectives = ?report.objectives,
            evaluated = report.evaluated,
            "genome evaluated"
        );
    }

    fn record_generation(&mut self, report: &GenerationReport) {
        info!(
            generation = report.generation,
            best = report.best_fitness,
            mean = report.mean_fitness,
            best_ever = report.best_ever_fitness,
            stale = report.generations_without_improvement,
            species = report.species_count,
            fronts = report.num_fronts,
            front_size = report.pareto_front_size,
            unevaluated = report.unevaluated,
            "generation complete"
        );
    }
}

impl<T: Tracker + ?Sized> Tracker for &mut T {
    fn record_genome(&mut self, generation: usize, report: &GenomeReport) {
        (**self).record_genome(generation, report);
    }

    fn record_generation(&mut self, report: &GenerationReport) {
        (**self).record_generation(report);
    }
}
