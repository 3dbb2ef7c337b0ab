//! The evolution driver.
//!
//! [`Evolution`] owns the population, the species, the run's
//! [`InnovationTracker`] and the RNG, and moves them through one generation
//! at a time:
//!
//! ```text
//! Initialized -> Evaluating -> Speciated -> Reproducing -> Evaluating -> ...
//!                                  \-> Terminated
//! ```
//!
//! Evaluation is the barrier between generations: every result for the
//! current population is written back before [`Evolution::speciate`] runs.
//! Genomes without a result are ranked as worst rather than aborting the
//! run. Calling an operation out of order is an [`EvolutionError::InvalidState`].

use std::fmt;
use std::path::PathBuf;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::checkpoint::{Checkpoint, CheckpointError};
use crate::config::{ConfigError, NeatConfig, ReproductionConfig};
use crate::crossover::crossover;
use crate::evaluation::{evaluate_episodes, EvaluationError, Evaluator, ObjectiveScores};
use crate::fitness::{non_dominated_sort, FitnessMode, Ranking};
use crate::genome::{Genome, GenomeError};
use crate::innovation::{InnovationError, InnovationTracker};
use crate::species::{Species, SpeciesSet};
use crate::tracker::{GenerationReport, GenomeReport, Tracker};

/// Upper bound (exclusive) of the map seeds handed to the evaluator.
const MAP_SEED_RANGE: u64 = 1_000_000;

/// Phase of the generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionState {
    /// Population created or resumed, nothing evaluated yet.
    Initialized,
    /// Collecting evaluation results.
    Evaluating,
    /// Fitness barrier passed and species assigned.
    Speciated,
    /// A new generation was produced and awaits evaluation.
    Reproducing,
    Terminated,
}

impl fmt::Display for EvolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Evaluating => "evaluating",
            Self::Speciated => "speciated",
            Self::Reproducing => "reproducing",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("cannot {operation} while {actual}")]
    InvalidState {
        operation: &'static str,
        actual: EvolutionState,
    },
    #[error("genome index {index} is out of range for a population of {len}")]
    UnknownGenome { index: usize, len: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `max_generations` generations were evaluated.
    MaxGenerations,
    /// The best aggregate fitness did not improve for more than
    /// `early_stop_generations` generations.
    Stagnation,
}

/// Outcome of [`Evolution::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Number of generations evaluated.
    pub generations: usize,
    pub reason: TerminationReason,
    pub best_fitness: Option<f64>,
    pub best_genome: Option<Genome>,
    /// Checkpoint files written during the run.
    pub checkpoints: Vec<PathBuf>,
}

/// A NEAT run.
#[derive(Debug)]
pub struct Evolution<R: Rng> {
    config: NeatConfig,
    rng: R,
    innovations: InnovationTracker,
    population: Vec<Genome>,
    species: SpeciesSet,
    generation: usize,
    state: EvolutionState,
    best_fitness: Option<f64>,
    best_genome: Option<Genome>,
    stale_generations: usize,
    improved: bool,
}

impl<R: Rng> Evolution<R> {
    /// Validate `config` and create the initial population.
    pub fn new(config: NeatConfig, mut rng: R) -> Result<Self, EvolutionError> {
        config.validate()?;

        let mut innovations = InnovationTracker::new();
        let population = (0..config.population_size)
            .map(|_| Genome::from_config(&config, &mut innovations, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            population = population.len(),
            inputs = config.genome.input_size,
            outputs = config.genome.output_size,
            innovations = innovations.innovation_counter(),
            "initial population created"
        );

        Ok(Self {
            config,
            rng,
            innovations,
            population,
            species: SpeciesSet::new(),
            generation: 0,
            state: EvolutionState::Initialized,
            best_fitness: None,
            best_genome: None,
            stale_generations: 0,
            improved: false,
        })
    }

    /// Continue a run from `checkpoint`.
    ///
    /// Counters, species and improvement tracking are restored; the
    /// checkpointed population is evaluated again as the current generation.
    pub fn resume(
        config: NeatConfig,
        checkpoint: Checkpoint,
        rng: R,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;
        checkpoint.validate()?;

        let layout = checkpoint
            .io_layout()
            .ok_or(CheckpointError::EmptyPopulation)?;
        if layout.inputs.len() != config.genome.input_size
            || layout.outputs.len() != config.genome.output_size
        {
            return Err(GenomeError::Layout(InnovationError::LayoutMismatch {
                inputs: layout.inputs.len(),
                outputs: layout.outputs.len(),
                requested_inputs: config.genome.input_size,
                requested_outputs: config.genome.output_size,
            })
            .into());
        }
        if checkpoint.population.len() != config.population_size {
            warn!(
                checkpointed = checkpoint.population.len(),
                configured = config.population_size,
                "population size changes at the next reproduction"
            );
        }

        let mut innovations =
            InnovationTracker::from_counters(checkpoint.node_counter, checkpoint.innovation_counter);
        innovations.restore_layout(layout);

        info!(
            generation = checkpoint.generation,
            population = checkpoint.population.len(),
            species = checkpoint.species.len(),
            "resuming from checkpoint"
        );

        Ok(Self {
            config,
            rng,
            innovations,
            population: checkpoint.population,
            species: SpeciesSet::restore(checkpoint.species),
            generation: checkpoint.generation,
            state: EvolutionState::Initialized,
            best_fitness: checkpoint.best_ever_fitness,
            best_genome: None,
            stale_generations: checkpoint.generations_without_improvement,
            improved: false,
        })
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[EvolutionState],
    ) -> Result<(), EvolutionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EvolutionError::InvalidState {
                operation,
                actual: self.state,
            })
        }
    }

    /// Clear fitness and start collecting results for the current generation.
    pub fn begin_evaluation(&mut self) -> Result<(), EvolutionError> {
        self.expect_state(
            "begin evaluation",
            &[EvolutionState::Initialized, EvolutionState::Reproducing],
        )?;
        for genome in &mut self.population {
            genome.reset_fitness();
        }
        self.state = EvolutionState::Evaluating;
        debug!(generation = self.generation, "evaluation started");
        Ok(())
    }

    /// Write the evaluation result of the genome at `index`.
    ///
    /// A failed evaluation is logged and leaves the genome with the worst
    /// fitness.
    pub fn record_evaluation(
        &mut self,
        index: usize,
        result: Result<ObjectiveScores, EvaluationError>,
    ) -> Result<(), EvolutionError> {
        self.expect_state("record an evaluation", &[EvolutionState::Evaluating])?;
        let len = self.population.len();
        let genome = self
            .population
            .get_mut(index)
            .ok_or(EvolutionError::UnknownGenome { index, len })?;

        match result {
            Ok(scores) => genome.record_scores(&scores, &self.config.fitness.objectives),
            Err(err) => {
                warn!(generation = self.generation, genome = %genome.id, %err, "evaluation failed");
                genome.record_missing(self.config.num_objectives());
            }
        }
        Ok(())
    }

    /// Evaluate the whole population with `evaluator`.
    ///
    /// Each genome plays `eval_episodes` episodes on maps seeded from the
    /// run's RNG. With the `parallel` feature genomes are evaluated on the
    /// Rayon thread pool; results are written back once all are in.
    pub fn evaluate<E: Evaluator + ?Sized>(&mut self, evaluator: &E) -> Result<(), EvolutionError> {
        if self.state != EvolutionState::Evaluating {
            self.begin_evaluation()?;
        }

        let episodes = self.config.episode.eval_episodes;
        let seeds: Vec<Vec<u64>> = (0..self.population.len())
            .map(|_| {
                (0..episodes)
                    .map(|_| self.rng.random_range(0..MAP_SEED_RANGE))
                    .collect()
            })
            .collect();

        let episode_config = &self.config.episode;
        #[cfg(feature = "parallel")]
        let results: Vec<_> = self
            .population
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(genome, seeds)| evaluate_episodes(evaluator, genome, episode_config, seeds))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = self
            .population
            .iter()
            .zip(&seeds)
            .map(|(genome, seeds)| evaluate_episodes(evaluator, genome, episode_config, seeds))
            .collect();

        for (index, result) in results.into_iter().enumerate() {
            self.record_evaluation(index, result)?;
        }
        Ok(())
    }

    /// Close the evaluation barrier and assign species.
    ///
    /// Genomes without a result get the worst fitness. Each species' adjusted
    /// fitness is the mean aggregate fitness of its members, excluded genomes
    /// counting as zero.
    pub fn speciate(&mut self) -> Result<(), EvolutionError> {
        self.expect_state("speciate", &[EvolutionState::Evaluating])?;

        let num_objectives = self.config.num_objectives();
        let mut missing = 0;
        for genome in self.population.iter_mut().filter(|g| !g.evaluated) {
            genome.record_missing(num_objectives);
            missing += 1;
        }
        if missing > 0 {
            warn!(
                generation = self.generation,
                missing,
                policy = ?self.config.fitness.missing,
                "genomes without evaluation result"
            );
        }

        self.species
            .speciate(&mut self.population, self.generation, &self.config.speciation);

        let ranking = self.ranking();
        for species in self.species.iter_mut() {
            let adjusted = species
                .members
                .iter()
                .map(|&m| ranking.score(m))
                .sum::<f64>()
                / species.len() as f64;
            let best = species
                .members
                .iter()
                .map(|&m| self.population[m].aggregate_fitness)
                .fold(f64::NEG_INFINITY, f64::max);
            species.record_fitness(adjusted, best, self.generation);
        }

        self.improved = false;
        if let Some(index) = champion(&self.population) {
            let best = self.population[index].aggregate_fitness;
            if self.best_fitness.map_or(true, |previous| best > previous) {
                self.best_fitness = Some(best);
                self.best_genome = Some(self.population[index].clone());
                self.stale_generations = 0;
                self.improved = true;
            } else {
                self.stale_generations += 1;
            }
        }

        self.state = EvolutionState::Speciated;
        debug!(
            generation = self.generation,
            species = self.species.len(),
            improved = self.improved,
            "speciated"
        );
        Ok(())
    }

    /// Produce the next generation.
    ///
    /// The top `elite_count` genomes by aggregate fitness are carried over
    /// unchanged apart from their fitness. Every other slot is filled by an
    /// offspring: a species is drawn by roulette on adjusted fitness, a
    /// parent by tournament from that species' survivor pool, then either
    /// crossover with a second tournament winner or a clone, followed by
    /// mutation. Species without survivors, and stagnant species other than
    /// the champion's, receive no offspring.
    pub fn reproduce(&mut self) -> Result<(), EvolutionError> {
        self.expect_state("reproduce", &[EvolutionState::Speciated])?;
        self.state = EvolutionState::Reproducing;
        self.innovations.begin_generation();

        let ranking = self.ranking();
        let reproduction = &self.config.reproduction;
        let size = self.config.population_size;
        let mut next = Vec::with_capacity(size);

        for &index in ranking.order().iter().take(reproduction.elite_count) {
            let mut elite = self.population[index].clone();
            elite.reset_fitness();
            next.push(elite);
        }
        let elites = next.len();

        let champion_species = champion(&self.population)
            .and_then(|index| self.population[index].species_id);
        let (mut pools, mut weights) = breeding_species(
            self.species.as_slice(),
            &ranking,
            reproduction,
            self.generation,
            champion_species,
        );
        if pools.is_empty() {
            pools.push(ranking.order().to_vec());
            weights.push(1.0);
        }

        while next.len() < size {
            let home = roulette(&weights, &mut self.rng);
            let first = tournament(
                &pools[home],
                &ranking,
                reproduction.tournament_size,
                &mut self.rng,
            );

            let mut child = if self.rng.random_bool(reproduction.sexual_reproduction_prob) {
                let mate = mate_pool(
                    home,
                    pools.len(),
                    reproduction.interspecies_mating_rate,
                    &mut self.rng,
                );
                let second = tournament(
                    &pools[mate],
                    &ranking,
                    reproduction.tournament_size,
                    &mut self.rng,
                );
                crossover(
                    &self.population[first],
                    &self.population[second],
                    reproduction,
                    &mut self.rng,
                )?
            } else {
                self.population[first].clone_as_offspring(&mut self.rng)
            };

            child.mutate(&self.config, &mut self.innovations, &mut self.rng);
            next.push(child);
        }

        info!(
            generation = self.generation,
            elites,
            offspring = next.len() - elites,
            new_innovations = self.innovations.innovations_this_generation(),
            "reproduced"
        );

        self.population = next;
        self.generation += 1;
        Ok(())
    }

    /// Summarize the current generation.
    pub fn report(&self) -> Result<GenerationReport, EvolutionError> {
        self.expect_state(
            "report",
            &[EvolutionState::Speciated, EvolutionState::Terminated],
        )?;

        let objectives = &self.config.fitness.objectives;
        let genomes: Vec<GenomeReport> = self
            .population
            .iter()
            .enumerate()
            .map(|(index, genome)| GenomeReport {
                genome_id: genome.id,
                index,
                species_id: genome.species_id,
                objectives: objectives
                    .iter()
                    .zip(&genome.fitness)
                    .map(|(o, &score)| (o.name.clone(), score))
                    .collect(),
                aggregate_fitness: genome.aggregate_fitness,
                evaluated: genome.evaluated,
                num_nodes: genome.nodes.len(),
                num_enabled_connections: genome.num_enabled_connections(),
            })
            .collect();

        let evaluated: Vec<&[f64]> = self
            .population
            .iter()
            .filter(|g| g.evaluated)
            .map(|g| g.fitness.as_slice())
            .collect();
        let fronts = non_dominated_sort(&evaluated);

        let total: f64 = self.population.iter().map(|g| g.aggregate_fitness).sum();
        let best = self
            .population
            .iter()
            .map(|g| g.aggregate_fitness)
            .fold(f64::NEG_INFINITY, f64::max);

        Ok(GenerationReport {
            generation: self.generation,
            best_fitness: best,
            mean_fitness: total / self.population.len() as f64,
            best_ever_fitness: self.best_fitness.unwrap_or(best),
            generations_without_improvement: self.stale_generations,
            species_count: self.species.len(),
            num_fronts: fronts.len(),
            pareto_front_size: fronts.first().map_or(0, Vec::len),
            unevaluated: self.population.len() - evaluated.len(),
            genomes,
        })
    }

    /// Whether the run should stop after the current generation.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationReason> {
        if self.stale_generations > self.config.early_stop_generations {
            Some(TerminationReason::Stagnation)
        } else if self.generation + 1 >= self.config.max_generations {
            Some(TerminationReason::MaxGenerations)
        } else {
            None
        }
    }

    /// Stop the run. Only `report` and `checkpoint` remain available.
    pub fn terminate(&mut self) {
        info!(generation = self.generation, best = ?self.best_fitness, "run terminated");
        self.state = EvolutionState::Terminated;
    }

    /// Evaluate, speciate and reproduce until a termination condition holds.
    ///
    /// Each generation is reported to `tracker`. With a `checkpoint_dir`
    /// configured, the population is saved as `best_population_gen{N}.json`
    /// whenever the best aggregate fitness improves and as
    /// `final_population.json` at the end.
    pub fn run<E, T>(&mut self, evaluator: &E, mut tracker: T) -> Result<RunSummary, EvolutionError>
    where
        E: Evaluator + ?Sized,
        T: Tracker,
    {
        let mut checkpoints = Vec::new();

        let reason = loop {
            self.evaluate(evaluator)?;
            self.speciate()?;

            let report = self.report()?;
            for genome in &report.genomes {
                tracker.record_genome(self.generation, genome);
            }
            tracker.record_generation(&report);

            if self.improved {
                let name = format!("best_population_gen{}.json", self.generation);
                checkpoints.extend(self.save_checkpoint(&name)?);
            }
            if let Some(reason) = self.termination() {
                break reason;
            }
            self.reproduce()?;
        };

        self.terminate();
        checkpoints.extend(self.save_checkpoint("final_population.json")?);

        Ok(RunSummary {
            generations: self.generation + 1,
            reason,
            best_fitness: self.best_fitness,
            best_genome: self.best_genome.clone(),
            checkpoints,
        })
    }

    fn save_checkpoint(&self, name: &str) -> Result<Option<PathBuf>, EvolutionError> {
        let Some(dir) = &self.config.checkpoint_dir else {
            return Ok(None);
        };
        let path = dir.join(name);
        self.checkpoint().save(&path)?;
        Ok(Some(path))
    }

    /// Snapshot the run.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            generation: self.generation,
            population: self.population.clone(),
            innovation_counter: self.innovations.innovation_counter(),
            node_counter: self.innovations.node_counter(),
            species: self.species.as_slice().to_vec(),
            best_ever_fitness: self.best_fitness,
            generations_without_improvement: self.stale_generations,
        }
    }

    fn ranking(&self) -> Ranking {
        let quota = (self.population.len() as f64 * self.config.reproduction.survival_threshold)
            .ceil() as usize;
        Ranking::build(
            &self.population,
            self.config.fitness.mode,
            self.config.fitness.missing,
            quota.max(1),
        )
    }

    #[must_use]
    pub fn population(&self) -> &[Genome] {
        &self.population
    }

    #[must_use]
    pub fn species(&self) -> &[Species] {
        self.species.as_slice()
    }

    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> EvolutionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &NeatConfig {
        &self.config
    }

    #[must_use]
    pub fn innovations(&self) -> &InnovationTracker {
        &self.innovations
    }

    /// Best aggregate fitness seen so far.
    #[must_use]
    pub fn best_fitness(&self) -> Option<f64> {
        self.best_fitness
    }

    /// Best genome seen so far, as it was when evaluated.
    #[must_use]
    pub fn best_genome(&self) -> Option<&Genome> {
        self.best_genome.as_ref()
    }

    #[must_use]
    pub fn generations_without_improvement(&self) -> usize {
        self.stale_generations
    }
}

/// Index of the evaluated genome with the highest aggregate fitness, first
/// on ties.
fn champion(population: &[Genome]) -> Option<usize> {
    population
        .iter()
        .enumerate()
        .filter(|(_, genome)| genome.evaluated)
        .fold(None, |best: Option<(usize, f64)>, (index, genome)| match best {
            Some((_, fitness)) if fitness >= genome.aggregate_fitness => best,
            _ => Some((index, genome.aggregate_fitness)),
        })
        .map(|(index, _)| index)
}

/// Parent candidates of each species, best first.
///
/// Only genomes the ranking marks as survivors qualify. Under weighted sum
/// each species then keeps its best `survival_threshold` fraction, at least
/// one member; under Pareto ranking the survivor cut is already global.
fn survivor_pools(
    species: &[Species],
    ranking: &Ranking,
    survival_threshold: f64,
) -> Vec<Vec<usize>> {
    species
        .iter()
        .map(|s| {
            let mut members: Vec<usize> = s
                .members
                .iter()
                .copied()
                .filter(|&m| ranking.is_survivor(m))
                .collect();
            members.sort_by(|&a, &b| ranking.compare(a, b));
            if ranking.mode() == FitnessMode::WeightedSum {
                let keep = ((members.len() as f64 * survival_threshold).ceil() as usize).max(1);
                members.truncate(keep);
            }
            members
        })
        .collect()
}

/// Survivor pools and roulette weights of the species that may reproduce.
///
/// A species needs at least one survivor. A species stagnant for more than
/// `stagnation_threshold` generations is skipped unless it holds the
/// champion or every species with survivors is stagnant.
fn breeding_species(
    species: &[Species],
    ranking: &Ranking,
    reproduction: &ReproductionConfig,
    generation: usize,
    champion_species: Option<usize>,
) -> (Vec<Vec<usize>>, Vec<f64>) {
    let pools = survivor_pools(species, ranking, reproduction.survival_threshold);
    let weights = roulette_weights(species);

    let candidates: Vec<usize> = (0..species.len())
        .filter(|&i| !pools[i].is_empty())
        .collect();
    let active: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| {
            species[i].stagnation(generation) <= reproduction.stagnation_threshold
                || champion_species == Some(species[i].id)
        })
        .collect();
    let chosen = if active.is_empty() { candidates } else { active };

    for (i, skipped) in species.iter().enumerate().filter(|(i, _)| !chosen.contains(i)) {
        debug!(
            species = skipped.id,
            survivors = pools[i].len(),
            stagnation = skipped.stagnation(generation),
            "species skipped for reproduction"
        );
    }

    chosen
        .into_iter()
        .map(|i| (pools[i].clone(), weights[i]))
        .unzip()
}

/// Adjusted fitness shifted so that every weight is non-negative.
fn roulette_weights(species: &[Species]) -> Vec<f64> {
    let floor = species
        .iter()
        .map(|s| s.adjusted_fitness)
        .fold(0.0, f64::min);
    species.iter().map(|s| s.adjusted_fitness - floor).collect()
}

/// Fitness-proportionate choice; uniform when no weight is positive.
fn roulette<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return rng.random_range(0..weights.len());
    }

    let mut target = rng.random_range(0.0..total);
    for (index, &weight) in weights.iter().enumerate() {
        if target < weight {
            return index;
        }
        target -= weight;
    }
    weights.len() - 1
}

/// Pool of the second parent: with probability `interspecies_rate` a
/// different species drawn uniformly, otherwise `home`.
fn mate_pool<R: Rng>(home: usize, pools: usize, interspecies_rate: f64, rng: &mut R) -> usize {
    if pools > 1 && rng.random_bool(interspecies_rate) {
        let other = rng.random_range(0..pools - 1);
        if other >= home { other + 1 } else { other }
    } else {
        home
    }
}

/// Best of `size` uniform draws (with replacement) from `pool`.
fn tournament<R: Rng>(pool: &[usize], ranking: &Ranking, size: usize, rng: &mut R) -> usize {
    let mut winner = pool[rng.random_range(0..pool.len())];
    for _ in 1..size {
        let challenger = pool[rng.random_range(0..pool.len())];
        if ranking.compare(challenger, winner).is_lt() {
            winner = challenger;
        }
    }
    winner
}
