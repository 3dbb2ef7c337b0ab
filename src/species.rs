//! Compatibility distance and speciation.
//!
//! Genomes are grouped into species by the NEAT compatibility distance
//!
//! ```text
//! δ = c1·E/N + c2·D/N + c3·W̄
//! ```
//!
//! where `E` counts excess genes, `D` disjoint genes, `W̄` is the mean
//! absolute weight difference of matching genes and `N` normalizes by genome
//! size. Species keep a representative between generations; each generation
//! every genome joins the first species whose representative is closer than
//! the compatibility threshold, or founds a new one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::SpeciationConfig;
use crate::genome::Genome;

/// NEAT compatibility distance between two genomes.
///
/// Genes are aligned by innovation number. A gene present in only one genome
/// is *excess* when its innovation is above the other genome's highest
/// innovation (every gene is excess against an empty genome) and *disjoint*
/// otherwise. `N` is the size of the larger genome, or 1 when both genomes
/// are smaller than `normalize_threshold`.
///
/// The distance is symmetric and `δ(a, a) == 0`.
#[must_use]
pub fn compatibility_distance(a: &Genome, b: &Genome, config: &SpeciationConfig) -> f64 {
    let a_weights: HashMap<u64, f32> = a
        .connections
        .iter()
        .map(|c| (c.innovation, c.weight))
        .collect();
    let b_weights: HashMap<u64, f32> = b
        .connections
        .iter()
        .map(|c| (c.innovation, c.weight))
        .collect();

    let a_max = a.max_innovation();
    let b_max = b.max_innovation();

    let mut matching = 0usize;
    let mut weight_diff_sum = 0.0f64;
    let mut disjoint = 0usize;
    let mut excess = 0usize;

    let mut classify = |innovation: u64, other_max: Option<u64>| match other_max {
        Some(max) if innovation <= max => disjoint += 1,
        _ => excess += 1,
    };

    for (&innovation, &weight) in &a_weights {
        match b_weights.get(&innovation) {
            Some(&other) => {
                matching += 1;
                weight_diff_sum += f64::from((weight - other).abs());
            }
            None => classify(innovation, b_max),
        }
    }
    for &innovation in b_weights.keys() {
        if !a_weights.contains_key(&innovation) {
            classify(innovation, a_max);
        }
    }

    let larger = a.connections.len().max(b.connections.len());
    let n = if larger < config.normalize_threshold || larger == 0 {
        1.0
    } else {
        larger as f64
    };
    let mean_weight_diff = if matching > 0 {
        weight_diff_sum / matching as f64
    } else {
        0.0
    };

    config.c1 * excess as f64 / n + config.c2 * disjoint as f64 / n + config.c3 * mean_weight_diff
}

/// A group of structurally similar genomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: usize,
    /// Genome new members are compared against.
    pub representative: Genome,
    /// Population indices of the current members, in assignment order.
    #[serde(default)]
    pub members: Vec<usize>,
    /// Shared fitness used for offspring allocation.
    #[serde(default)]
    pub adjusted_fitness: f64,
    /// Best member score ever seen in this species.
    #[serde(default)]
    pub best_fitness: Option<f64>,
    /// Generation the best member score last improved, or the founding
    /// generation.
    pub last_improved_generation: usize,
}

impl Species {
    fn found(id: usize, founder: &Genome, index: usize, generation: usize) -> Self {
        Self {
            id,
            representative: founder.clone(),
            members: vec![index],
            adjusted_fitness: 0.0,
            best_fitness: None,
            last_improved_generation: generation,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Store this generation's shared fitness and best member score.
    pub fn record_fitness(&mut self, adjusted: f64, best: f64, generation: usize) {
        self.adjusted_fitness = adjusted;
        if self.best_fitness.map_or(true, |previous| best > previous) {
            self.best_fitness = Some(best);
            self.last_improved_generation = generation;
        }
    }

    /// Generations since the best member score last improved.
    #[must_use]
    pub fn stagnation(&self, generation: usize) -> usize {
        generation.saturating_sub(self.last_improved_generation)
    }
}

/// All species of a run, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSet {
    species: Vec<Species>,
    next_species_id: usize,
}

impl SpeciesSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from checkpointed species.
    #[must_use]
    pub fn restore(mut species: Vec<Species>) -> Self {
        species.sort_by_key(|s| s.id);
        let next_species_id = species.last().map_or(0, |s| s.id + 1);
        Self {
            species,
            next_species_id,
        }
    }

    /// Assign every genome of `population` to a species.
    ///
    /// Genomes are visited in index order and join the first species, in id
    /// order, whose representative is closer than the compatibility
    /// threshold. A genome that fits nowhere founds a new species. Species
    /// left without members are dropped, and each surviving species takes its
    /// first member as the representative for the next pass. The assigned
    /// species id is written back to each genome.
    pub fn speciate(
        &mut self,
        population: &mut [Genome],
        generation: usize,
        config: &SpeciationConfig,
    ) {
        for species in &mut self.species {
            species.members.clear();
        }

        for (index, genome) in population.iter().enumerate() {
            let home = self.species.iter_mut().find(|s| {
                compatibility_distance(genome, &s.representative, config)
                    < config.compatibility_threshold
            });
            match home {
                Some(species) => species.members.push(index),
                None => {
                    let id = self.next_species_id;
                    self.next_species_id += 1;
                    self.species
                        .push(Species::found(id, genome, index, generation));
                }
            }
        }

        self.species.retain(|s| !s.members.is_empty());
        for species in &mut self.species {
            species.representative = population[species.members[0]].clone();
            for &member in &species.members {
                population[member].species_id = Some(species.id);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.species.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Species> {
        self.species.iter_mut()
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Species] {
        &self.species
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeatConfig;
    use crate::gene::{ConnectionGene, NodeGene};
    use crate::innovation::InnovationTracker;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn genome_with(genes: &[(u64, f32)], rng: &mut ChaCha8Rng) -> Genome {
        let mut genome = Genome::empty(0, rng);
        genome.nodes = vec![NodeGene::input(0), NodeGene::output(1, 0.0)];
        for (offset, &(innovation, weight)) in genes.iter().enumerate() {
            let hidden = 100 + offset as u64;
            genome.nodes.push(NodeGene::hidden(hidden));
            genome
                .connections
                .push(ConnectionGene::new(innovation, 0, hidden, weight));
        }
        genome
    }

    fn weight_only() -> SpeciationConfig {
        SpeciationConfig {
            compatibility_threshold: 3.0,
            c1: 0.0,
            c2: 0.0,
            c3: 1.0,
            ..SpeciationConfig::default()
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let config = NeatConfig::minimal(3, 2);
        let mut tracker = InnovationTracker::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let genome = Genome::from_config(&config, &mut tracker, &mut rng).unwrap();

        assert_eq!(
            compatibility_distance(&genome, &genome, &config.speciation),
            0.0
        );
    }

    #[test]
    fn test_excess_and_disjoint_counts() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = genome_with(&[(1, 0.0), (2, 0.0), (3, 0.0)], &mut rng);
        let b = genome_with(&[(1, 0.0), (2, 0.0), (4, 0.0), (5, 0.0)], &mut rng);

        let excess_only = SpeciationConfig {
            c1: 1.0,
            c2: 0.0,
            c3: 0.0,
            ..SpeciationConfig::default()
        };
        let disjoint_only = SpeciationConfig {
            c1: 0.0,
            c2: 1.0,
            c3: 0.0,
            ..SpeciationConfig::default()
        };

        // 4 and 5 lie above a's max (3); 3 lies below b's max (5).
        assert_eq!(compatibility_distance(&a, &b, &excess_only), 2.0);
        assert_eq!(compatibility_distance(&a, &b, &disjoint_only), 1.0);
        assert_eq!(compatibility_distance(&b, &a, &excess_only), 2.0);
    }

    #[test]
    fn test_empty_genome_makes_everything_excess() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let empty = genome_with(&[], &mut rng);
        let full = genome_with(&[(1, 0.5), (2, 0.5)], &mut rng);
        let config = SpeciationConfig::default();

        assert_eq!(compatibility_distance(&empty, &full, &config), 2.0);
        assert_eq!(compatibility_distance(&empty, &empty, &config), 0.0);
    }

    #[test]
    fn test_large_genomes_are_normalized() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let genes: Vec<(u64, f32)> = (0..20).map(|i| (i, 0.0)).collect();
        let a = genome_with(&genes, &mut rng);
        let b = genome_with(&genes[..10], &mut rng);
        let config = SpeciationConfig::default();

        // 10 excess genes over N = 20.
        assert!((compatibility_distance(&a, &b, &config) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_splits_species() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut population = vec![
            genome_with(&[(1, 0.0)], &mut rng),
            genome_with(&[(1, 2.5)], &mut rng),
            genome_with(&[(1, -3.5)], &mut rng),
        ];
        let mut species = SpeciesSet::new();
        species.speciate(&mut population, 0, &weight_only());

        assert_eq!(species.len(), 2);
        assert_eq!(population[0].species_id, population[1].species_id);
        assert_ne!(population[0].species_id, population[2].species_id);
        assert_eq!(species.as_slice()[0].members, vec![0, 1]);
        assert_eq!(species.as_slice()[1].members, vec![2]);
    }

    #[test]
    fn test_representatives_persist_and_empty_species_drop() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut population = vec![
            genome_with(&[(1, 0.0)], &mut rng),
            genome_with(&[(1, 5.0)], &mut rng),
        ];
        let mut species = SpeciesSet::new();
        species.speciate(&mut population, 0, &weight_only());
        assert_eq!(species.len(), 2);

        // Both genomes drift close to the first representative.
        let mut next = vec![
            genome_with(&[(1, 1.0)], &mut rng),
            genome_with(&[(1, -1.0)], &mut rng),
        ];
        species.speciate(&mut next, 1, &weight_only());

        assert_eq!(species.len(), 1);
        let survivor = &species.as_slice()[0];
        assert_eq!(survivor.id, 0);
        assert_eq!(survivor.representative.id, next[0].id);
        assert!(next.iter().all(|g| g.species_id == Some(0)));
    }

    #[test]
    fn test_new_species_get_fresh_ids() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut species = SpeciesSet::new();
        let mut first = vec![genome_with(&[(1, 0.0)], &mut rng)];
        species.speciate(&mut first, 0, &weight_only());

        let mut second = vec![genome_with(&[(1, 9.0)], &mut rng)];
        species.speciate(&mut second, 1, &weight_only());

        assert_eq!(species.len(), 1);
        assert_eq!(second[0].species_id, Some(1), "species ids are never reused");
    }

    #[test]
    fn test_record_fitness_tracks_improvement() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut population = vec![genome_with(&[(1, 0.0)], &mut rng)];
        let mut set = SpeciesSet::new();
        set.speciate(&mut population, 0, &weight_only());

        let species = set.iter_mut().next().unwrap();
        species.record_fitness(1.0, 2.0, 0);
        species.record_fitness(1.0, 1.5, 3);
        assert_eq!(species.best_fitness, Some(2.0));
        assert_eq!(species.stagnation(3), 3);

        species.record_fitness(1.0, 2.5, 4);
        assert_eq!(species.stagnation(4), 0);
    }

    #[test]
    fn test_restore_continues_ids() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut population = vec![
            genome_with(&[(1, 0.0)], &mut rng),
            genome_with(&[(1, 5.0)], &mut rng),
        ];
        let mut set = SpeciesSet::new();
        set.speciate(&mut population, 0, &weight_only());

        let restored = SpeciesSet::restore(set.as_slice().to_vec());
        assert_eq!(restored, set);
    }
}
