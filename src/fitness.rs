//! Fitness aggregation.
//!
//! Genomes carry a vector of per-objective scores. Two interchangeable
//! strategies reduce that vector to an order over the population:
//!
//! - [`FitnessMode::WeightedSum`]: `Σ weight_i · objective_i`, higher is better.
//! - [`FitnessMode::Pareto`]: NSGA-II non-dominated sorting, with crowding
//!   distance breaking ties inside a front.
//!
//! Both strategies are pure functions over the same input. Elitism and
//! tournaments always compare aggregate fitness; under Pareto ranking the
//! NSGA-II survivor cut decides which genomes may breed. [`Ranking`] carries
//! both to the driver.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::genome::Genome;

/// Strategy used to compare genomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMode {
    /// Compare by the weighted sum of objectives.
    #[default]
    WeightedSum,
    /// Restrict parents to the NSGA-II survivors: whole Pareto fronts,
    /// the overflowing one truncated by crowding distance.
    Pareto,
}

/// Treatment of a genome that has no evaluation result after the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFitness {
    /// Score every objective as zero and rank normally.
    #[default]
    Zero,
    /// Keep the genome out of the Pareto fronts and rank it last.
    Exclude,
}

/// A named objective and its weight in the weighted sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objective {
    pub name: String,
    pub weight: f64,
}

impl Objective {
    #[must_use]
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// `Σ weight_i · score_i`. Weights need not sum to one.
#[must_use]
pub fn weighted_sum(scores: &[f64], weights: &[f64]) -> f64 {
    scores.iter().zip(weights).map(|(s, w)| s * w).sum()
}

/// `a` dominates `b` when it is at least as good on every objective and
/// strictly better on at least one.
#[must_use]
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Partition `objectives` into Pareto fronts.
///
/// Front 0 holds the members no other member dominates; front `k` holds the
/// members dominated only by members of fronts `< k`. Every index appears in
/// exactly one front, and indices within a front are ascending.
#[must_use]
pub fn non_dominated_sort<V: AsRef<[f64]>>(objectives: &[V]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (objectives[i].as_ref(), objectives[j].as_ref());
            if dominates(a, b) {
                dominated[i].push(j);
                domination_count[j] += 1;
            } else if dominates(b, a) {
                dominated[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance of each member of `front`, in the same order as `front`.
///
/// For each objective the front is sorted along that objective; boundary
/// members get an infinite distance and interior members accumulate the
/// normalized gap between their neighbours. Fronts of two or fewer members
/// are all boundary.
#[must_use]
pub fn crowding_distance<V: AsRef<[f64]>>(front: &[usize], objectives: &[V]) -> Vec<f64> {
    let size = front.len();
    if size <= 2 {
        return vec![f64::INFINITY; size];
    }

    let mut distance = vec![0.0; size];
    let num_objectives = objectives[front[0]].as_ref().len();

    for m in 0..num_objectives {
        let value = |slot: usize| objectives[front[slot]].as_ref()[m];

        let mut sorted: Vec<usize> = (0..size).collect();
        sorted.sort_by(|&a, &b| value(a).total_cmp(&value(b)).then(a.cmp(&b)));

        let first = sorted[0];
        let last = sorted[size - 1];
        distance[first] = f64::INFINITY;
        distance[last] = f64::INFINITY;

        let range = value(last) - value(first);
        if range <= 0.0 {
            continue;
        }
        for k in 1..size - 1 {
            let gap = value(sorted[k + 1]) - value(sorted[k - 1]);
            distance[sorted[k]] += gap / range;
        }
    }

    distance
}

/// Front index and crowding distance of one member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParetoRank {
    pub front: usize,
    pub crowding: f64,
}

/// Pareto rank of every member, indexed like `objectives`.
#[must_use]
pub fn pareto_ranks<V: AsRef<[f64]>>(objectives: &[V]) -> Vec<ParetoRank> {
    let mut ranks = vec![
        ParetoRank {
            front: 0,
            crowding: 0.0
        };
        objectives.len()
    ];
    for (front_index, front) in non_dominated_sort(objectives).iter().enumerate() {
        let crowding = crowding_distance(front, objectives);
        for (&member, distance) in front.iter().zip(crowding) {
            ranks[member] = ParetoRank {
                front: front_index,
                crowding: distance,
            };
        }
    }
    ranks
}

/// All members ordered best-first: fronts in order, each front by
/// descending crowding distance, remaining ties by index.
#[must_use]
pub fn pareto_order<V: AsRef<[f64]>>(objectives: &[V]) -> Vec<usize> {
    let ranks = pareto_ranks(objectives);
    let mut order: Vec<usize> = (0..objectives.len()).collect();
    order.sort_by(|&a, &b| {
        ranks[a]
            .front
            .cmp(&ranks[b].front)
            .then_with(|| ranks[b].crowding.total_cmp(&ranks[a].crowding))
            .then(a.cmp(&b))
    });
    order
}

/// NSGA-II survivor selection: take whole fronts while they fit, then fill
/// the remaining quota from the next front by descending crowding distance.
#[must_use]
pub fn select_survivors<V: AsRef<[f64]>>(objectives: &[V], quota: usize) -> Vec<usize> {
    let mut order = pareto_order(objectives);
    order.truncate(quota);
    order
}

/// A best-first order over a population plus the set of genomes allowed to
/// become parents.
///
/// The order is always by descending aggregate fitness; it drives elitism,
/// tournaments and species sharing in both modes. The strategy decides who
/// may breed: every ranked genome under weighted sum, the
/// [`select_survivors`] cut under Pareto ranking.
#[derive(Debug, Clone)]
pub struct Ranking {
    mode: FitnessMode,
    order: Vec<usize>,
    position: Vec<usize>,
    scores: Vec<f64>,
    survivors: Vec<bool>,
}

impl Ranking {
    /// Rank `population` and mark parent candidates.
    ///
    /// Under [`FitnessMode::Pareto`] at most `survivor_quota` genomes are
    /// marked, chosen by NSGA-II survivor selection over the objective
    /// vectors. Genomes without an evaluation result take part with zero
    /// scores under [`MissingFitness::Zero`]; under [`MissingFitness::Exclude`]
    /// they rank after everything else and never breed.
    #[must_use]
    pub fn build(
        population: &[Genome],
        mode: FitnessMode,
        missing: MissingFitness,
        survivor_quota: usize,
    ) -> Self {
        let (ranked, excluded): (Vec<usize>, Vec<usize>) = (0..population.len())
            .partition(|&i| population[i].evaluated || missing == MissingFitness::Zero);

        let mut order = ranked.clone();
        order.sort_by(|&a, &b| {
            population[b]
                .aggregate_fitness
                .total_cmp(&population[a].aggregate_fitness)
                .then(a.cmp(&b))
        });
        order.extend(excluded);

        let mut position = vec![0; population.len()];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }

        let mut scores = vec![0.0; population.len()];
        for &i in &ranked {
            scores[i] = population[i].aggregate_fitness;
        }

        let mut survivors = vec![false; population.len()];
        match mode {
            FitnessMode::WeightedSum => {
                for &i in &ranked {
                    survivors[i] = true;
                }
            }
            FitnessMode::Pareto => {
                let objectives: Vec<&[f64]> = ranked
                    .iter()
                    .map(|&i| population[i].fitness.as_slice())
                    .collect();
                for slot in select_survivors(&objectives, survivor_quota) {
                    survivors[ranked[slot]] = true;
                }
            }
        }

        Self {
            mode,
            order,
            position,
            scores,
            survivors,
        }
    }

    #[must_use]
    pub fn mode(&self) -> FitnessMode {
        self.mode
    }

    /// Population indices, best first.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position of `index` in the order; lower is better.
    #[must_use]
    pub fn position(&self, index: usize) -> usize {
        self.position[index]
    }

    /// Compare two population indices, best first.
    #[must_use]
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        self.position[a].cmp(&self.position[b])
    }

    /// Scalar score used for fitness sharing: the aggregate fitness, zero
    /// for excluded genomes.
    #[must_use]
    pub fn score(&self, index: usize) -> f64 {
        self.scores[index]
    }

    /// Whether the genome at `index` may become a parent.
    #[must_use]
    pub fn is_survivor(&self, index: usize) -> bool {
        self.survivors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_weighted_sum() {
        let scores = [0.5, 0.25, 1.0];
        let weights = [0.4, 0.4, 0.2];
        assert!((weighted_sum(&scores, &weights) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dominance() {
        assert!(dominates(&[1.0, 2.0], &[1.0, 1.0]));
        assert!(!dominates(&[1.0, 1.0], &[1.0, 1.0]), "equal is not dominance");
        assert!(!dominates(&[2.0, 0.0], &[0.0, 2.0]));
        assert!(!dominates(&[1.0, 1.0], &[1.0, 2.0]));
    }

    #[test]
    fn test_non_dominated_sort_fronts() {
        let objectives = vec![
            vec![1.0, 1.0], // 0: dominated by 2 and 3
            vec![3.0, 0.0], // 1: front 0
            vec![2.0, 2.0], // 2: front 0
            vec![0.0, 3.0], // 3: front 0
            vec![0.5, 0.5], // 4: dominated by 0
        ];
        let fronts = non_dominated_sort(&objectives);
        assert_eq!(fronts, vec![vec![1, 2, 3], vec![0], vec![4]]);
    }

    #[test]
    fn test_every_member_in_exactly_one_front() {
        let objectives: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![(i % 5) as f64, (i / 4) as f64, ((i * 7) % 3) as f64])
            .collect();
        let fronts = non_dominated_sort(&objectives);

        let mut seen: Vec<usize> = fronts.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());

        for &a in &fronts[0] {
            for b in 0..objectives.len() {
                assert!(!dominates(&objectives[b], &objectives[a]));
            }
        }
    }

    #[test]
    fn test_crowding_distance_boundaries_are_infinite() {
        let objectives = vec![vec![0.0, 4.0], vec![1.0, 3.0], vec![3.0, 1.0], vec![4.0, 0.0]];
        let front = vec![0, 1, 2, 3];
        let distance = crowding_distance(&front, &objectives);

        assert!(distance[0].is_infinite());
        assert!(distance[3].is_infinite());
        // Interior: (3 - 0) / 4 per objective, twice.
        assert!((distance[1] - 1.5).abs() < 1e-12);
        assert!((distance[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_small_fronts_are_all_boundary() {
        let objectives = vec![vec![0.0], vec![1.0]];
        let distance = crowding_distance(&[0, 1], &objectives);
        assert!(distance.iter().all(|d| d.is_infinite()));
    }

    #[test]
    fn test_select_survivors_truncates_by_crowding() {
        let objectives = vec![
            vec![0.0, 10.0], // boundary
            vec![4.9, 5.1],
            vec![5.0, 5.0], // squeezed between 1 and 4
            vec![10.0, 0.0], // boundary
            vec![7.0, 2.0],
            vec![0.0, 0.0], // front 1
        ];
        let survivors = select_survivors(&objectives, 4);

        assert_eq!(survivors.len(), 4);
        assert!(survivors.contains(&0));
        assert!(survivors.contains(&3));
        assert!(!survivors.contains(&2), "most crowded member is truncated");
        assert!(!survivors.contains(&5), "dominated member never beats front 0");
    }

    fn scored(fitness: &[f64], weights: &[f64], evaluated: bool) -> Genome {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut genome = Genome::empty(fitness.len(), &mut rng);
        genome.fitness = fitness.to_vec();
        genome.aggregate_fitness = weighted_sum(fitness, weights);
        genome.evaluated = evaluated;
        genome
    }

    #[test]
    fn test_ranking_orders_by_aggregate_under_pareto() {
        let weights = [0.4, 0.4, 0.2];
        let mut population = vec![
            scored(&[1.0, 0.0, 0.0], &weights, true),
            scored(&[0.6, 0.6, 0.0], &weights, true),
            scored(&[0.0, 1.0, 0.0], &weights, true),
        ];
        population.extend((0..9).map(|_| scored(&[0.0, 0.0, 0.0], &weights, true)));

        let ranking = Ranking::build(&population, FitnessMode::Pareto, MissingFitness::Zero, 3);

        // Genome 1 sits between two boundary members of front 0 but has the
        // highest aggregate.
        assert_eq!(ranking.order()[0], 1);
        assert!(ranking.compare(1, 0).is_lt());
        assert!((0..3).all(|i| ranking.is_survivor(i)));
        assert!((3..12).all(|i| !ranking.is_survivor(i)));
        assert!((ranking.score(1) - 0.48).abs() < 1e-12);
    }

    #[test]
    fn test_pareto_survivors_follow_quota() {
        let weights = [1.0, 1.0];
        let population: Vec<Genome> = [[3.0, 0.0], [0.0, 3.0], [2.0, 2.0], [1.0, 1.0], [0.0, 0.0]]
            .iter()
            .map(|f| scored(f, &weights, true))
            .collect();

        let ranking = Ranking::build(&population, FitnessMode::Pareto, MissingFitness::Zero, 2);
        let survivors: Vec<usize> = (0..5).filter(|&i| ranking.is_survivor(i)).collect();
        assert_eq!(survivors.len(), 2);
        // Boundary members of front 0 win the crowding cut.
        assert_eq!(survivors, vec![0, 1]);
        assert_eq!(ranking.order()[0], 2);
    }

    #[test]
    fn test_weighted_sum_marks_every_ranked_genome() {
        let weights = [1.0];
        let population = vec![
            scored(&[1.0], &weights, true),
            scored(&[0.0], &weights, false),
            scored(&[2.0], &weights, true),
        ];

        let ranking =
            Ranking::build(&population, FitnessMode::WeightedSum, MissingFitness::Exclude, 1);
        assert_eq!(ranking.order(), &[2, 0, 1]);
        assert!(ranking.is_survivor(0) && ranking.is_survivor(2));
        assert!(!ranking.is_survivor(1), "excluded genomes never breed");
        assert_eq!(ranking.score(1), 0.0);

        let ranking = Ranking::build(&population, FitnessMode::WeightedSum, MissingFitness::Zero, 1);
        assert!(ranking.is_survivor(1));
    }

    #[test]
    fn test_pareto_order_puts_fronts_first() {
        let objectives = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.5]];
        let order = pareto_order(&objectives);
        assert_eq!(order.last(), Some(&0));
    }
}
