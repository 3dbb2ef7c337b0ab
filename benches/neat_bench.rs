//! Benchmarks for evolve-neat.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use evolve_neat::{
    crossover, non_dominated_sort, EpisodeParams, EvaluationError, Evolution, Genome,
    InnovationTracker, NeatConfig, ObjectiveScores, SpeciesSet,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn grown_population(config: &NeatConfig, size: usize, steps: usize) -> Vec<Genome> {
    let mut tracker = InnovationTracker::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut population: Vec<Genome> = (0..size)
        .map(|_| Genome::from_config(config, &mut tracker, &mut rng).unwrap())
        .collect();
    for _ in 0..steps {
        tracker.begin_generation();
        for genome in &mut population {
            genome.mutate(config, &mut tracker, &mut rng);
        }
    }
    population
}

fn bench_genome_creation(c: &mut Criterion) {
    let config = NeatConfig::default();

    c.bench_function("genome_create_minimal", |b| {
        let mut tracker = InnovationTracker::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        b.iter(|| {
            black_box(Genome::from_config(&config, &mut tracker, &mut rng).unwrap());
        });
    });
}

fn bench_mutation(c: &mut Criterion) {
    let mut config = NeatConfig::minimal(8, 4);
    config.mutation.add_connection_rate = 0.3;
    config.mutation.add_node_rate = 0.1;
    let genome = grown_population(&config, 1, 0).remove(0);

    c.bench_function("genome_mutation", |b| {
        let mut tracker = InnovationTracker::from_counters(1_000, 1_000);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        b.iter(|| {
            let mut g = genome.clone();
            g.mutate(&config, &mut tracker, &mut rng);
            black_box(g);
        });
    });
}

fn bench_crossover(c: &mut Criterion) {
    let config = NeatConfig::minimal(8, 4);
    let parents = grown_population(&config, 2, 10);
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    c.bench_function("genome_crossover", |b| {
        b.iter(|| {
            black_box(crossover(&parents[0], &parents[1], &config.reproduction, &mut rng).unwrap());
        });
    });
}

fn bench_compatibility_distance(c: &mut Criterion) {
    let config = NeatConfig::minimal(8, 4);
    let genomes = grown_population(&config, 2, 10);

    c.bench_function("compatibility_distance", |b| {
        b.iter(|| {
            black_box(genomes[0].compatibility_distance(&genomes[1], &config.speciation));
        });
    });
}

fn bench_speciation(c: &mut Criterion) {
    let config = NeatConfig::minimal(8, 4);
    let population = grown_population(&config, 100, 5);

    c.bench_function("speciate_100", |b| {
        b.iter(|| {
            let mut population = population.clone();
            let mut species = SpeciesSet::new();
            species.speciate(&mut population, 0, &config.speciation);
            black_box(species.len());
        });
    });
}

fn bench_non_dominated_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("non_dominated_sort");
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for size in [20, 100, 400] {
        let objectives: Vec<[f64; 3]> = (0..size)
            .map(|_| [rng.random(), rng.random(), rng.random()])
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &objectives, |b, o| {
            b.iter(|| black_box(non_dominated_sort(o)));
        });
    }
    group.finish();
}

fn bench_generation(c: &mut Criterion) {
    let evaluator = |genome: &Genome, _: &EpisodeParams| -> Result<ObjectiveScores, EvaluationError> {
        Ok([
            ("territory", genome.num_enabled_connections() as f64),
            ("survival", 1.0),
        ]
        .into_iter()
        .collect())
    };

    c.bench_function("generation_cycle_50", |b| {
        let mut config = NeatConfig::minimal(8, 4);
        config.population_size = 50;
        let mut evolution = Evolution::new(config, ChaCha8Rng::seed_from_u64(42)).unwrap();
        b.iter(|| {
            evolution.evaluate(&evaluator).unwrap();
            evolution.speciate().unwrap();
            evolution.reproduce().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_genome_creation,
    bench_mutation,
    bench_crossover,
    bench_compatibility_distance,
    bench_speciation,
    bench_non_dominated_sort,
    bench_generation,
);
criterion_main!(benches);
