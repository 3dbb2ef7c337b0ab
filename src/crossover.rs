//! NEAT crossover.
//!
//! Parents are aligned by innovation number. Matching genes are inherited
//! from a random parent, disjoint and excess genes from the fitter parent.
//! The child always carries the full input/output layer of both parents, so
//! crossover between structurally unrelated genomes still yields a valid
//! genome.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use rand::Rng;

use crate::config::{ReproductionConfig, TiePolicy};
use crate::gene::ConnectionGene;
use crate::genome::{Genome, GenomeError};

/// Order two parents fitter first.
///
/// Higher `aggregate_fitness` wins. Equal aggregates prefer the genome with
/// fewer connections; a full tie keeps the argument order.
#[must_use]
pub fn fitter_first<'a>(a: &'a Genome, b: &'a Genome) -> (&'a Genome, &'a Genome) {
    let by_fitness = a.aggregate_fitness.total_cmp(&b.aggregate_fitness);
    let by_length = b.num_connections().cmp(&a.num_connections());
    match by_fitness.then(by_length) {
        Ordering::Less => (b, a),
        _ => (a, b),
    }
}

/// Produce a child of `a` and `b`.
///
/// Both parents are validated first; a malformed parent is an error rather
/// than something to repair. A matching gene disabled in either parent stays
/// disabled in the child with `disabled_inherit_prob`. Genes whose
/// `(from, to)` pair the child already carries are skipped, which keeps
/// edges unique even when the same pair was numbered differently in two
/// generations. Connections come out sorted by innovation.
pub fn crossover<R: Rng>(
    a: &Genome,
    b: &Genome,
    config: &ReproductionConfig,
    rng: &mut R,
) -> Result<Genome, GenomeError> {
    a.validate()?;
    b.validate()?;

    let (fitter, other) = fitter_first(a, b);
    let union = config.tie_policy == TiePolicy::Union
        && fitter.aggregate_fitness == other.aggregate_fitness;

    let mut genes: BTreeMap<u64, (Option<&ConnectionGene>, Option<&ConnectionGene>)> =
        BTreeMap::new();
    for conn in &fitter.connections {
        genes.entry(conn.innovation).or_default().0 = Some(conn);
    }
    for conn in &other.connections {
        genes.entry(conn.innovation).or_default().1 = Some(conn);
    }

    let mut child = Genome::empty(fitter.fitness.len().max(other.fitness.len()), rng);
    let mut edges = HashSet::new();

    for (mine, theirs) in genes.into_values() {
        let inherited = match (mine, theirs) {
            (Some(x), Some(y)) => {
                let mut gene = (if rng.random_bool(0.5) { x } else { y }).clone();
                if !x.enabled || !y.enabled {
                    gene.enabled = !rng.random_bool(config.disabled_inherit_prob);
                }
                gene
            }
            (Some(x), None) => x.clone(),
            (None, Some(y)) if union => y.clone(),
            _ => continue,
        };
        if edges.insert(inherited.endpoints()) {
            child.connections.push(inherited);
        }
    }

    let mut node_ids = HashSet::new();
    for node in fitter.nodes.iter().chain(&other.nodes).filter(|n| n.is_io()) {
        if node_ids.insert(node.id) {
            child.nodes.push(node.clone());
        }
    }
    for conn in &child.connections {
        for id in [conn.from_node, conn.to_node] {
            if node_ids.insert(id) {
                let node = fitter
                    .node(id)
                    .or_else(|| other.node(id))
                    .ok_or(GenomeError::DanglingNode {
                        genome: child.id,
                        innovation: conn.innovation,
                        node: id,
                    })?;
                child.nodes.push(node.clone());
            }
        }
    }

    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::NodeGene;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Genome over inputs {0, 1}, output 2 and hidden nodes 3..=5 with the
    /// connections of `genes` (innovation, from, to).
    fn parent(genes: &[(u64, u64, u64)], fitness: f64, rng: &mut ChaCha8Rng) -> Genome {
        let mut genome = Genome::empty(1, rng);
        genome.nodes = vec![
            NodeGene::input(0),
            NodeGene::input(1),
            NodeGene::output(2, 0.1),
        ];
        for &(innovation, from, to) in genes {
            for id in [from, to] {
                if !genome.contains_node(id) {
                    genome.nodes.push(NodeGene::hidden(id));
                }
            }
            genome
                .connections
                .push(ConnectionGene::new(innovation, from, to, innovation as f32));
        }
        genome.aggregate_fitness = fitness;
        genome
    }

    fn innovations(genome: &Genome) -> Vec<u64> {
        genome.connections.iter().map(|c| c.innovation).collect()
    }

    #[test]
    fn test_disjoint_genes_come_from_fitter_parent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a = parent(&[(1, 0, 2), (2, 1, 2), (3, 0, 3)], 2.0, &mut rng);
        let b = parent(&[(1, 0, 2), (2, 1, 2), (4, 1, 4)], 1.0, &mut rng);
        let config = ReproductionConfig::default();

        for _ in 0..20 {
            let child = crossover(&a, &b, &config, &mut rng).unwrap();
            assert_eq!(innovations(&child), vec![1, 2, 3]);
            assert!(child.contains_node(3));
            assert!(!child.contains_node(4));
            child.validate().unwrap();

            let swapped = crossover(&b, &a, &config, &mut rng).unwrap();
            assert_eq!(innovations(&swapped), vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_equal_fitness_prefers_shorter_parent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let long = parent(&[(1, 0, 2), (2, 1, 2), (3, 0, 3), (5, 3, 2)], 1.0, &mut rng);
        let short = parent(&[(1, 0, 2), (4, 1, 4)], 1.0, &mut rng);

        let (fitter, _) = fitter_first(&long, &short);
        assert_eq!(fitter.id, short.id);

        let child = crossover(&long, &short, &ReproductionConfig::default(), &mut rng).unwrap();
        assert_eq!(innovations(&child), vec![1, 4]);
    }

    #[test]
    fn test_union_policy_keeps_both_sides_on_ties() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a = parent(&[(1, 0, 2), (3, 0, 3)], 1.0, &mut rng);
        let b = parent(&[(1, 0, 2), (4, 1, 4)], 1.0, &mut rng);
        let config = ReproductionConfig {
            tie_policy: TiePolicy::Union,
            ..ReproductionConfig::default()
        };

        let child = crossover(&a, &b, &config, &mut rng).unwrap();
        assert_eq!(innovations(&child), vec![1, 3, 4]);
        child.validate().unwrap();
    }

    #[test]
    fn test_disabled_inheritance_probability() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut a = parent(&[(1, 0, 2)], 2.0, &mut rng);
        let b = parent(&[(1, 0, 2)], 1.0, &mut rng);
        a.connections[0].enabled = false;

        let always = ReproductionConfig {
            disabled_inherit_prob: 1.0,
            ..ReproductionConfig::default()
        };
        let never = ReproductionConfig {
            disabled_inherit_prob: 0.0,
            ..ReproductionConfig::default()
        };

        for _ in 0..20 {
            let child = crossover(&a, &b, &always, &mut rng).unwrap();
            assert!(!child.connections[0].enabled);
            let child = crossover(&a, &b, &never, &mut rng).unwrap();
            assert!(child.connections[0].enabled);
        }
    }

    #[test]
    fn test_child_keeps_io_layer_of_both_parents() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a = parent(&[], 1.0, &mut rng);
        let b = parent(&[(1, 0, 2)], 0.0, &mut rng);

        let child = crossover(&a, &b, &ReproductionConfig::default(), &mut rng).unwrap();
        assert_eq!(child.nodes.len(), 3);
        assert!(child.connections.is_empty());
        assert_ne!(child.id, a.id);
        assert!(!child.evaluated);
    }

    #[test]
    fn test_same_edge_under_two_innovations_is_kept_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a = parent(&[(1, 0, 2), (7, 1, 2)], 1.0, &mut rng);
        let b = parent(&[(1, 0, 2), (9, 1, 2)], 1.0, &mut rng);
        let config = ReproductionConfig {
            tie_policy: TiePolicy::Union,
            ..ReproductionConfig::default()
        };

        let child = crossover(&a, &b, &config, &mut rng).unwrap();
        assert_eq!(innovations(&child), vec![1, 7]);
        child.validate().unwrap();
    }

    #[test]
    fn test_malformed_parent_fails_fast() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a = parent(&[(1, 0, 2)], 1.0, &mut rng);
        let mut b = parent(&[(1, 0, 2)], 0.0, &mut rng);
        b.connections.push(ConnectionGene::new(2, 1, 99, 0.5));

        let err = crossover(&a, &b, &ReproductionConfig::default(), &mut rng).unwrap_err();
        assert!(matches!(err, GenomeError::DanglingNode { node: 99, .. }));
    }
}
