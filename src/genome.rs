//! NEAT genome model.
//!
//! A [`Genome`] is a flat list of node genes and connection genes plus the
//! fitness the external evaluator recorded for it. Connections keep their
//! insertion order; crossover emits them sorted by innovation. Node ids and
//! innovation numbers come from the run's [`InnovationTracker`], so homologous
//! structure carries the same numbers in every genome.
//!
//! The genome serializes to the JSON document handed to the evaluator.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{NeatConfig, SpeciationConfig};
use crate::evaluation::ObjectiveScores;
use crate::fitness::{weighted_sum, Objective};
use crate::gene::{ConnectionGene, NodeGene, NodeKind};
use crate::innovation::{InnovationError, InnovationTracker};
use crate::species::compatibility_distance;

/// Structural integrity violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenomeError {
    #[error("genome {genome}: connection {innovation} references missing node {node}")]
    DanglingNode {
        genome: Uuid,
        innovation: u64,
        node: u64,
    },
    #[error("genome {genome}: node id {node} appears more than once")]
    DuplicateNode { genome: Uuid, node: u64 },
    #[error("genome {genome}: innovation {innovation} appears more than once")]
    DuplicateInnovation { genome: Uuid, innovation: u64 },
    #[error("genome {genome}: edge {from} -> {to} appears more than once")]
    DuplicateEdge { genome: Uuid, from: u64, to: u64 },
    #[error(transparent)]
    Layout(#[from] InnovationError),
}

/// One individual: network structure plus multi-objective fitness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    /// Opaque identity, stable while the genome survives as an elite.
    pub id: Uuid,
    /// Node genes, unique by id.
    pub nodes: Vec<NodeGene>,
    /// Connection genes, unique by innovation and by `(from, to)` pair.
    pub connections: Vec<ConnectionGene>,
    /// Per-objective scores in configured objective order.
    #[serde(default)]
    pub fitness: Vec<f64>,
    /// Weighted sum of `fitness`.
    #[serde(default)]
    pub aggregate_fitness: f64,
    /// Whether the evaluator produced a result for the current generation.
    #[serde(default)]
    pub evaluated: bool,
    /// Species assigned by the last speciation pass.
    #[serde(default)]
    pub species_id: Option<usize>,
}

impl Genome {
    /// Create an empty genome with zeroed fitness.
    #[must_use]
    pub fn empty<R: Rng>(num_objectives: usize, rng: &mut R) -> Self {
        Self {
            id: fresh_id(rng),
            nodes: Vec::new(),
            connections: Vec::new(),
            fitness: vec![0.0; num_objectives],
            aggregate_fitness: 0.0,
            evaluated: false,
            species_id: None,
        }
    }

    /// Create a genome with only input and output nodes.
    ///
    /// Each (input, output) pair is connected independently with
    /// `connect_probability`, using a weight drawn uniformly from
    /// `[-initial_weight_range, initial_weight_range]`. Node ids and
    /// innovations come from `tracker`, so identical edges in genomes of the
    /// same population share innovation numbers.
    pub fn create_minimal<R: Rng>(
        input_size: usize,
        output_size: usize,
        connect_probability: f64,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        let layout = tracker.io_layout(input_size, output_size)?;
        let mut genome = Self::empty(config.num_objectives(), rng);

        genome
            .nodes
            .extend(layout.inputs.iter().map(|&id| NodeGene::input(id)));
        for &id in &layout.outputs {
            let bias = rng.random_range(-1.0..=1.0);
            genome.nodes.push(NodeGene::output(id, bias));
        }

        let range = config.genome.initial_weight_range;
        for &from in &layout.inputs {
            for &to in &layout.outputs {
                if rng.random_bool(connect_probability) {
                    let innovation = tracker.get_or_create_innovation(from, to);
                    let weight = rng.random_range(-range..=range);
                    genome
                        .connections
                        .push(ConnectionGene::new(innovation, from, to, weight));
                }
            }
        }

        Ok(genome)
    }

    /// Create a minimal genome shaped by `config.genome`.
    pub fn from_config<R: Rng>(
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        Self::create_minimal(
            config.genome.input_size,
            config.genome.output_size,
            config.genome.connect_probability,
            config,
            tracker,
            rng,
        )
    }

    /// Total copy under a fresh identity with fitness cleared.
    ///
    /// Used for asexual reproduction; the offspring shares no state with
    /// its parent.
    #[must_use]
    pub fn clone_as_offspring<R: Rng>(&self, rng: &mut R) -> Self {
        let mut child = self.clone();
        child.id = fresh_id(rng);
        child.reset_fitness();
        child.species_id = None;
        child
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: u64) -> Option<&NodeGene> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[must_use]
    pub fn contains_node(&self, id: u64) -> bool {
        self.node(id).is_some()
    }

    /// Whether a connection `from -> to` exists, enabled or not.
    #[must_use]
    pub fn has_connection(&self, from: u64, to: u64) -> bool {
        self.connections
            .iter()
            .any(|c| c.from_node == from && c.to_node == to)
    }

    /// Find a connection by its innovation number.
    #[must_use]
    pub fn connection_by_innovation(&self, innovation: u64) -> Option<&ConnectionGene> {
        self.connections.iter().find(|c| c.innovation == innovation)
    }

    /// Input node ids in layout order.
    pub fn input_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids_of(NodeKind::Input)
    }

    /// Output node ids in layout order.
    pub fn output_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids_of(NodeKind::Output)
    }

    fn ids_of(&self, kind: NodeKind) -> impl Iterator<Item = u64> + '_ {
        self.nodes
            .iter()
            .filter(move |n| n.kind == kind)
            .map(|n| n.id)
    }

    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.ids_of(NodeKind::Hidden).count()
    }

    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn num_enabled_connections(&self) -> usize {
        self.connections.iter().filter(|c| c.enabled).count()
    }

    /// Highest innovation number carried by this genome.
    #[must_use]
    pub fn max_innovation(&self) -> Option<u64> {
        self.connections.iter().map(|c| c.innovation).max()
    }

    /// Highest node id carried by this genome.
    #[must_use]
    pub fn max_node_id(&self) -> Option<u64> {
        self.nodes.iter().map(|n| n.id).max()
    }

    /// Check the structural invariants: unique node ids, unique innovations,
    /// unique edges, and no connection referencing a missing node.
    pub fn validate(&self) -> Result<(), GenomeError> {
        let mut node_ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node_ids.insert(node.id) {
                return Err(GenomeError::DuplicateNode {
                    genome: self.id,
                    node: node.id,
                });
            }
        }

        let mut innovations = HashSet::with_capacity(self.connections.len());
        let mut edges = HashSet::with_capacity(self.connections.len());
        for conn in &self.connections {
            for node in [conn.from_node, conn.to_node] {
                if !node_ids.contains(&node) {
                    return Err(GenomeError::DanglingNode {
                        genome: self.id,
                        innovation: conn.innovation,
                        node,
                    });
                }
            }
            if !innovations.insert(conn.innovation) {
                return Err(GenomeError::DuplicateInnovation {
                    genome: self.id,
                    innovation: conn.innovation,
                });
            }
            if !edges.insert(conn.endpoints()) {
                return Err(GenomeError::DuplicateEdge {
                    genome: self.id,
                    from: conn.from_node,
                    to: conn.to_node,
                });
            }
        }
        Ok(())
    }

    /// Compatibility distance to `other`; see [`compatibility_distance`].
    #[must_use]
    pub fn compatibility_distance(&self, other: &Genome, config: &SpeciationConfig) -> f64 {
        compatibility_distance(self, other, config)
    }

    /// Clear fitness for re-evaluation, keeping the vector length.
    pub fn reset_fitness(&mut self) {
        self.fitness.iter_mut().for_each(|f| *f = 0.0);
        self.aggregate_fitness = 0.0;
        self.evaluated = false;
    }

    /// Store an evaluation result.
    ///
    /// Scores are read in `objectives` order; an objective the evaluator did
    /// not report scores zero. The aggregate is the weighted sum.
    pub fn record_scores(&mut self, scores: &ObjectiveScores, objectives: &[Objective]) {
        self.fitness = objectives
            .iter()
            .map(|o| scores.get(&o.name).unwrap_or(0.0))
            .collect();
        let weights: Vec<f64> = objectives.iter().map(|o| o.weight).collect();
        self.aggregate_fitness = weighted_sum(&self.fitness, &weights);
        self.evaluated = true;
    }

    /// Record that no result arrived: the worst fitness, all zeros.
    pub fn record_missing(&mut self, num_objectives: usize) {
        self.fitness = vec![0.0; num_objectives];
        self.aggregate_fitness = 0.0;
        self.evaluated = false;
    }
}

/// A v4 UUID drawn from the run's RNG, so seeded runs are reproducible.
pub(crate) fn fresh_id<R: Rng>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
