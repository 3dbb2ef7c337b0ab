//! Mutation operators.
//!
//! Three operators change a genome in place, each gated by its own rate in
//! [`MutationConfig`]:
//!
//! - weight mutation perturbs or replaces the weight of enabled connections
//! - add-node splits an enabled connection with a new hidden node
//! - add-connection links two previously unconnected nodes
//!
//! Structural operators draw node ids and innovation numbers from the run's
//! [`InnovationTracker`]. An operator that finds nothing to do is a no-op.

use rand::Rng;
use tracing::trace;

use crate::config::{MutationConfig, NeatConfig};
use crate::gene::{ConnectionGene, NodeGene, NodeKind};
use crate::genome::Genome;
use crate::innovation::InnovationTracker;

impl Genome {
    /// Apply every mutation operator once, each with its configured rate.
    pub fn mutate<R: Rng>(
        &mut self,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) {
        let rates = &config.mutation;

        if rng.random_bool(rates.weight_mutation_rate) {
            self.mutate_weights(config, rng);
        }
        if rng.random_bool(rates.add_node_rate) {
            self.mutate_add_node(tracker, rng);
        }
        if rng.random_bool(rates.add_connection_rate) {
            self.mutate_add_connection(config, tracker, rng);
        }
    }

    /// Perturb or replace the weight of every enabled connection.
    ///
    /// With `weight_perturb_prob` the weight moves by
    /// `U(-1, 1) * weight_mutation_power`, otherwise it is redrawn from the
    /// initial weight range. Results are clamped to `±weight_clamp`.
    pub fn mutate_weights<R: Rng>(&mut self, config: &NeatConfig, rng: &mut R) {
        let MutationConfig {
            weight_perturb_prob,
            weight_mutation_power,
            ..
        } = config.mutation;
        let range = config.genome.initial_weight_range;
        let limit = config.genome.weight_clamp;

        for conn in self.connections.iter_mut().filter(|c| c.enabled) {
            if rng.random_bool(weight_perturb_prob) {
                conn.weight += rng.random_range(-1.0f32..=1.0) * weight_mutation_power;
            } else {
                conn.weight = rng.random_range(-range..=range);
            }
            conn.weight = conn.weight.clamp(-limit, limit);
        }
    }

    /// Split the enabled connection with `innovation` by a new hidden node.
    ///
    /// The split connection is disabled and replaced by `from -> new` with
    /// weight 1.0 and `new -> to` with the original weight, so the signal
    /// through the path is initially unchanged.
    ///
    /// Returns the new node id, or `None` if no enabled connection carries
    /// `innovation`.
    pub fn add_node(&mut self, innovation: u64, tracker: &mut InnovationTracker) -> Option<u64> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.innovation == innovation && c.enabled)?;
        conn.enabled = false;
        let (from, to) = conn.endpoints();
        let weight = conn.weight;

        let node = tracker.new_node_id();
        self.nodes.push(NodeGene::hidden(node));

        let incoming = tracker.get_or_create_innovation(from, node);
        self.connections
            .push(ConnectionGene::new(incoming, from, node, 1.0));
        let outgoing = tracker.get_or_create_innovation(node, to);
        self.connections
            .push(ConnectionGene::new(outgoing, node, to, weight));

        trace!(genome = %self.id, split = innovation, node, "added node");
        Some(node)
    }

    /// Split a uniformly chosen enabled connection.
    pub fn mutate_add_node<R: Rng>(
        &mut self,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Option<u64> {
        let enabled: Vec<u64> = self
            .connections
            .iter()
            .filter(|c| c.enabled)
            .map(|c| c.innovation)
            .collect();
        if enabled.is_empty() {
            return None;
        }

        let innovation = enabled[rng.random_range(0..enabled.len())];
        self.add_node(innovation, tracker)
    }

    /// Whether a new connection `from -> to` would be legal.
    ///
    /// Both nodes must exist, the target must not be an input, and the pair
    /// must not already be connected. Self loops and connections closing a
    /// two-node cycle are only allowed when configured.
    #[must_use]
    pub fn can_connect(&self, from: u64, to: u64, rules: &MutationConfig) -> bool {
        let (Some(_), Some(target)) = (self.node(from), self.node(to)) else {
            return false;
        };
        if target.kind == NodeKind::Input || self.has_connection(from, to) {
            return false;
        }
        if from == to {
            return rules.allow_self_loops;
        }
        rules.allow_recurrent || !self.has_connection(to, from)
    }

    /// Connect `from -> to` with a random weight.
    ///
    /// Returns the innovation of the new connection, or `None` if the
    /// connection is not legal (see [`Genome::can_connect`]).
    pub fn add_connection<R: Rng>(
        &mut self,
        from: u64,
        to: u64,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Option<u64> {
        if !self.can_connect(from, to, &config.mutation) {
            return None;
        }

        let range = config.genome.initial_weight_range;
        let innovation = tracker.get_or_create_innovation(from, to);
        let weight = rng.random_range(-range..=range);
        self.connections
            .push(ConnectionGene::new(innovation, from, to, weight));

        trace!(genome = %self.id, from, to, innovation, "added connection");
        Some(innovation)
    }

    /// Try up to `max_connection_attempts` random pairs and connect the first
    /// legal one. Sources may be any node; targets are hidden or output
    /// nodes.
    pub fn mutate_add_connection<R: Rng>(
        &mut self,
        config: &NeatConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Option<u64> {
        let sources: Vec<u64> = self.nodes.iter().map(|n| n.id).collect();
        let targets: Vec<u64> = self
            .nodes
            .iter()
            .filter(|n| n.kind != NodeKind::Input)
            .map(|n| n.id)
            .collect();
        if sources.is_empty() || targets.is_empty() {
            return None;
        }

        for _ in 0..config.mutation.max_connection_attempts {
            let from = sources[rng.random_range(0..sources.len())];
            let to = targets[rng.random_range(0..targets.len())];
            if self.can_connect(from, to, &config.mutation) {
                return self.add_connection(from, to, config, tracker, rng);
            }
        }
        None
    }
}
