//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of a genome:
//! - [`NodeGene`]: a neuron, identified by a run-unique id
//! - [`ConnectionGene`]: a weighted edge, identified by its innovation number
//!
//! Both serialize to the flat shape consumed by the external evaluator:
//! `{"id": 3, "type": "hidden", "bias": 0.0}` and
//! `{"innovation": 7, "from_node": 0, "to_node": 3, "weight": 0.5, "enabled": true}`.

use serde::{Deserialize, Serialize};

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Receives an observation value from the environment.
    Input,
    /// Internal node added through mutation.
    Hidden,
    /// Produces an action value for the environment.
    Output,
}

/// A node gene representing a neuron in the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    /// Run-unique id. Never reused, stable across the lineage.
    pub id: u64,
    /// The role of this node.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Bias added to the node's input sum by the evaluator.
    pub bias: f32,
}

impl NodeGene {
    /// Create a new input node. Inputs carry no bias.
    #[must_use]
    pub fn input(id: u64) -> Self {
        Self {
            id,
            kind: NodeKind::Input,
            bias: 0.0,
        }
    }

    /// Create a new output node.
    #[must_use]
    pub fn output(id: u64, bias: f32) -> Self {
        Self {
            id,
            kind: NodeKind::Output,
            bias,
        }
    }

    /// Create a new hidden node.
    #[must_use]
    pub fn hidden(id: u64) -> Self {
        Self {
            id,
            kind: NodeKind::Hidden,
            bias: 0.0,
        }
    }

    /// Whether this node is part of the fixed input/output layout.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self.kind, NodeKind::Input | NodeKind::Output)
    }
}

/// A connection gene representing a weighted link between two nodes.
///
/// The innovation number identifies the structural edge historically: the
/// same `(from_node, to_node)` pair arising in two genomes during the same
/// generation carries the same innovation, which is what crossover aligns on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    /// Historical marker of this structural edge.
    pub innovation: u64,
    /// Source node id.
    pub from_node: u64,
    /// Target node id.
    pub to_node: u64,
    /// The connection weight.
    pub weight: f32,
    /// Whether this connection is active.
    /// Disabled connections are skipped by the evaluator but kept for crossover.
    pub enabled: bool,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(innovation: u64, from_node: u64, to_node: u64, weight: f32) -> Self {
        Self {
            innovation,
            from_node,
            to_node,
            weight,
            enabled: true,
        }
    }

    /// The structural edge this gene encodes.
    #[must_use]
    pub fn endpoints(&self) -> (u64, u64) {
        (self.from_node, self.to_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_gene_creation() {
        let input = NodeGene::input(1);
        assert_eq!(input.kind, NodeKind::Input);
        assert_eq!(input.bias, 0.0);
        assert!(input.is_io());

        let output = NodeGene::output(2, 0.25);
        assert_eq!(output.kind, NodeKind::Output);
        assert!((output.bias - 0.25).abs() < 1e-6);

        let hidden = NodeGene::hidden(3);
        assert_eq!(hidden.kind, NodeKind::Hidden);
        assert!(!hidden.is_io());
    }

    #[test]
    fn test_connection_gene_creation() {
        let conn = ConnectionGene::new(100, 1, 2, 0.5);
        assert_eq!(conn.endpoints(), (1, 2));
        assert!((conn.weight - 0.5).abs() < 1e-6);
        assert!(conn.enabled);
    }

    #[test]
    fn test_wire_format() {
        let node = NodeGene::hidden(7);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "hidden");
        assert_eq!(json["id"], 7);

        let conn = ConnectionGene::new(3, 0, 7, 1.0);
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["from_node"], 0);
        assert_eq!(json["to_node"], 7);
        assert_eq!(json["enabled"], true);
    }
}
