//! Innovation tracking for NEAT.
//!
//! A single [`InnovationTracker`] is owned by the evolution driver for the
//! lifetime of a run and threaded into every operation that creates
//! structure. It hands out two kinds of numbers:
//!
//! - node ids, from `next_node_id`, never reused
//! - connection innovations, from `next_innovation`
//!
//! Connection innovations are cached per `(from_node, to_node)` pair for the
//! duration of one generation's mutation pass. Two genomes that independently
//! grow the same edge in the same generation therefore receive the same
//! innovation number, which is what lets crossover recognise homologous
//! structure. The cache is cleared by [`InnovationTracker::begin_generation`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the innovation tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InnovationError {
    /// A genome was requested with a different input/output size than the
    /// layout already allocated for this run.
    #[error(
        "input/output layout is fixed at {inputs} inputs and {outputs} outputs, \
         requested {requested_inputs} inputs and {requested_outputs} outputs"
    )]
    LayoutMismatch {
        inputs: usize,
        outputs: usize,
        requested_inputs: usize,
        requested_outputs: usize,
    },
}

/// Node ids of the fixed input/output layer shared by every genome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoLayout {
    /// Input node ids, in observation order.
    pub inputs: Vec<u64>,
    /// Output node ids, in action order.
    pub outputs: Vec<u64>,
}

/// Process-wide counters for one evolutionary run.
#[derive(Debug, Clone, Default)]
pub struct InnovationTracker {
    next_node_id: u64,
    next_innovation: u64,
    generation_cache: HashMap<(u64, u64), u64>,
    layout: Option<IoLayout>,
}

impl InnovationTracker {
    /// Create a tracker for a fresh run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker from checkpointed counters.
    ///
    /// The innovation cache starts empty; the I/O layout must be restored
    /// separately with [`InnovationTracker::restore_layout`].
    #[must_use]
    pub fn from_counters(node_counter: u64, innovation_counter: u64) -> Self {
        Self {
            next_node_id: node_counter,
            next_innovation: innovation_counter,
            generation_cache: HashMap::new(),
            layout: None,
        }
    }

    /// Next node id that will be handed out.
    #[must_use]
    pub fn node_counter(&self) -> u64 {
        self.next_node_id
    }

    /// Next innovation number that will be handed out.
    #[must_use]
    pub fn innovation_counter(&self) -> u64 {
        self.next_innovation
    }

    /// Return a fresh, never-reused node id.
    pub fn new_node_id(&mut self) -> u64 {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Return the innovation number for the edge `from_node -> to_node`.
    ///
    /// Reuses the number assigned earlier in the current generation for the
    /// same pair, otherwise allocates the next one.
    pub fn get_or_create_innovation(&mut self, from_node: u64, to_node: u64) -> u64 {
        let next = &mut self.next_innovation;
        *self
            .generation_cache
            .entry((from_node, to_node))
            .or_insert_with(|| {
                let innovation = *next;
                *next += 1;
                innovation
            })
    }

    /// Forget the innovations cached during the previous generation.
    pub fn begin_generation(&mut self) {
        self.generation_cache.clear();
    }

    /// Number of distinct edges that received an innovation this generation.
    #[must_use]
    pub fn innovations_this_generation(&self) -> usize {
        self.generation_cache.len()
    }

    /// The input/output layout for this run, allocating it on first use.
    pub fn io_layout(
        &mut self,
        input_size: usize,
        output_size: usize,
    ) -> Result<IoLayout, InnovationError> {
        if let Some(layout) = &self.layout {
            if layout.inputs.len() != input_size || layout.outputs.len() != output_size {
                return Err(InnovationError::LayoutMismatch {
                    inputs: layout.inputs.len(),
                    outputs: layout.outputs.len(),
                    requested_inputs: input_size,
                    requested_outputs: output_size,
                });
            }
            return Ok(layout.clone());
        }

        let inputs = (0..input_size).map(|_| self.new_node_id()).collect();
        let outputs = (0..output_size).map(|_| self.new_node_id()).collect();
        let layout = IoLayout { inputs, outputs };
        self.layout = Some(layout.clone());
        Ok(layout)
    }

    /// Reinstall a layout recovered from a checkpointed population.
    pub fn restore_layout(&mut self, layout: IoLayout) {
        self.layout = Some(layout);
    }
}
