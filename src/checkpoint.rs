//! Population checkpoints.
//!
//! A checkpoint is a JSON document holding the generation number, the full
//! population and both innovation counters, plus the species state and the
//! run's improvement tracking when available. Loading validates the document
//! before anything is resumed from it: a counter at or below a number already
//! in use would hand out colliding ids.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::genome::{Genome, GenomeError};
use crate::innovation::IoLayout;
use crate::species::Species;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to access checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed checkpoint: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checkpoint holds no genomes")]
    EmptyPopulation,
    #[error(
        "checkpoint counters are behind the population: {what} {used} in use, counter at {counter}"
    )]
    InconsistentCounters {
        what: &'static str,
        used: u64,
        counter: u64,
    },
    #[error("genome {genome} does not share the population's input/output layout")]
    LayoutMismatch { genome: Uuid },
    #[error(transparent)]
    Genome(#[from] GenomeError),
}

/// Serializable snapshot of a run between generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generation: usize,
    pub population: Vec<Genome>,
    /// Next innovation number to hand out.
    pub innovation_counter: u64,
    /// Next node id to hand out.
    pub node_counter: u64,
    #[serde(default)]
    pub species: Vec<Species>,
    #[serde(default)]
    pub best_ever_fitness: Option<f64>,
    #[serde(default)]
    pub generations_without_improvement: usize,
}

impl Checkpoint {
    /// Write the checkpoint as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let io_error = |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(io_error)?;

        info!(
            path = %path.display(),
            generation = self.generation,
            genomes = self.population.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Read and validate a checkpoint.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let checkpoint: Self = serde_json::from_reader(BufReader::new(file))?;
        checkpoint.validate()?;

        info!(
            path = %path.display(),
            generation = checkpoint.generation,
            genomes = checkpoint.population.len(),
            "checkpoint loaded"
        );
        Ok(checkpoint)
    }

    /// Check that every genome is well formed, that the genomes share one
    /// input/output layout, and that both counters lie above every id in use.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        let layout = self.io_layout().ok_or(CheckpointError::EmptyPopulation)?;

        for genome in &self.population {
            genome.validate()?;
            if genome.input_ids().ne(layout.inputs.iter().copied())
                || genome.output_ids().ne(layout.outputs.iter().copied())
            {
                return Err(CheckpointError::LayoutMismatch { genome: genome.id });
            }
            if let Some(used) = genome.max_innovation() {
                if used >= self.innovation_counter {
                    return Err(CheckpointError::InconsistentCounters {
                        what: "innovation",
                        used,
                        counter: self.innovation_counter,
                    });
                }
            }
            if let Some(used) = genome.max_node_id() {
                if used >= self.node_counter {
                    return Err(CheckpointError::InconsistentCounters {
                        what: "node id",
                        used,
                        counter: self.node_counter,
                    });
                }
            }
        }
        Ok(())
    }

    /// Input/output layout of the first genome.
    #[must_use]
    pub fn io_layout(&self) -> Option<IoLayout> {
        let first = self.population.first()?;
        Some(IoLayout {
            inputs: first.input_ids().collect(),
            outputs: first.output_ids().collect(),
        })
    }
}
