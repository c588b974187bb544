//! This file contains the on-disk side of the driver: reading the input, its
//! structural description and its optional track into a `Baseline`, and the
//! sink executor that persists every unique mutant along with the format of
//! its mutated tree
//!
//! SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::chunk::ChunkTree;
use crate::config::Config;
use crate::description::load_tree;
use crate::err::StrataErr;
use crate::mutators::{Baseline, Executor, Verdict};
use crate::prompt_warn;
use crate::track::Track;

fn read_text(path: &str, what: &str) -> Result<String, StrataErr> {
    std::fs::read_to_string(path).map_err(|e| {
        StrataErr::from(&format!("Unable to read {} '{}', error: {}", what, path, e))
    })
}

/// Read the input, format and track named in the config, the tree has to
/// span exactly the input
pub fn load_baseline(config: &Config) -> Result<Baseline, StrataErr> {
    let buf = std::fs::read(&config.input).map_err(|e| {
        StrataErr::from(&format!(
            "Unable to read input '{}', error: {}",
            config.input, e
        ))
    })?;

    let tree = load_tree(&read_text(&config.format, "format")?)?;

    let track = match &config.track {
        None => None,
        Some(path) => Some(Track::parse(&read_text(path, "track")?)?),
    };

    Baseline::new(buf, tree, track)
}

fn hash_input(input: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

/// Executor that writes every unique mutant to `<output>/inputs` as
/// `<hash>.input` with its tree as `<hash>.json`, and asks to stop once the
/// current stage has used up its trial budget
#[derive(Clone, Debug)]
pub struct DiskSink {
    pub inputs_dir: String,        // Where mutants are written to on disk
    input_hashes: HashSet<u64>,    // Database of unique mutant hashes
    budget: Option<usize>,         // Trials allowed per stage
    stage_trials: usize,           // Trials seen during the current stage
    pub saved: usize,              // Mutants written
    pub duplicates: usize,         // Mutants skipped as already written
}

impl DiskSink {
    pub fn new(config: &Config) -> Result<Self, StrataErr> {
        let inputs_dir = format!("{}/inputs", config.output_dir);

        if std::path::Path::new(&inputs_dir).exists() {
            prompt_warn!("Inputs directory '{}' already exists!", inputs_dir);
        } else {
            std::fs::create_dir_all(&inputs_dir).map_err(|e| {
                StrataErr::from(&format!(
                    "Unable to create inputs directory '{}', error: {}",
                    inputs_dir, e
                ))
            })?;
        }

        Ok(DiskSink {
            inputs_dir,
            input_hashes: HashSet::new(),
            budget: config.trials_per_stage,
            stage_trials: 0,
            saved: 0,
            duplicates: 0,
        })
    }

    /// Reset the per-stage budget
    pub fn begin_stage(&mut self) {
        self.stage_trials = 0;
    }

    /// Save a mutant and its format, false if it had been saved before
    pub fn save_input(&mut self, input: &[u8], tree: &ChunkTree) -> Result<bool, StrataErr> {
        let hash = hash_input(input);
        if !self.input_hashes.insert(hash) {
            self.duplicates += 1;
            return Ok(false);
        }

        let input_path = format!("{}/{:016X}.input", self.inputs_dir, hash);
        std::fs::write(&input_path, input).map_err(|e| {
            StrataErr::from(&format!("Unable to write '{}', error: {}", input_path, e))
        })?;

        let format_path = format!("{}/{:016X}.json", self.inputs_dir, hash);
        let format = serde_json::to_string_pretty(&tree.to_json())
            .map_err(|e| StrataErr::from(&format!("Unable to serialize format: {}", e)))?;
        std::fs::write(&format_path, format).map_err(|e| {
            StrataErr::from(&format!("Unable to write '{}', error: {}", format_path, e))
        })?;

        self.saved += 1;
        Ok(true)
    }
}

impl Executor for DiskSink {
    fn execute(
        &mut self,
        buf: &[u8],
        tree: &ChunkTree,
        _track: Option<&Track>,
    ) -> Result<Verdict, StrataErr> {
        self.save_input(buf, tree)?;
        self.stage_trials += 1;

        match self.budget {
            Some(budget) if self.stage_trials >= budget => Ok(Verdict::Stop),
            _ => Ok(Verdict::Continue),
        }
    }
}
