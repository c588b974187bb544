//! This file contains the logic shared by every mutation stage: the baseline
//! input a stage starts from, the disposable trial copy each mutation is
//! applied to, the executor boundary trials are handed across, and the
//! core data structure embedded in every stage (StageCore). New stages go in
//! the /mutators folder and get added to the factory `create_stage`.
//!
//! Every stage follows the same cycle: clone the baseline into a trial,
//! mutate it, submit it, then reset the trial back to the baseline. A `Stop`
//! verdict from the executor ends the stage right there.
//!
//! SPDX-License-Identifier: MIT

use crate::bytes::{copy_and_insert, delete_data, insert_data};
use crate::chunk::{Chunk, ChunkTree};
use crate::err::StrataErr;
use crate::index::IdIndex;
use crate::misc::Rng;
use crate::number::{is_numeric_width, number_add, Endian};
use crate::track::Track;

pub mod describing;
pub mod field_flip;
pub mod havoc;

use describing::DescribingStage;
use field_flip::FieldFlipStage;
use havoc::HavocStage;

/// Names accepted by `create_stage`, in the order the driver runs them
pub const STAGE_NAMES: [&str; 3] = ["field_flip", "havoc", "describing"];

/// Default number of havoc bursts per candidate chunk
pub const DEFAULT_HAVOC_MULTIPLIER: usize = 16;

/// Default number of edits stacked into one havoc burst
pub const DEFAULT_HAVOC_STACK: usize = 8;

/// Default ceiling on the size of a mutated input
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1 << 20;

/// What the execution side wants after seeing a trial
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Stop,
}

/// The collaborator trials are submitted to. Why it asks to stop (new
/// coverage, a crash, a budget running out) is none of the stage's business
pub trait Executor {
    fn execute(
        &mut self,
        buf: &[u8],
        tree: &ChunkTree,
        track: Option<&Track>,
    ) -> Result<Verdict, StrataErr>;
}

/// The input a stage mutates: the buffer, the tree describing it and the
/// optional field semantics. Never modified by a stage
#[derive(Clone, Debug)]
pub struct Baseline {
    pub buf: Vec<u8>,
    pub tree: ChunkTree,
    pub track: Option<Track>,
}

impl Baseline {
    /// Validate that the tree is consistent and covers the whole buffer
    pub fn new(buf: Vec<u8>, tree: ChunkTree, track: Option<Track>) -> Result<Self, StrataErr> {
        if tree.root().is_none() {
            return Err(StrataErr::from("Baseline tree is empty"));
        }

        tree.check()?;

        if tree.span() != buf.len() {
            return Err(StrataErr::from(&format!(
                "Tree spans {} bytes but the input is {} bytes",
                tree.span(),
                buf.len()
            )));
        }

        Ok(Baseline { buf, tree, track })
    }
}

/// A mutable copy of the baseline owned by a single trial, with its own
/// identifier index
#[derive(Clone, Debug)]
pub struct Trial {
    pub buf: Vec<u8>,
    pub tree: ChunkTree,
    pub index: IdIndex,
}

impl Trial {
    pub fn from_baseline(baseline: &Baseline) -> Self {
        let tree = baseline.tree.clone();
        let index = IdIndex::build(&tree);

        Trial {
            buf: baseline.buf.clone(),
            tree,
            index,
        }
    }

    /// Throw away every edit, the index is rebuilt rather than reused
    pub fn reset(&mut self, baseline: &Baseline) {
        self.buf.clear();
        self.buf.extend_from_slice(&baseline.buf);
        self.tree = baseline.tree.clone();
        self.index = IdIndex::build(&self.tree);
    }

    /// Grow a length payload by `amount` bytes copied from a random spot of
    /// the input, appended at the payload's end, and add `amount` to the meta
    pub fn grow_payload(
        &mut self,
        meta_id: &str,
        payload_id: &str,
        amount: usize,
        endian: Endian,
        rng: &mut Rng,
    ) -> bool {
        let (Some(meta), Some(payload)) = (
            self.index.resolve(&self.tree, meta_id),
            self.index.resolve(&self.tree, payload_id),
        ) else {
            return false;
        };

        let width = self.tree[meta].len();
        if amount == 0 || amount > self.buf.len() || !is_numeric_width(width) {
            return false;
        }

        let insert_at = self.tree.abs_end(payload);
        let copy_start = rng.below(self.buf.len() - amount + 1);
        if !copy_and_insert(&mut self.buf, insert_at, copy_start, amount) {
            return false;
        }
        self.tree.insert_block(insert_at - 1, amount);

        // A meta nested at the tail of its payload absorbs the new bytes
        if self.tree[meta].len() != width {
            return false;
        }

        // The meta may sit after the payload and have moved
        let meta_start = self.tree.abs_start(meta);
        number_add(&mut self.buf, meta_start, width, amount as i64, endian)
    }

    /// Remove `amount` bytes from the front of a length payload and subtract
    /// `amount` from the meta. The payload never shrinks to nothing
    pub fn shrink_payload(&mut self, meta_id: &str, payload_id: &str, amount: usize, endian: Endian) -> bool {
        let (Some(meta), Some(payload)) = (
            self.index.resolve(&self.tree, meta_id),
            self.index.resolve(&self.tree, payload_id),
        ) else {
            return false;
        };

        let width = self.tree[meta].len();
        if amount == 0 || amount >= self.tree[payload].len() || !is_numeric_width(width) {
            return false;
        }

        let delete_from = self.tree.abs_start(payload);
        if !self.delete_bytes(delete_from, amount) {
            return false;
        }

        // A meta nested at the head of its payload gets trimmed or freed
        if !self.tree.is_live(meta) || self.tree[meta].len() != width {
            return false;
        }

        let meta_start = self.tree.abs_start(meta);
        number_add(&mut self.buf, meta_start, width, -(amount as i64), endian)
    }

    /// Add `amount` to an offset meta and insert that many bytes, taken from
    /// a random spot of the input, right after it. The new bytes get their own
    /// marker chunk next to the meta
    pub fn widen_offset(&mut self, meta_id: &str, amount: usize, endian: Endian, rng: &mut Rng) -> bool {
        let Some(meta) = self.index.resolve(&self.tree, meta_id) else {
            return false;
        };

        let width = self.tree[meta].len();
        if amount == 0
            || amount > self.buf.len()
            || !is_numeric_width(width)
            || self.tree[meta].father.is_none()
        {
            return false;
        }

        let meta_start = self.tree.abs_start(meta);
        let insert_at = self.tree.abs_end(meta);
        let copy_start = rng.below(self.buf.len() - amount + 1);

        number_add(&mut self.buf, meta_start, width, amount as i64, endian);
        if !copy_and_insert(&mut self.buf, insert_at, copy_start, amount) {
            return false;
        }

        let marker = Chunk::new(meta_id, 0, amount);
        let marker = self.tree.alloc(marker);
        self.index.set_id_add_map(&mut self.tree, marker);
        self.tree.insert_after(meta, marker);
        true
    }

    /// Raw insertion absorbed by the leaf covering `insert_at`
    pub fn insert_bytes(&mut self, insert_at: usize, data: &[u8]) -> bool {
        if data.is_empty() || !self.tree.insert_block(insert_at, data.len()) {
            return false;
        }

        insert_data(&mut self.buf, insert_at, data)
    }

    /// Raw deletion, straddled chunks are trimmed and emptied ones collapse
    pub fn delete_bytes(&mut self, delete_from: usize, delete_len: usize) -> bool {
        if delete_from.checked_add(delete_len).map_or(true, |end| end > self.buf.len())
            || !self.tree.delete_block(&mut self.index, delete_from, delete_len)
        {
            return false;
        }

        delete_data(&mut self.buf, delete_from, delete_len)
    }
}

/// Knobs shared by every stage
#[derive(Clone, Debug)]
pub struct StageConfig {
    pub seed: Option<usize>,      // pRNG seed, None to seed from the clock
    pub havoc_multiplier: usize,  // Havoc bursts per candidate chunk
    pub havoc_stack: usize,       // Edits per havoc burst
    pub max_input_size: usize,    // Havoc never grows an input past this
    pub verify_trees: bool,       // Check tree consistency before submitting
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            seed: None,
            havoc_multiplier: DEFAULT_HAVOC_MULTIPLIER,
            havoc_stack: DEFAULT_HAVOC_STACK,
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            verify_trees: false,
        }
    }
}

/// What a finished stage run amounts to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    pub trials: usize,  // Trials submitted
    pub stopped: bool,  // Ended early on a Stop verdict
}

/// Shared state for all stages, each implementation embeds this
#[derive(Clone, Debug)]
pub struct StageCore {
    pub rng: Rng,      // Random source threaded through every choice
    verify: bool,      // Run the tree checker before each submission
    trials: usize,     // Trials submitted during the current run
}

impl StageCore {
    pub fn new(config: &StageConfig) -> Self {
        StageCore {
            rng: Rng::new(config.seed),
            verify: config.verify_trees,
            trials: 0,
        }
    }

    /// Start counting a fresh run
    pub fn begin(&mut self) {
        self.trials = 0;
    }

    /// Hand a trial to the executor, true means stop the stage
    pub fn submit(
        &mut self,
        executor: &mut dyn Executor,
        trial: &Trial,
        track: Option<&Track>,
    ) -> Result<bool, StrataErr> {
        if self.verify {
            trial.tree.check()?;
            if trial.tree.span() != trial.buf.len() {
                return Err(StrataErr::from(&format!(
                    "Trial tree spans {} bytes but the buffer is {} bytes",
                    trial.tree.span(),
                    trial.buf.len()
                )));
            }
        }

        self.trials += 1;
        let verdict = executor.execute(&trial.buf, &trial.tree, track)?;
        Ok(verdict == Verdict::Stop)
    }

    pub fn report(&self, stopped: bool) -> StageReport {
        StageReport {
            trials: self.trials,
            stopped,
        }
    }
}

/// Trait all mutation stages must implement
pub trait Stage {
    /// Name used on the command line and in reports
    fn name(&self) -> &'static str;

    /// Short tag for compact output
    fn short_name(&self) -> &'static str;

    /// Run the whole stage against one baseline
    fn run(&mut self, baseline: &Baseline, executor: &mut dyn Executor) -> Result<StageReport, StrataErr>;

    /// `run`, with any error tagged with the stage's name
    fn run_tagged(
        &mut self,
        baseline: &Baseline,
        executor: &mut dyn Executor,
    ) -> Result<StageReport, StrataErr> {
        let name = self.name();
        self.run(baseline, executor).map_err(|e| e.in_stage(name))
    }
}

/// Simple factory to create stages by name
pub fn create_stage(name: &str, config: &StageConfig) -> Result<Box<dyn Stage>, StrataErr> {
    match name {
        "field_flip" => Ok(Box::new(FieldFlipStage::new(config))),
        "havoc" => Ok(Box::new(HavocStage::new(config))),
        "describing" => Ok(Box::new(DescribingStage::new(config))),
        _ => Err(StrataErr::from(&format!("Unrecognized stage '{}'", name))),
    }
}

/// Executor that keeps every submitted buffer and notes every trial whose
/// tree is inconsistent or disagrees with its buffer. Asks to stop after
/// `limit` trials if one is set
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    pub buffers: Vec<Vec<u8>>,
    pub violations: Vec<String>,
    pub limit: Option<usize>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Recorder {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

impl Executor for Recorder {
    fn execute(
        &mut self,
        buf: &[u8],
        tree: &ChunkTree,
        _track: Option<&Track>,
    ) -> Result<Verdict, StrataErr> {
        if let Err(e) = tree.check() {
            self.violations.push(e.to_string());
        } else if tree.span() != buf.len() {
            self.violations
                .push(format!("span {} != buffer {}", tree.span(), buf.len()));
        }

        self.buffers.push(buf.to_vec());

        match self.limit {
            Some(limit) if self.buffers.len() >= limit => Ok(Verdict::Stop),
            _ => Ok(Verdict::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::FieldDesc;
    use crate::number::read_number;

    // L:[0,2) little endian count of P:[2,6), then a trailer
    fn length_baseline() -> Baseline {
        let tree = ChunkTree::build(&[
            FieldDesc::new("L", 0, 2),
            FieldDesc::new("P", 2, 6),
            FieldDesc::new("T", 6, 8),
        ]);
        Baseline::new(vec![4, 0, b'p', b'q', b'r', b's', b't', b'u'], tree, None).unwrap()
    }

    #[test]
    fn baseline_rejects_mismatched_span() {
        let tree = ChunkTree::build(&[FieldDesc::new("a", 0, 3)]);
        assert!(Baseline::new(vec![0; 4], tree, None).is_err());
        assert!(Baseline::new(Vec::new(), ChunkTree::new(), None).is_err());
    }

    #[test]
    fn growing_a_length_payload() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);
        let mut rng = Rng::new(Some(3));

        assert!(trial.grow_payload("L", "P", 5, Endian::Little, &mut rng));
        assert_eq!(trial.buf.len(), 13);
        assert_eq!(read_number(&trial.buf, 0, 2, Endian::Little), Some(9));
        assert_eq!(&trial.buf[2..6], b"pqrs");
        assert_eq!(&trial.buf[11..], b"tu");

        let p = trial.index.get("P").unwrap();
        assert_eq!(trial.tree[p].len(), 9);
        trial.tree.check().unwrap();
        assert_eq!(trial.tree.span(), trial.buf.len());
    }

    #[test]
    fn raw_edits_out_of_range_are_refused() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);
        assert!(!trial.delete_bytes(usize::MAX, 1));
        assert!(!trial.delete_bytes(1, usize::MAX));
        assert!(!trial.insert_bytes(9, b"x"));
        assert_eq!(trial.buf, baseline.buf);
        assert_eq!(trial.tree.span(), 8);
    }

    #[test]
    fn meta_resized_by_its_own_payload_is_left_alone() {
        // L at the head of P, trimming P trims L too
        let tree = ChunkTree::build(&[
            FieldDesc::new("P", 0, 6)
                .with_children(vec![FieldDesc::new("L", 0, 2), FieldDesc::new("D", 2, 6)]),
            FieldDesc::new("T", 6, 7),
        ]);
        let baseline = Baseline::new(vec![6, 0, b'd', b'd', b'd', b'd', b't'], tree, None).unwrap();
        let mut trial = Trial::from_baseline(&baseline);

        assert!(!trial.shrink_payload("L", "P", 1, Endian::Little));
        assert_eq!(trial.buf, vec![0, b'd', b'd', b'd', b'd', b't']);
        trial.tree.check().unwrap();
        assert_eq!(trial.tree.span(), trial.buf.len());

        // L at the tail of P, growing P grows L too
        let tree = ChunkTree::build(&[
            FieldDesc::new("P", 0, 6)
                .with_children(vec![FieldDesc::new("D", 0, 4), FieldDesc::new("L", 4, 6)]),
            FieldDesc::new("T", 6, 7),
        ]);
        let baseline = Baseline::new(vec![b'd', b'd', b'd', b'd', 6, 0, b't'], tree, None).unwrap();
        let mut trial = Trial::from_baseline(&baseline);
        let mut rng = Rng::new(Some(3));

        assert!(!trial.grow_payload("L", "P", 2, Endian::Little, &mut rng));
        assert_eq!(trial.buf.len(), 9);
        assert_eq!(&trial.buf[4..6], &[6, 0]);
        trial.tree.check().unwrap();
        assert_eq!(trial.tree.span(), trial.buf.len());
    }

    #[test]
    fn shrinking_a_length_payload() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);

        assert!(trial.shrink_payload("L", "P", 2, Endian::Little));
        assert_eq!(trial.buf, vec![2, 0, b'r', b's', b't', b'u']);
        trial.tree.check().unwrap();

        // Never down to nothing
        assert!(!trial.shrink_payload("L", "P", 2, Endian::Little));
    }

    #[test]
    fn widening_an_offset() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);
        let mut rng = Rng::new(Some(11));

        assert!(trial.widen_offset("L", 3, Endian::Little, &mut rng));
        assert_eq!(trial.buf.len(), 11);
        assert_eq!(read_number(&trial.buf, 0, 2, Endian::Little), Some(7));
        assert_eq!(&trial.buf[5..], b"pqrstu");

        let l = trial.index.get("L").unwrap();
        let marker = trial.tree[l].next.unwrap();
        assert_ne!(trial.tree[marker].id, "L");
        assert_eq!(trial.tree.abs_start(marker), 2);
        assert_eq!(trial.tree[marker].len(), 3);
        trial.tree.check().unwrap();
    }

    #[test]
    fn odd_width_metas_are_skipped() {
        let tree = ChunkTree::build(&[FieldDesc::new("M", 0, 3), FieldDesc::new("P", 3, 5)]);
        let baseline = Baseline::new(vec![0; 5], tree, None).unwrap();
        let mut trial = Trial::from_baseline(&baseline);
        let mut rng = Rng::new(Some(1));

        assert!(!trial.grow_payload("M", "P", 2, Endian::Little, &mut rng));
        assert!(!trial.widen_offset("M", 2, Endian::Little, &mut rng));
        assert_eq!(trial.buf, baseline.buf);
    }

    #[test]
    fn reset_restores_the_baseline() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);

        assert!(trial.delete_bytes(3, 4));
        assert!(trial.insert_bytes(0, b"zz"));
        assert_ne!(trial.buf, baseline.buf);

        trial.reset(&baseline);
        assert_eq!(trial.buf, baseline.buf);
        assert_eq!(trial.index.len(), baseline.tree.live_count());
        assert!(trial.index.resolve(&trial.tree, "P").is_some());
    }

    #[test]
    fn factory_knows_every_stage() {
        let config = StageConfig::default();
        for name in STAGE_NAMES {
            let stage = create_stage(name, &config).unwrap();
            assert_eq!(stage.name(), name);
        }
        assert!(create_stage("bogus", &config).is_err());
    }

    #[test]
    fn verification_surfaces_broken_trees() {
        let baseline = length_baseline();
        let mut trial = Trial::from_baseline(&baseline);
        let mut core = StageCore::new(&StageConfig {
            verify_trees: true,
            ..Default::default()
        });
        let mut recorder = Recorder::new();

        assert!(!core.submit(&mut recorder, &trial, None).unwrap());

        trial.buf.push(0);
        assert!(core.submit(&mut recorder, &trial, None).is_err());
        assert_eq!(core.report(false).trials, 1);
    }

    // Refuses every trial, complaining about the first chunk
    struct Refuser;

    impl Executor for Refuser {
        fn execute(
            &mut self,
            _buf: &[u8],
            tree: &ChunkTree,
            _track: Option<&Track>,
        ) -> Result<Verdict, StrataErr> {
            let root = tree.root().ok_or_else(|| StrataErr::from("Empty tree"))?;
            let first = &tree[tree.children(root)[0]].id;
            Err(StrataErr::at_chunk(first, "target refused the trial"))
        }
    }

    #[test]
    fn stage_errors_name_stage_and_chunk() {
        let baseline = length_baseline();
        let config = StageConfig { seed: Some(5), ..Default::default() };

        for name in STAGE_NAMES {
            if name == "describing" {
                continue;
            }
            let mut stage = create_stage(name, &config).unwrap();
            let err = stage.run_tagged(&baseline, &mut Refuser).unwrap_err();
            assert_eq!(err.stage(), Some(name));

            let chunk = err.chunk().unwrap().to_string();
            assert_eq!(err.to_string(), format!("[{}] '{}': target refused the trial", name, chunk));
            if name == "field_flip" {
                assert_eq!(chunk, "L");
            }
        }
    }
}
